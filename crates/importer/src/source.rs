use std::fs::File;
use std::io::{self, BufRead, BufReader, Lines, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use tempfile::NamedTempFile;

use crate::error::ImportError;

/// A streaming line iterator over a product dump.
///
/// The dump may be plain JSONL or gzip-compressed (`.gz` extension); either
/// way it is read incrementally and never buffered whole, since the real feed
/// runs to gigabytes.
pub type SourceLines = Lines<BufReader<Box<dyn Read + Send>>>;

pub fn open_lines(path: &Path) -> io::Result<SourceLines> {
    let file = File::open(path)?;
    let reader: Box<dyn Read + Send> = if path.extension().is_some_and(|ext| ext == "gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(BufReader::new(reader).lines())
}

/// True for sources that must be downloaded before streaming.
pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Downloads a remote dump to a temp file, streamed chunk by chunk so the
/// body is never held in memory. The caller keeps the handle alive for as
/// long as the file is read; it is removed on drop.
pub async fn fetch_remote(url: &str) -> Result<NamedTempFile, ImportError> {
    let mut file = tempfile::Builder::new()
        .prefix("pantry-dump-")
        .suffix(remote_suffix(url))
        .tempfile()?;

    tracing::info!(url, "downloading product dump");
    let mut response = reqwest::get(url).await?.error_for_status()?;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk)?;
    }
    file.flush()?;
    Ok(file)
}

/// Temp-file suffix preserving the compression marker, so `open_lines` picks
/// the right decoder for the downloaded copy.
fn remote_suffix(url: &str) -> &'static str {
    if url.trim_end_matches('/').ends_with(".gz") {
        ".jsonl.gz"
    } else {
        ".jsonl"
    }
}
