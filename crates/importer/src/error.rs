use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    /// Reading the source stream failed. The checkpoint on disk still matches
    /// the last committed batch, so the run is resumable.
    #[error("Import source error: {0}")]
    Source(#[from] std::io::Error),

    /// Fetching a remote source failed before any record was processed.
    #[error("Source download error: {0}")]
    Download(#[from] reqwest::Error),

    #[error("Checkpoint serialization error: {0}")]
    Checkpoint(#[from] serde_json::Error),

    /// The persisted checkpoint was written for a different source.
    #[error("Checkpoint belongs to a different source; re-run with --fresh to discard it")]
    CheckpointMismatch,

    /// A batch transaction failed. `last_index` is the persisted checkpoint
    /// position the next run resumes from.
    #[error("Import failed at record {last_index}: {source}")]
    Failed {
        last_index: u64,
        #[source]
        source: sqlx::Error,
    },
}
