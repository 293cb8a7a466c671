use std::io;
use std::path::PathBuf;

use tokio::sync::watch;

use crate::checkpoint::ImportCheckpoint;
use crate::error::ImportError;
use crate::record;
use crate::sink::ProductSink;

/// How a run ended (errors surface as `ImportError` instead).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStatus {
    /// Source exhausted; checkpoint cleared.
    Completed,
    /// Cancellation observed at a batch boundary; checkpoint persisted.
    Paused,
}

/// Final counts reported to the caller.
#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub status: ImportStatus,
    pub imported: u64,
    pub skipped: u64,
    pub overwritten: u64,
    /// Index of the next unprocessed record.
    pub last_index: u64,
}

/// Streams a product dump into a sink in fixed-size batches, with a
/// persisted checkpoint making the run resumable after a crash or pause.
///
/// Cancellation is observed at batch boundaries only, never mid-transaction,
/// so an in-flight batch always commits or rolls back as a unit.
pub struct ImportEngine<S: ProductSink> {
    sink: S,
    batch_size: usize,
    checkpoint_path: PathBuf,
    progress: Option<Box<dyn Fn(u64) + Send>>,
}

impl<S: ProductSink> ImportEngine<S> {
    pub fn new(sink: S, batch_size: usize, checkpoint_path: impl Into<PathBuf>) -> Self {
        Self {
            sink,
            batch_size: batch_size.max(1),
            checkpoint_path: checkpoint_path.into(),
            progress: None,
        }
    }

    /// Registers a callback invoked with the committed record index after
    /// each batch.
    pub fn with_progress(mut self, progress: impl Fn(u64) + Send + 'static) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    /// Hands the sink back, e.g. to inspect what was written.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Runs the import to completion, pause, or failure.
    ///
    /// `source_label` identifies the dump for checkpoint matching; `fresh`
    /// discards any persisted checkpoint first.
    pub async fn run(
        &mut self,
        source_label: &str,
        lines: impl Iterator<Item = io::Result<String>>,
        fresh: bool,
        cancel: watch::Receiver<bool>,
    ) -> Result<ImportSummary, ImportError> {
        let mut checkpoint = self.load_or_create(source_label, fresh)?;
        if checkpoint.next_index > 0 {
            tracing::info!(
                run_id = %checkpoint.run_id,
                next_index = checkpoint.next_index,
                "resuming import from checkpoint"
            );
        }

        let mut batch = Vec::with_capacity(self.batch_size);
        // Skips observed since the last committed batch; folded into the
        // checkpoint only at batch boundaries.
        let mut window_skipped: u64 = 0;
        let mut next_index = checkpoint.next_index;

        for (index, line) in lines.enumerate() {
            let index = index as u64;
            if index < checkpoint.next_index {
                continue;
            }

            let line = line?;
            match record::parse_line(&line) {
                Ok(parsed) => batch.push(parsed),
                Err(err) => {
                    window_skipped += 1;
                    tracing::warn!(index, %err, "skipping source record");
                }
            }
            next_index = index + 1;

            if batch.len() >= self.batch_size {
                self.commit_batch(&mut checkpoint, &mut batch, &mut window_skipped, next_index)
                    .await?;
                if *cancel.borrow() {
                    tracing::info!(
                        next_index = checkpoint.next_index,
                        "cancellation observed, pausing at batch boundary"
                    );
                    return Ok(summary(ImportStatus::Paused, &checkpoint));
                }
            }
        }

        if !batch.is_empty() || window_skipped > 0 {
            self.commit_batch(&mut checkpoint, &mut batch, &mut window_skipped, next_index)
                .await?;
        }

        ImportCheckpoint::clear(&self.checkpoint_path)?;
        tracing::info!(
            imported = checkpoint.imported,
            skipped = checkpoint.skipped,
            overwritten = checkpoint.overwritten,
            "import completed"
        );
        Ok(summary(ImportStatus::Completed, &checkpoint))
    }

    fn load_or_create(
        &self,
        source_label: &str,
        fresh: bool,
    ) -> Result<ImportCheckpoint, ImportError> {
        if fresh {
            ImportCheckpoint::clear(&self.checkpoint_path)?;
            return Ok(ImportCheckpoint::new(source_label));
        }
        match ImportCheckpoint::load(&self.checkpoint_path)? {
            Some(cp) if cp.source == source_label => Ok(cp),
            Some(_) => Err(ImportError::CheckpointMismatch),
            None => Ok(ImportCheckpoint::new(source_label)),
        }
    }

    /// Commits the batch transaction, then advances and persists the
    /// checkpoint. Order matters: the checkpoint must never run ahead of
    /// committed data.
    async fn commit_batch(
        &mut self,
        checkpoint: &mut ImportCheckpoint,
        batch: &mut Vec<core_types::ProductRecord>,
        window_skipped: &mut u64,
        next_index: u64,
    ) -> Result<(), ImportError> {
        if !batch.is_empty() {
            let outcome = self
                .sink
                .write_batch(batch)
                .await
                .map_err(|source| ImportError::Failed {
                    last_index: checkpoint.next_index,
                    source,
                })?;
            checkpoint.imported += outcome.inserted + outcome.overwritten;
            checkpoint.overwritten += outcome.overwritten;
        }

        checkpoint.skipped += *window_skipped;
        *window_skipped = 0;
        checkpoint.next_index = next_index;
        checkpoint.save(&self.checkpoint_path)?;
        batch.clear();

        if let Some(progress) = &self.progress {
            progress(checkpoint.next_index);
        }
        Ok(())
    }
}

fn summary(status: ImportStatus, checkpoint: &ImportCheckpoint) -> ImportSummary {
    ImportSummary {
        status,
        imported: checkpoint.imported,
        skipped: checkpoint.skipped,
        overwritten: checkpoint.overwritten,
        last_index: checkpoint.next_index,
    }
}
