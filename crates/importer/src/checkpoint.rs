use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ImportError;

/// Resumable import progress, persisted as a JSON side file outside the main
/// transaction boundary so it survives a crash mid-import.
///
/// Mutated only by the running import process, and only advanced after a
/// batch has committed; the persisted position never runs ahead of committed
/// data. Cleared only on full successful completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportCheckpoint {
    /// Unique run identifier.
    pub run_id: String,

    /// Source the run was started against. A resume against a different
    /// source is refused.
    pub source: String,

    /// Index of the next source record to process; everything before it is
    /// committed.
    pub next_index: u64,

    /// Records written so far (inserts plus overwrites).
    pub imported: u64,

    /// Records that failed validation and were skipped.
    pub skipped: u64,

    /// Records that overwrote an existing row for the same barcode.
    pub overwritten: u64,

    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImportCheckpoint {
    /// Fresh checkpoint at record index 0.
    pub fn new(source: &str) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4().to_string(),
            source: source.to_string(),
            next_index: 0,
            imported: 0,
            skipped: 0,
            overwritten: 0,
            started_at: now,
            updated_at: now,
        }
    }

    /// Loads a persisted checkpoint; `None` when no file exists.
    pub fn load(path: &Path) -> Result<Option<Self>, ImportError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let checkpoint = serde_json::from_str(&content)?;
        Ok(Some(checkpoint))
    }

    /// Persists the checkpoint atomically: write to a temp file, then rename.
    pub fn save(&mut self, path: &Path) -> Result<(), ImportError> {
        self.updated_at = Utc::now();
        let content = serde_json::to_string_pretty(self)?;
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// Removes the checkpoint file. Missing file is not an error.
    pub fn clear(path: &Path) -> Result<(), ImportError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("import.checkpoint.json");

        let mut checkpoint = ImportCheckpoint::new("products.jsonl.gz");
        checkpoint.next_index = 1500;
        checkpoint.imported = 1480;
        checkpoint.skipped = 15;
        checkpoint.overwritten = 5;
        checkpoint.save(&path).unwrap();

        let loaded = ImportCheckpoint::load(&path).unwrap().unwrap();
        assert_eq!(loaded.run_id, checkpoint.run_id);
        assert_eq!(loaded.source, "products.jsonl.gz");
        assert_eq!(loaded.next_index, 1500);
        assert_eq!(loaded.imported, 1480);
        assert_eq!(loaded.skipped, 15);
        assert_eq!(loaded.overwritten, 5);
    }

    #[test]
    fn load_returns_none_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert!(ImportCheckpoint::load(&path).unwrap().is_none());
    }

    #[test]
    fn file_is_pretty_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("import.checkpoint.json");
        ImportCheckpoint::new("src").save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(serde_json::from_str::<serde_json::Value>(&content).is_ok());
        assert!(content.contains('\n'));
        assert!(content.contains("\"run_id\""));
    }

    #[test]
    fn clear_removes_file_and_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("import.checkpoint.json");
        ImportCheckpoint::new("src").save(&path).unwrap();

        ImportCheckpoint::clear(&path).unwrap();
        assert!(!path.exists());
        ImportCheckpoint::clear(&path).unwrap();
    }
}
