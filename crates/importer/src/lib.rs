pub mod checkpoint;
pub mod engine;
pub mod error;
pub mod record;
pub mod sink;
pub mod source;

// Re-export the core types to provide a clean public API.
pub use checkpoint::ImportCheckpoint;
pub use engine::{ImportEngine, ImportStatus, ImportSummary};
pub use error::ImportError;
pub use record::RecordError;
pub use sink::{BatchOutcome, PgProductSink, ProductSink};
pub use source::{fetch_remote, is_remote, open_lines, SourceLines};
