pub mod error;
pub mod ledger;
pub mod runner;
pub mod units;

// Re-export the core types to provide a clean public API.
pub use error::MigratorError;
pub use ledger::{pending, verify_prefix, Ledger, LEDGER_TABLE};
pub use runner::{
    apply_pending, apply_pending_in, rollback_last, rollback_last_in, MigrationReport,
    MigrationStore, PgStore,
};
pub use units::{builtin_units, MigrationUnit};
