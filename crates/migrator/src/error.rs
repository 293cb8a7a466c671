use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigratorError {
    /// The ledger table itself is unsound (missing unique constraint on the
    /// version token, or applied versions with a gap). Indicates out-of-band
    /// tampering; fatal, never retried.
    #[error("Migration ledger corrupted: {0}")]
    LedgerCorruption(String),

    /// A unit's transaction failed. The schema change and its ledger entry
    /// were rolled back together; remaining units were not attempted.
    #[error("Migration {version} ({name}) failed: {source}")]
    UnitFailed {
        version: i64,
        name: String,
        #[source]
        source: sqlx::Error,
    },

    /// The unit has no down transformation, so it cannot be rolled back.
    #[error("Migration {version} ({name}) is irreversible")]
    Irreversible { version: i64, name: String },

    #[error("Ledger query failed: {0}")]
    Db(#[from] sqlx::Error),
}
