use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Failed to connect to the database: {0}")]
    Connection(#[from] sqlx::Error),

    #[error("Database unavailable after {waited_secs}s: {last_error}")]
    Unavailable { waited_secs: u64, last_error: String },
}
