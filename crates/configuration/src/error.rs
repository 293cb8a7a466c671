use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("No database connection string configured: set DATABASE_URL or [database] url")]
    MissingDatabaseUrl,

    #[error("Invalid database connection string: {0}")]
    InvalidDatabaseUrl(String),
}
