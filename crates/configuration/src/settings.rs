use serde::Deserialize;

use crate::error::ConfigError;

/// The root configuration structure for the orchestrator.
///
/// Every section has sensible defaults so that `DATABASE_URL` alone is enough
/// to run against a local database.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub readiness: ReadinessSettings,
    #[serde(default)]
    pub import: ImportSettings,
}

/// Connection settings. A single URI serves both local and hosted databases;
/// TLS requirements ride in the URI parameters (`sslmode=...`), never on an
/// environment name.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Connection URI. `DATABASE_URL` in the process environment wins over
    /// this value.
    #[serde(default)]
    pub url: Option<String>,
    /// Upper bound on pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// How long a query may wait for a pooled connection.
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

/// Parameters for the startup readiness gate.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadinessSettings {
    /// Fixed interval between connection probes.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Give up after this long without a successful probe.
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
}

/// Parameters for the bulk import engine.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportSettings {
    /// Records per transaction. Trades transaction overhead against rollback
    /// cost on failure.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Side file holding the resumable import checkpoint.
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: String,
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_max_wait_secs() -> u64 {
    60
}

fn default_batch_size() -> usize {
    500
}

fn default_checkpoint_path() -> String {
    "pantry-import.checkpoint.json".to_string()
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_wait_secs: default_max_wait_secs(),
        }
    }
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            checkpoint_path: default_checkpoint_path(),
        }
    }
}

impl DatabaseSettings {
    /// Resolves the connection URI, preferring the `DATABASE_URL` environment
    /// variable over the configured value.
    pub fn resolve_url(&self) -> Result<String, ConfigError> {
        self.resolve_url_with(std::env::var("DATABASE_URL").ok())
    }

    /// Same as [`resolve_url`](Self::resolve_url) with the environment value
    /// passed explicitly.
    pub fn resolve_url_with(&self, env_url: Option<String>) -> Result<String, ConfigError> {
        let url = env_url
            .filter(|u| !u.trim().is_empty())
            .or_else(|| self.url.clone())
            .ok_or(ConfigError::MissingDatabaseUrl)?;
        validate_url(&url)?;
        Ok(url)
    }
}

/// Rejects URIs that are not PostgreSQL connection strings before any
/// connection attempt is made.
pub fn validate_url(url: &str) -> Result<(), ConfigError> {
    if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
        return Err(ConfigError::InvalidDatabaseUrl(format!(
            "expected a postgres:// or postgresql:// URI, got {url:?}"
        )));
    }
    Ok(())
}
