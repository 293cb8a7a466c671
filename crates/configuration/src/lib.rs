// Declare the modules that make up this crate.
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use error::ConfigError;
pub use settings::{DatabaseSettings, ImportSettings, ReadinessSettings, Settings};

/// Loads the orchestrator configuration.
///
/// Sources, in order of precedence (later wins):
/// 1. An optional `pantry.toml` file in the working directory.
/// 2. `PANTRY_*` environment variables (e.g. `PANTRY_IMPORT__BATCH_SIZE`).
///
/// The `DATABASE_URL` variable is handled separately by
/// [`DatabaseSettings::resolve_url`] so the same code path serves a local
/// container and a hosted database.
pub fn load_settings() -> Result<Settings, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name("pantry").required(false))
        .add_source(config::Environment::with_prefix("PANTRY").separator("__"))
        .build()?;

    let settings = builder.try_deserialize::<Settings>()?;

    Ok(settings)
}
