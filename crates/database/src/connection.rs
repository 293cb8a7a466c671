use std::time::Duration;

use configuration::DatabaseSettings;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::DbError;

/// Establishes a connection pool to the PostgreSQL database.
///
/// The caller supplies the already-resolved connection URI; TLS requirements
/// ride in the URI parameters, so the same code path serves a local container
/// and a hosted database. The pool is bounded and cached for the process
/// lifetime and must be closed via [`close`] on every exit path.
pub async fn connect(url: &str, settings: &DatabaseSettings) -> Result<PgPool, DbError> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
        .connect(url)
        .await?;

    Ok(pool)
}

/// Closes the pool, waiting for checked-out connections to be returned.
pub async fn close(pool: &PgPool) {
    pool.close().await;
}
