use std::time::{Duration, Instant};

use configuration::ReadinessSettings;
use sqlx::{Connection, PgConnection};

use crate::error::DbError;

/// Polls the database until it accepts connections or the wait budget runs out.
///
/// A container's process start does not imply it is accepting connections yet,
/// so this gate must run before the pool is handed to the migration runner or
/// the import engine. Each probe uses its own short-lived connection; no pooled
/// connection is held while waiting.
pub async fn wait_for_database(url: &str, settings: &ReadinessSettings) -> Result<(), DbError> {
    let interval = Duration::from_millis(settings.poll_interval_ms.max(1));
    let deadline = Instant::now() + Duration::from_secs(settings.max_wait_secs);
    let mut attempts: u32 = 0;
    let mut last_error;

    loop {
        attempts += 1;
        match tokio::time::timeout(interval, ping(url)).await {
            Ok(Ok(())) => {
                tracing::info!(attempts, "database is accepting connections");
                return Ok(());
            }
            Ok(Err(e)) => last_error = e.to_string(),
            Err(_) => last_error = format!("connection attempt timed out after {interval:?}"),
        }

        if Instant::now() + interval > deadline {
            return Err(DbError::Unavailable {
                waited_secs: settings.max_wait_secs,
                last_error,
            });
        }

        tracing::debug!(attempts, %last_error, "database not ready, retrying");
        tokio::time::sleep(interval).await;
    }
}

/// A trivial round-trip query on a throwaway connection.
async fn ping(url: &str) -> Result<(), sqlx::Error> {
    let mut conn = PgConnection::connect(url).await?;
    sqlx::query("SELECT 1").execute(&mut conn).await?;
    conn.close().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_database_reports_unavailable() {
        // Port 1 is never a postgres listener; the probe fails fast and the
        // zero-second budget forbids a retry.
        let settings = ReadinessSettings {
            poll_interval_ms: 100,
            max_wait_secs: 0,
        };
        let result = wait_for_database("postgres://user:pw@127.0.0.1:1/db", &settings).await;
        match result {
            Err(DbError::Unavailable { waited_secs, .. }) => assert_eq!(waited_secs, 0),
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }
}
