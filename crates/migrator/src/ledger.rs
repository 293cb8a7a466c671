use std::collections::BTreeSet;

use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::error::MigratorError;
use crate::units::MigrationUnit;

/// Name of the append-only table recording applied schema changes.
pub const LEDGER_TABLE: &str = "schema_ledger";

/// The ordered, append-only record of applied schema-change units.
///
/// The primary key on the version token is the concurrency safety net: a
/// second runner racing on the same unit fails on insert conflict instead of
/// double-applying.
pub struct Ledger<'a> {
    pool: &'a PgPool,
}

impl<'a> Ledger<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Creates the ledger table when it does not exist yet.
    pub async fn ensure_table(&self) -> Result<(), MigratorError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_ledger (
                version BIGINT PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Detects out-of-band tampering with the ledger table itself.
    ///
    /// The version token must carry a unique or primary-key constraint;
    /// without it the at-most-once guarantee is gone. Fatal, not retried.
    pub async fn verify_integrity(&self) -> Result<(), MigratorError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n
            FROM information_schema.table_constraints tc
            JOIN information_schema.constraint_column_usage ccu
              ON tc.constraint_name = ccu.constraint_name
             AND tc.table_schema = ccu.table_schema
            WHERE tc.table_name = $1
              AND tc.table_schema = current_schema()
              AND tc.constraint_type IN ('PRIMARY KEY', 'UNIQUE')
              AND ccu.column_name = 'version'
            "#,
        )
        .bind(LEDGER_TABLE)
        .fetch_one(self.pool)
        .await?;

        let constraints: i64 = row.get("n");
        if constraints == 0 {
            return Err(MigratorError::LedgerCorruption(format!(
                "table {LEDGER_TABLE} has no unique constraint on the version token"
            )));
        }
        Ok(())
    }

    /// All version tokens currently recorded as applied.
    pub async fn applied_versions(&self) -> Result<BTreeSet<i64>, MigratorError> {
        let rows = sqlx::query("SELECT version FROM schema_ledger ORDER BY version")
            .fetch_all(self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get::<i64, _>("version")).collect())
    }

    /// Records a unit as applied, inside the same transaction as its schema
    /// change, so a failed change never leaves an orphaned entry.
    pub async fn record_applied(
        tx: &mut Transaction<'_, Postgres>,
        unit: &MigrationUnit,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO schema_ledger (version, name) VALUES ($1, $2)")
            .bind(unit.version)
            .bind(unit.name)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Removes a unit's entry, inside the same transaction as its down
    /// transformation.
    pub async fn remove_entry(
        tx: &mut Transaction<'_, Postgres>,
        version: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM schema_ledger WHERE version = $1")
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

/// Returns the defined units not yet present in the ledger, ascending by
/// version token: exactly U \ L.
pub fn pending<'u>(
    units: &'u [MigrationUnit],
    applied: &BTreeSet<i64>,
) -> Vec<&'u MigrationUnit> {
    let mut out: Vec<&MigrationUnit> = units
        .iter()
        .filter(|u| !applied.contains(&u.version))
        .collect();
    out.sort_by_key(|u| u.version);
    out
}

/// Enforces the no-gaps invariant: the applied set must be a prefix of the
/// version-ordered defined units.
pub fn verify_prefix(
    units: &[MigrationUnit],
    applied: &BTreeSet<i64>,
) -> Result<(), MigratorError> {
    let mut ordered: Vec<i64> = units.iter().map(|u| u.version).collect();
    ordered.sort_unstable();

    for version in applied {
        if !ordered.contains(version) {
            return Err(MigratorError::LedgerCorruption(format!(
                "ledger records version {version} which has no defined unit"
            )));
        }
    }

    let expected_prefix: BTreeSet<i64> = ordered.into_iter().take(applied.len()).collect();
    if &expected_prefix != applied {
        let missing: Vec<i64> = expected_prefix.difference(applied).copied().collect();
        return Err(MigratorError::LedgerCorruption(format!(
            "applied versions are not a prefix of the defined units; missing {missing:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(version: i64, name: &'static str) -> MigrationUnit {
        MigrationUnit {
            version,
            name,
            up: "SELECT 1;",
            down: None,
        }
    }

    fn three_units() -> Vec<MigrationUnit> {
        vec![unit(1, "one"), unit(2, "two"), unit(3, "three")]
    }

    #[test]
    fn pending_is_set_difference_sorted_ascending() {
        // Declared out of order on purpose; pending must still come back sorted.
        let units = vec![unit(3, "three"), unit(1, "one"), unit(2, "two")];
        let applied = BTreeSet::from([1]);

        let p = pending(&units, &applied);
        let versions: Vec<i64> = p.iter().map(|u| u.version).collect();
        assert_eq!(versions, vec![2, 3]);
    }

    #[test]
    fn pending_is_empty_when_everything_is_applied() {
        // A re-run applies nothing: at-most-once per unit.
        let units = three_units();
        let applied = BTreeSet::from([1, 2, 3]);
        assert!(pending(&units, &applied).is_empty());
    }

    #[test]
    fn pending_returns_all_units_for_a_fresh_database() {
        let units = three_units();
        let versions: Vec<i64> = pending(&units, &BTreeSet::new())
            .iter()
            .map(|u| u.version)
            .collect();
        assert_eq!(versions, vec![1, 2, 3]);
    }

    #[test]
    fn prefix_holds_for_contiguous_applied_set() {
        let units = three_units();
        assert!(verify_prefix(&units, &BTreeSet::new()).is_ok());
        assert!(verify_prefix(&units, &BTreeSet::from([1])).is_ok());
        assert!(verify_prefix(&units, &BTreeSet::from([1, 2])).is_ok());
        assert!(verify_prefix(&units, &BTreeSet::from([1, 2, 3])).is_ok());
    }

    #[test]
    fn gap_in_applied_versions_is_corruption() {
        let units = three_units();
        let applied = BTreeSet::from([1, 3]);
        assert!(matches!(
            verify_prefix(&units, &applied),
            Err(MigratorError::LedgerCorruption(_))
        ));
    }

    #[test]
    fn unknown_applied_version_is_corruption() {
        let units = three_units();
        let applied = BTreeSet::from([1, 42]);
        assert!(matches!(
            verify_prefix(&units, &applied),
            Err(MigratorError::LedgerCorruption(_))
        ));
    }
}
