use std::collections::BTreeSet;

use sqlx::PgPool;

use crate::error::MigratorError;
use crate::ledger::{pending, verify_prefix, Ledger};
use crate::units::MigrationUnit;

/// Summary of one runner invocation.
#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    /// Units applied by this invocation, in application order.
    pub applied: Vec<(i64, String)>,
    /// Units that were pending when the run started.
    pub pending_before: usize,
}

/// Storage the runner drives: the ledger read side plus the two transactional
/// operations. `apply` and `revert` must be atomic, so a failed schema change
/// never leaves a ledger entry behind (and vice versa).
///
/// Native async-fn-in-trait rather than `async_trait`: the boxed-future
/// desugaring trips a rustc limitation ("implementation of `Executor` is not
/// general enough") when a method awaits a sqlx transaction.
pub trait MigrationStore: Send {
    /// Creates the ledger when missing and checks its integrity.
    async fn ensure_ready(&mut self) -> Result<(), MigratorError>;

    async fn applied_versions(&mut self) -> Result<BTreeSet<i64>, MigratorError>;

    /// Runs the unit's up transformation and records the ledger entry, as one
    /// transaction.
    async fn apply(&mut self, unit: &MigrationUnit) -> Result<(), sqlx::Error>;

    /// Runs the given down transformation and removes the unit's ledger
    /// entry, as one transaction.
    async fn revert(&mut self, unit: &MigrationUnit, down: &str) -> Result<(), sqlx::Error>;
}

/// The live store, backed by the ledger table and `raw_sql` execution.
pub struct PgStore<'a> {
    pool: &'a PgPool,
}

impl<'a> PgStore<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }
}

impl MigrationStore for PgStore<'_> {
    async fn ensure_ready(&mut self) -> Result<(), MigratorError> {
        let ledger = Ledger::new(self.pool);
        ledger.ensure_table().await?;
        ledger.verify_integrity().await
    }

    async fn applied_versions(&mut self) -> Result<BTreeSet<i64>, MigratorError> {
        Ledger::new(self.pool).applied_versions().await
    }

    async fn apply(&mut self, unit: &MigrationUnit) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::raw_sql(unit.up).execute(&mut *tx).await?;
        Ledger::record_applied(&mut tx, unit).await?;
        tx.commit().await
    }

    async fn revert(&mut self, unit: &MigrationUnit, down: &str) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::raw_sql(down).execute(&mut *tx).await?;
        Ledger::remove_entry(&mut tx, unit.version).await?;
        tx.commit().await
    }
}

/// Applies all pending units, ascending by version token.
///
/// The first failing unit aborts the whole run; later units may assume
/// earlier ones succeeded, so none are attempted. Re-running after a fix is
/// safe: applied units are skipped via the ledger.
pub async fn apply_pending(
    pool: &PgPool,
    units: &[MigrationUnit],
) -> Result<MigrationReport, MigratorError> {
    apply_pending_in(&mut PgStore::new(pool), units).await
}

pub async fn apply_pending_in<S: MigrationStore>(
    store: &mut S,
    units: &[MigrationUnit],
) -> Result<MigrationReport, MigratorError> {
    store.ensure_ready().await?;
    let applied = store.applied_versions().await?;
    verify_prefix(units, &applied)?;

    let pending_units = pending(units, &applied);
    let mut report = MigrationReport {
        applied: Vec::new(),
        pending_before: pending_units.len(),
    };

    for unit in pending_units {
        tracing::info!(version = unit.version, name = unit.name, "applying migration");
        store
            .apply(unit)
            .await
            .map_err(|source| MigratorError::UnitFailed {
                version: unit.version,
                name: unit.name.to_string(),
                source,
            })?;
        report.applied.push((unit.version, unit.name.to_string()));
    }

    Ok(report)
}

/// Rolls back the most recently applied unit.
///
/// Returns `None` when the ledger is empty.
pub async fn rollback_last(
    pool: &PgPool,
    units: &[MigrationUnit],
) -> Result<Option<(i64, String)>, MigratorError> {
    rollback_last_in(&mut PgStore::new(pool), units).await
}

pub async fn rollback_last_in<S: MigrationStore>(
    store: &mut S,
    units: &[MigrationUnit],
) -> Result<Option<(i64, String)>, MigratorError> {
    store.ensure_ready().await?;
    let applied = store.applied_versions().await?;
    verify_prefix(units, &applied)?;

    let Some(&last) = applied.iter().next_back() else {
        return Ok(None);
    };
    let unit = units
        .iter()
        .find(|u| u.version == last)
        .ok_or_else(|| {
            MigratorError::LedgerCorruption(format!("applied version {last} has no defined unit"))
        })?;
    let down = unit.down.ok_or_else(|| MigratorError::Irreversible {
        version: unit.version,
        name: unit.name.to_string(),
    })?;

    tracing::info!(version = unit.version, name = unit.name, "rolling back migration");
    store
        .revert(unit, down)
        .await
        .map_err(|source| MigratorError::UnitFailed {
            version: unit.version,
            name: unit.name.to_string(),
            source,
        })?;

    Ok(Some((unit.version, unit.name.to_string())))
}
