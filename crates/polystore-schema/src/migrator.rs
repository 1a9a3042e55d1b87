//! Applying and reverting migrations.

use crate::migration::MigrationSet;
use crate::schema::Schema;
use polystore_core::{DataAccess, Dialect, Error, Result, Row, Value};
use std::collections::{BTreeSet, HashSet};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Where one available migration stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub name: String,
    pub applied: bool,
    /// The batch that applied it, if it is applied.
    pub batch: Option<i64>,
}

/// Exclusive lock held while the ledger is being changed.
///
/// The lock is a file created with `create_new`; a second holder fails
/// instead of waiting. The file is removed when the lock is dropped.
#[derive(Debug)]
pub struct MigrationLock {
    path: PathBuf,
}

impl MigrationLock {
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::invalid_state(format!(
                    "migration lock {} is held by another process",
                    path.display()
                )));
            }
            Err(err) => return Err(err.into()),
        };
        writeln!(file, "{}", std::process::id())?;
        tracing::debug!(path = %path.display(), "migration lock acquired");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for MigrationLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to release migration lock");
        }
    }
}

struct LedgerEntry {
    name: String,
    batch: i64,
}

/// Runs a [`MigrationSet`] against a connection and records what ran in a
/// ledger table (`migrations` unless renamed).
///
/// The ledger is the only record of what is applied: batch numbers and the
/// pending list are recomputed from it on every call. Only SQL backends are
/// supported.
///
/// ```ignore
/// let migrator = Migrator::new(MigrationSet::from_directory("migrations")?)
///     .with_lock_file("migrations.lock");
/// let applied = migrator.run(&mut conn)?;
/// ```
#[derive(Debug)]
pub struct Migrator {
    migrations: MigrationSet,
    table: String,
    lock_file: Option<PathBuf>,
}

impl Migrator {
    pub fn new(migrations: MigrationSet) -> Self {
        Self {
            migrations,
            table: "migrations".to_string(),
            lock_file: None,
        }
    }

    /// Use another ledger table.
    #[must_use]
    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table = name.into();
        self
    }

    /// Hold an exclusive lock file around `run`, `rollback`, `reset`,
    /// `refresh` and `fresh`.
    #[must_use]
    pub fn with_lock_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_file = Some(path.into());
        self
    }

    pub fn migrations(&self) -> &MigrationSet {
        &self.migrations
    }

    fn lock(&self) -> Result<Option<MigrationLock>> {
        self.lock_file
            .as_ref()
            .map(|path| MigrationLock::acquire(path.clone()))
            .transpose()
    }

    fn dialect(db: &dyn DataAccess) -> Result<Dialect> {
        db.require_dialect()
    }

    pub fn repository_exists(&self, db: &mut dyn DataAccess) -> Result<bool> {
        Self::dialect(db)?;
        Schema::new(db).has_table(&self.table)
    }

    /// Create the ledger table if it is missing.
    pub fn install(&self, db: &mut dyn DataAccess) -> Result<()> {
        if self.repository_exists(db)? {
            return Ok(());
        }
        Schema::new(db).create(&self.table, |t| {
            t.increments("id");
            t.string("migration");
            t.integer("batch");
            t.timestamp("executed_at").use_current();
        })?;
        tracing::info!(table = %self.table, "created migration ledger");
        Ok(())
    }

    /// Ledger rows in insertion order.
    fn ledger(&self, db: &mut dyn DataAccess) -> Result<Vec<LedgerEntry>> {
        let dialect = Self::dialect(db)?;
        let sql = format!(
            "SELECT {}, {} FROM {} ORDER BY {}",
            dialect.quote_identifier("migration"),
            dialect.quote_identifier("batch"),
            dialect.quote_identifier(&self.table),
            dialect.quote_identifier("id")
        );
        db.query(&sql, &[])?
            .iter()
            .map(|row: &Row| {
                Ok(LedgerEntry {
                    name: row.get_named("migration")?,
                    batch: row.get_named("batch")?,
                })
            })
            .collect()
    }

    fn record(&self, db: &mut dyn DataAccess, name: &str, batch: i64) -> Result<()> {
        let dialect = Self::dialect(db)?;
        let sql = format!(
            "INSERT INTO {} ({}, {}) VALUES ({})",
            dialect.quote_identifier(&self.table),
            dialect.quote_identifier("migration"),
            dialect.quote_identifier("batch"),
            dialect.placeholders(1, 2)
        );
        db.execute(&sql, &[Value::from(name), Value::BigInt(batch)])?;
        Ok(())
    }

    fn forget(&self, db: &mut dyn DataAccess, name: &str) -> Result<()> {
        let dialect = Self::dialect(db)?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = {}",
            dialect.quote_identifier(&self.table),
            dialect.quote_identifier("migration"),
            dialect.placeholder(1)
        );
        db.execute(&sql, &[Value::from(name)])?;
        Ok(())
    }

    /// Available migrations absent from the ledger, by name.
    fn pending(&self, ledger: &[LedgerEntry]) -> Vec<String> {
        let executed: HashSet<&str> = ledger.iter().map(|e| e.name.as_str()).collect();
        self.migrations
            .names()
            .filter(|name| !executed.contains(name))
            .map(str::to_string)
            .collect()
    }

    /// Apply every pending migration as one new batch and return their names.
    ///
    /// Migrations are not wrapped in a transaction. If one fails, the ones
    /// before it in the batch stay applied and recorded, the rest are not
    /// attempted, and the error is returned. Roll back by hand if needed.
    pub fn run(&self, db: &mut dyn DataAccess) -> Result<Vec<String>> {
        let _lock = self.lock()?;
        self.run_unlocked(db)
    }

    fn run_unlocked(&self, db: &mut dyn DataAccess) -> Result<Vec<String>> {
        self.install(db)?;
        let ledger = self.ledger(db)?;
        let pending = self.pending(&ledger);
        if pending.is_empty() {
            tracing::info!("nothing to migrate");
            return Ok(pending);
        }
        let batch = ledger.iter().map(|e| e.batch).max().unwrap_or(0) + 1;
        for name in &pending {
            let migration = self
                .migrations
                .get(name)
                .ok_or_else(|| Error::MigrationNotFound(name.clone()))?;
            tracing::debug!(migration = %name, batch, "applying");
            migration.up(&mut *db)?;
            self.record(db, name, batch)?;
        }
        tracing::info!(batch, count = pending.len(), "batch applied");
        Ok(pending)
    }

    /// The statements each pending migration would run, without running
    /// them or touching the ledger. Migrations that cannot tell report an
    /// empty list.
    pub fn run_pretend(&self, db: &mut dyn DataAccess) -> Result<Vec<(String, Vec<String>)>> {
        let ledger = if self.repository_exists(db)? {
            self.ledger(db)?
        } else {
            Vec::new()
        };
        Ok(self
            .pending(&ledger)
            .into_iter()
            .map(|name| {
                let statements = self
                    .migrations
                    .get(&name)
                    .and_then(|m| m.up_statements())
                    .map(<[String]>::to_vec)
                    .unwrap_or_default();
                (name, statements)
            })
            .collect())
    }

    /// Revert the last `steps` batches, newest first, each batch in reverse
    /// order of application. Returns the reverted names.
    ///
    /// Every targeted ledger entry must name an available migration;
    /// otherwise nothing is reverted and [`Error::MigrationNotFound`] is
    /// returned.
    pub fn rollback(&self, db: &mut dyn DataAccess, steps: usize) -> Result<Vec<String>> {
        let _lock = self.lock()?;
        self.rollback_unlocked(db, steps)
    }

    fn rollback_unlocked(&self, db: &mut dyn DataAccess, steps: usize) -> Result<Vec<String>> {
        self.install(db)?;
        let ledger = self.ledger(db)?;
        let batches: BTreeSet<i64> = ledger.iter().map(|e| e.batch).collect();
        let targets: Vec<(i64, String)> = batches
            .into_iter()
            .rev()
            .take(steps)
            .flat_map(|batch| {
                ledger
                    .iter()
                    .filter(move |e| e.batch == batch)
                    .rev()
                    .map(move |e| (batch, e.name.clone()))
            })
            .collect();

        if let Some((_, missing)) = targets.iter().find(|(_, name)| !self.migrations.contains(name)) {
            return Err(Error::MigrationNotFound(missing.clone()));
        }

        let mut reverted = Vec::with_capacity(targets.len());
        for (batch, name) in targets {
            if let Some(migration) = self.migrations.get(&name) {
                tracing::debug!(migration = %name, batch, "reverting");
                migration.down(&mut *db)?;
                self.forget(db, &name)?;
                reverted.push(name);
            }
        }
        if !reverted.is_empty() {
            tracing::info!(count = reverted.len(), "rolled back");
        }
        Ok(reverted)
    }

    /// Revert every applied migration.
    pub fn reset(&self, db: &mut dyn DataAccess) -> Result<Vec<String>> {
        let _lock = self.lock()?;
        self.rollback_unlocked(db, usize::MAX)
    }

    /// [`reset`](Migrator::reset) then [`run`](Migrator::run). Returns the
    /// names applied by the run.
    pub fn refresh(&self, db: &mut dyn DataAccess) -> Result<Vec<String>> {
        let _lock = self.lock()?;
        self.rollback_unlocked(db, usize::MAX)?;
        let applied = self.run_unlocked(db)?;
        tracing::info!(count = applied.len(), "refreshed");
        Ok(applied)
    }

    /// Drop every table, recreate the ledger and run everything.
    ///
    /// Foreign key checks are switched back on even when a drop fails.
    pub fn fresh(&self, db: &mut dyn DataAccess) -> Result<Vec<String>> {
        let _lock = self.lock()?;
        Self::dialect(db)?;
        {
            let mut schema = Schema::new(&mut *db);
            schema.disable_foreign_key_constraints()?;
            let dropped = schema.drop_all_tables();
            let enabled = schema.enable_foreign_key_constraints();
            if let (Err(_), Err(e)) = (&dropped, &enabled) {
                tracing::warn!(error = %e, "re-enabling foreign key checks failed");
            }
            dropped?;
            enabled?;
        }
        tracing::info!("dropped all tables");
        self.run_unlocked(db)
    }

    /// Every available migration in name order with its ledger state.
    pub fn status(&self, db: &mut dyn DataAccess) -> Result<Vec<MigrationStatus>> {
        self.install(db)?;
        let ledger = self.ledger(db)?;
        Ok(self
            .migrations
            .names()
            .map(|name| {
                let batch = ledger.iter().find(|e| e.name == name).map(|e| e.batch);
                MigrationStatus {
                    name: name.to_string(),
                    applied: batch.is_some(),
                    batch,
                }
            })
            .collect())
    }
}
