//! SQLite connection implementation.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::borrow_as_ptr)] // FFI requires raw pointers

use crate::config::SqliteConfig;
use crate::types;
use libsqlite3_sys as ffi;
use polystore_core::{
    Backend, ColumnInfo, ConnectionError, ConnectionErrorKind, Error, Result, Row,
    StatementDriver, StatementError, StatementErrorKind, Value, ensure_can_begin,
    ensure_open_transaction,
};
use std::ffi::{CString, c_char, c_int};
use std::ptr;
use std::sync::Arc;

/// A connection to one SQLite database.
pub struct SqliteDriver {
    db: *mut ffi::sqlite3,
    path: String,
    in_transaction: bool,
}

// SAFETY: the handle is owned exclusively by this value and every method
// takes `&mut self`, so it is never used from two threads at once.
unsafe impl Send for SqliteDriver {}

/// A prepared statement, finalized on drop.
struct Statement {
    raw: *mut ffi::sqlite3_stmt,
}

impl Drop for Statement {
    fn drop(&mut self) {
        // SAFETY: raw came from sqlite3_prepare_v2 and is finalized exactly once.
        unsafe {
            ffi::sqlite3_finalize(self.raw);
        }
    }
}

impl SqliteDriver {
    /// Open a database file (created if missing) or `:memory:`.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            connection_error(
                ConnectionErrorKind::Connect,
                "invalid path: contains null byte".to_string(),
            )
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE | ffi::SQLITE_OPEN_URI;

        // SAFETY: valid out-pointer and NUL-terminated path
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let msg = if db.is_null() {
                format!("result code {}", rc)
            } else {
                // SAFETY: db is a handle returned by open, closed right after
                unsafe {
                    let msg = types::errmsg(db);
                    ffi::sqlite3_close(db);
                    msg
                }
            };
            return Err(connection_error(
                ConnectionErrorKind::Connect,
                format!("failed to open database '{}': {}", config.path, msg),
            ));
        }

        if config.busy_timeout_ms > 0 {
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_busy_timeout(db, config.busy_timeout_ms as c_int);
            }
        }

        let mut driver = Self {
            db,
            path: config.path.clone(),
            in_transaction: false,
        };
        if config.foreign_keys {
            driver.execute("PRAGMA foreign_keys = ON", &[])?;
        }
        tracing::info!(backend = "sqlite", path = %driver.path, "sqlite database opened");
        Ok(driver)
    }

    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::memory())
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Rows changed by the most recent INSERT, UPDATE or DELETE.
    pub fn changes(&self) -> Result<u64> {
        let db = self.handle()?;
        // SAFETY: db is open
        Ok(unsafe { ffi::sqlite3_changes(db) } as u64)
    }

    fn handle(&self) -> Result<*mut ffi::sqlite3> {
        if self.db.is_null() {
            Err(connection_error(
                ConnectionErrorKind::Disconnected,
                "connection is closed".to_string(),
            ))
        } else {
            Ok(self.db)
        }
    }

    /// Compile the statement starting at `sql_ptr`, returning it and the
    /// position right after it. The statement is `None` for blank input.
    fn prepare(
        db: *mut ffi::sqlite3,
        sql_ptr: *const c_char,
        sql: &str,
    ) -> Result<(Option<Statement>, *const c_char)> {
        let mut raw: *mut ffi::sqlite3_stmt = ptr::null_mut();
        let mut tail: *const c_char = ptr::null();
        // SAFETY: sql_ptr points into a live NUL-terminated buffer
        let rc = unsafe { ffi::sqlite3_prepare_v2(db, sql_ptr, -1, &mut raw, &mut tail) };
        if rc != ffi::SQLITE_OK {
            return Err(statement_error(db, sql));
        }
        let stmt = if raw.is_null() {
            None
        } else {
            Some(Statement { raw })
        };
        Ok((stmt, tail))
    }

    fn bind_all(db: *mut ffi::sqlite3, stmt: &Statement, sql: &str, params: &[Value]) -> Result<()> {
        // SAFETY: stmt is a live prepared statement
        let expected = unsafe { ffi::sqlite3_bind_parameter_count(stmt.raw) } as usize;
        if expected != params.len() {
            return Err(StatementError::new(
                Backend::Sqlite,
                StatementErrorKind::Syntax,
                format!(
                    "statement expects {} parameters, {} given",
                    expected,
                    params.len()
                ),
            )
            .with_sql(sql)
            .into());
        }
        for (i, param) in params.iter().enumerate() {
            // SAFETY: stmt is valid, index is 1-based and within bounds
            let rc = unsafe { types::bind_value(stmt.raw, (i + 1) as c_int, param) };
            if rc != ffi::SQLITE_OK {
                // SAFETY: db is open
                let msg = unsafe { types::errmsg(db) };
                return Err(StatementError::new(
                    Backend::Sqlite,
                    StatementErrorKind::Database,
                    format!("failed to bind parameter {}: {}", i + 1, msg),
                )
                .with_sql(sql)
                .into());
            }
        }
        Ok(())
    }
}

impl StatementDriver for SqliteDriver {
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        tracing::debug!(backend = "sqlite", sql, params = params.len(), "query");
        let db = self.handle()?;
        let c_sql = CString::new(sql).map_err(|_| nul_in_sql(sql))?;
        let (stmt, _) = Self::prepare(db, c_sql.as_ptr(), sql)?;
        let Some(stmt) = stmt else {
            return Ok(Vec::new());
        };
        Self::bind_all(db, &stmt, sql, params)?;

        // SAFETY: stmt is valid
        let col_count = unsafe { ffi::sqlite3_column_count(stmt.raw) };
        let names = (0..col_count)
            .map(|i| {
                // SAFETY: i < col_count
                unsafe { types::column_name(stmt.raw, i) }.unwrap_or_else(|| format!("col{}", i))
            })
            .collect();
        let columns = Arc::new(ColumnInfo::new(names));

        let mut rows = Vec::new();
        loop {
            // SAFETY: stmt is valid
            match unsafe { ffi::sqlite3_step(stmt.raw) } {
                ffi::SQLITE_ROW => {
                    let values = (0..col_count)
                        // SAFETY: the last step returned SQLITE_ROW
                        .map(|i| unsafe { types::read_column(stmt.raw, i) })
                        .collect();
                    rows.push(Row::with_columns(Arc::clone(&columns), values));
                }
                ffi::SQLITE_DONE => break,
                _ => return Err(statement_error(db, sql)),
            }
        }
        Ok(rows)
    }

    /// Runs every statement in `sql`; parameters bind to the first one.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        tracing::debug!(backend = "sqlite", sql, params = params.len(), "execute");
        let db = self.handle()?;
        let c_sql = CString::new(sql).map_err(|_| nul_in_sql(sql))?;
        let mut cursor = c_sql.as_ptr();
        let mut affected = 0_u64;
        let mut first = true;

        loop {
            let (stmt, tail) = Self::prepare(db, cursor, sql)?;
            let Some(stmt) = stmt else { break };
            Self::bind_all(db, &stmt, sql, if first { params } else { &[] })?;
            first = false;

            // SAFETY: db is open
            let before = unsafe { ffi::sqlite3_total_changes(db) };
            loop {
                // SAFETY: stmt is valid
                match unsafe { ffi::sqlite3_step(stmt.raw) } {
                    ffi::SQLITE_ROW => {}
                    ffi::SQLITE_DONE => break,
                    _ => return Err(statement_error(db, sql)),
                }
            }
            // SAFETY: db is open
            if unsafe { ffi::sqlite3_total_changes(db) } != before {
                affected += unsafe { ffi::sqlite3_changes(db) } as u64;
            }
            cursor = tail;
        }
        Ok(affected)
    }

    fn last_insert_id(&mut self) -> Result<i64> {
        let db = self.handle()?;
        // SAFETY: db is open
        Ok(unsafe { ffi::sqlite3_last_insert_rowid(db) })
    }

    fn begin_transaction(&mut self) -> Result<()> {
        ensure_can_begin(self.in_transaction)?;
        self.execute("BEGIN", &[])?;
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        ensure_open_transaction(self.in_transaction, "commit")?;
        self.execute("COMMIT", &[])?;
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        ensure_open_transaction(self.in_transaction, "roll back")?;
        self.in_transaction = false;
        self.execute("ROLLBACK", &[])?;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn disconnect(&mut self) -> Result<()> {
        if !self.db.is_null() {
            // SAFETY: db is open and nulled right after, so it is closed once
            unsafe {
                ffi::sqlite3_close_v2(self.db);
            }
            self.db = ptr::null_mut();
            self.in_transaction = false;
            tracing::info!(backend = "sqlite", path = %self.path, "sqlite database closed");
        }
        Ok(())
    }

    fn backend(&self) -> Backend {
        Backend::Sqlite
    }
}

impl Drop for SqliteDriver {
    fn drop(&mut self) {
        if !self.db.is_null() {
            // SAFETY: db is open and owned by self
            unsafe {
                ffi::sqlite3_close_v2(self.db);
            }
        }
    }
}

fn connection_error(kind: ConnectionErrorKind, message: String) -> Error {
    ConnectionError::new(Backend::Sqlite, kind, message).into()
}

fn nul_in_sql(sql: &str) -> Error {
    StatementError::new(
        Backend::Sqlite,
        StatementErrorKind::Syntax,
        "SQL contains null byte",
    )
    .with_sql(sql)
    .into()
}

fn statement_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    // SAFETY: db is open
    let (msg, code) = unsafe { (types::errmsg(db), ffi::sqlite3_extended_errcode(db)) };
    StatementError::new(Backend::Sqlite, error_kind(code, &msg), msg)
        .with_sql(sql)
        .into()
}

fn error_kind(code: c_int, message: &str) -> StatementErrorKind {
    match code & 0xff {
        ffi::SQLITE_CONSTRAINT => StatementErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => StatementErrorKind::Deadlock,
        ffi::SQLITE_PERM | ffi::SQLITE_AUTH | ffi::SQLITE_READONLY => {
            StatementErrorKind::Permission
        }
        ffi::SQLITE_NOTFOUND => StatementErrorKind::NotFound,
        ffi::SQLITE_ERROR if message.starts_with("no such") => StatementErrorKind::NotFound,
        ffi::SQLITE_ERROR if message.contains("syntax error") => StatementErrorKind::Syntax,
        _ => StatementErrorKind::Database,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_with_table() -> SqliteDriver {
        let mut conn = SqliteDriver::open_memory().unwrap();
        conn.execute(
            "CREATE TABLE test (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)",
            &[],
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_open_memory() {
        let conn = SqliteDriver::open_memory().unwrap();
        assert_eq!(conn.path(), ":memory:");
        assert_eq!(conn.backend(), Backend::Sqlite);
    }

    #[test]
    fn test_parameterized_roundtrip() {
        let mut conn = open_with_table();
        let affected = conn
            .execute(
                "INSERT INTO test (name, age) VALUES (?, ?)",
                &[Value::from("Alice"), Value::from(30)],
            )
            .unwrap();
        assert_eq!(affected, 1);
        assert_eq!(conn.last_insert_id().unwrap(), 1);

        let rows = conn
            .query("SELECT * FROM test WHERE name = ?", &[Value::from("Alice")])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_named::<i64>("id").unwrap(), 1);
        assert_eq!(rows[0].get_named::<i64>("age").unwrap(), 30);
    }

    #[test]
    fn test_null_and_blob_handling() {
        let mut conn = SqliteDriver::open_memory().unwrap();
        conn.execute("CREATE TABLE t (a TEXT, b BLOB)", &[]).unwrap();
        conn.execute(
            "INSERT INTO t (a, b) VALUES (?, ?)",
            &[Value::Null, Value::Bytes(vec![0, 1, 2])],
        )
        .unwrap();
        let rows = conn.query("SELECT a, b FROM t", &[]).unwrap();
        assert_eq!(rows[0].get(0), Some(&Value::Null));
        assert_eq!(rows[0].get(1), Some(&Value::Bytes(vec![0, 1, 2])));
    }

    #[test]
    fn test_execute_runs_every_statement() {
        let mut conn = SqliteDriver::open_memory().unwrap();
        conn.execute(
            "CREATE TABLE a (id INTEGER); CREATE TABLE b (id INTEGER);\n-- trailing comment\n",
            &[],
        )
        .unwrap();
        let rows = conn
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                &[],
            )
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_update_counts_rows() {
        let mut conn = open_with_table();
        conn.execute("INSERT INTO test (name) VALUES ('a'), ('b'), ('c')", &[])
            .unwrap();
        let n = conn
            .execute("UPDATE test SET age = ? WHERE name <> ?", &[Value::from(1), Value::from("a")])
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(conn.execute("CREATE INDEX idx_age ON test (age)", &[]).unwrap(), 0);
    }

    #[test]
    fn test_transaction_rollback_and_commit() {
        let mut conn = open_with_table();

        conn.begin_transaction().unwrap();
        assert!(conn.in_transaction());
        conn.execute("INSERT INTO test (name) VALUES ('gone')", &[]).unwrap();
        conn.rollback().unwrap();
        assert!(conn.query("SELECT * FROM test", &[]).unwrap().is_empty());

        conn.begin_transaction().unwrap();
        conn.execute("INSERT INTO test (name) VALUES ('kept')", &[]).unwrap();
        conn.commit().unwrap();
        assert_eq!(conn.query("SELECT * FROM test", &[]).unwrap().len(), 1);
    }

    #[test]
    fn test_transaction_misuse_is_invalid_state() {
        let mut conn = open_with_table();
        assert!(matches!(conn.commit(), Err(Error::InvalidState(_))));
        assert!(matches!(conn.rollback(), Err(Error::InvalidState(_))));
        conn.begin_transaction().unwrap();
        assert!(matches!(conn.begin_transaction(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_error_classification() {
        let mut conn = open_with_table();
        conn.execute("CREATE UNIQUE INDEX uniq_name ON test (name)", &[])
            .unwrap();
        conn.execute("INSERT INTO test (name) VALUES ('x')", &[]).unwrap();

        let dup = conn
            .execute("INSERT INTO test (name) VALUES ('x')", &[])
            .unwrap_err();
        assert!(matches!(dup, Error::Statement(ref e) if e.kind == StatementErrorKind::Constraint));
        assert_eq!(dup.backend(), Some(Backend::Sqlite));
        assert!(dup.sql().is_some());

        let missing = conn.query("SELECT * FROM nope", &[]).unwrap_err();
        assert!(matches!(missing, Error::Statement(ref e) if e.kind == StatementErrorKind::NotFound));

        let syntax = conn.query("SELEC 1", &[]).unwrap_err();
        assert!(matches!(syntax, Error::Statement(ref e) if e.kind == StatementErrorKind::Syntax));
    }

    #[test]
    fn test_parameter_count_mismatch() {
        let mut conn = open_with_table();
        let err = conn
            .query("SELECT * FROM test WHERE id = ?", &[])
            .unwrap_err();
        assert!(matches!(err, Error::Statement(ref e) if e.kind == StatementErrorKind::Syntax));
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let mut conn = SqliteDriver::open_memory().unwrap();
        conn.execute(
            "CREATE TABLE parent (id INTEGER PRIMARY KEY);\
             CREATE TABLE child (id INTEGER PRIMARY KEY, parent_id INTEGER REFERENCES parent(id))",
            &[],
        )
        .unwrap();
        let err = conn
            .execute("INSERT INTO child (parent_id) VALUES (?)", &[Value::from(99)])
            .unwrap_err();
        assert!(matches!(err, Error::Statement(ref e) if e.kind == StatementErrorKind::Constraint));
    }

    #[test]
    fn test_disconnect_closes_handle() {
        let mut conn = open_with_table();
        conn.disconnect().unwrap();
        let err = conn.query("SELECT 1", &[]).unwrap_err();
        assert!(err.is_connection_error());
        conn.disconnect().unwrap();
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");
        let config = SqliteConfig::file(path.to_string_lossy());
        {
            let mut conn = SqliteDriver::open(&config).unwrap();
            conn.execute("CREATE TABLE kv (k TEXT)", &[]).unwrap();
            conn.execute("INSERT INTO kv VALUES (?)", &[Value::from("v")]).unwrap();
        }
        let mut conn = SqliteDriver::open(&config).unwrap();
        assert_eq!(conn.query("SELECT k FROM kv", &[]).unwrap().len(), 1);
    }
}
