//! The connection facade.

use polystore_core::{
    Backend, ConnectionConfig, DataAccess, Dialect, Document, DocumentDriver, DocumentOp, Error,
    FindOptions, Result, Row, StatementDriver, StatementError, StatementErrorKind, Value,
    normalize_update,
};
use polystore_mongo::{MongoConfig, MongoDriver};
use polystore_mssql::{MssqlConfig, MssqlDriver};
use polystore_mysql::{MySqlConfig, MySqlDriver};
use polystore_postgres::{PgConfig, PgDriver};
use polystore_sqlite::{SqliteConfig, SqliteDriver};
use polystore_turso::{TursoConfig, TursoDriver};
use std::collections::HashMap;
use std::fmt;

/// Field the document store keys documents by.
const DOCUMENT_ID: &str = "_id";

/// The driver behind a [`Connection`].
pub enum Driver {
    /// A relational or remote SQL driver.
    Statement(Box<dyn StatementDriver>),
    /// The document store.
    Document(MongoDriver),
}

impl Driver {
    pub fn backend(&self) -> Backend {
        match self {
            Driver::Statement(driver) => driver.backend(),
            Driver::Document(_) => Backend::Mongo,
        }
    }

    fn in_transaction(&self) -> bool {
        match self {
            Driver::Statement(driver) => driver.in_transaction(),
            Driver::Document(driver) => driver.in_transaction(),
        }
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Driver").field(&self.backend()).finish()
    }
}

/// One logical connection to one backend.
///
/// The backend is chosen once from [`ConnectionConfig::driver`]. All CRUD
/// helpers and the [`DataAccess`] surface used by the query and schema crates
/// dispatch to the relational or the document driver from here.
///
/// ```ignore
/// let mut conn = Connection::open(&ConnectionConfig::new("sqlite").database(":memory:"))?;
/// conn.execute("CREATE TABLE widgets (id INTEGER PRIMARY KEY, name TEXT)", &[])?;
/// let id = conn.insert("widgets", &Document::new().with("name", "gizmo"))?;
/// let row = conn.find("widgets", &id, "id")?;
/// ```
#[derive(Debug)]
pub struct Connection {
    driver: Driver,
}

impl Connection {
    /// Open a connection for `config`.
    ///
    /// An unknown driver name is an [`Error::Config`] and nothing is opened.
    pub fn open(config: &ConnectionConfig) -> Result<Self> {
        let backend = config.backend()?;
        let driver = match backend {
            Backend::Sqlite => {
                let config = SqliteConfig::try_from(config)?;
                Driver::Statement(Box::new(SqliteDriver::open(&config)?))
            }
            Backend::MySql => {
                Driver::Statement(Box::new(MySqlDriver::connect(MySqlConfig::try_from(config)?)?))
            }
            Backend::Postgres => {
                Driver::Statement(Box::new(PgDriver::connect(PgConfig::try_from(config)?)?))
            }
            Backend::SqlServer => {
                Driver::Statement(Box::new(MssqlDriver::connect(MssqlConfig::try_from(config)?)?))
            }
            Backend::Turso => {
                Driver::Statement(Box::new(TursoDriver::connect(TursoConfig::try_from(config)?)?))
            }
            Backend::Mongo => Driver::Document(MongoDriver::connect(MongoConfig::try_from(config)?)?),
        };
        tracing::info!(backend = backend.name(), "connection opened");
        Ok(Self { driver })
    }

    /// Open from a flat key/value map (`driver`, `host`, `database`, ...).
    pub fn from_map<K, V>(map: &HashMap<K, V>) -> Result<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self::open(&ConnectionConfig::from_map(map)?)
    }

    /// Wrap a driver that is already connected.
    pub fn from_driver(driver: Driver) -> Self {
        Self { driver }
    }

    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    pub fn driver_name(&self) -> &'static str {
        self.driver.backend().name()
    }

    pub fn backend(&self) -> Backend {
        self.driver.backend()
    }

    pub fn is_nosql(&self) -> bool {
        matches!(self.driver, Driver::Document(_))
    }

    pub fn in_transaction(&self) -> bool {
        self.driver.in_transaction()
    }

    /// Run `f` inside a transaction.
    ///
    /// Commits when `f` returns `Ok`; otherwise rolls back and returns the
    /// error from `f`.
    pub fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.begin_transaction()?;
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback() {
                    tracing::warn!(
                        backend = self.driver_name(),
                        error = %rollback_err,
                        "rollback after failed transaction failed"
                    );
                }
                Err(err)
            }
        }
    }

    pub fn disconnect(&mut self) -> Result<()> {
        match &mut self.driver {
            Driver::Statement(driver) => driver.disconnect()?,
            Driver::Document(driver) => driver.disconnect()?,
        }
        tracing::info!(backend = self.driver_name(), "connection closed");
        Ok(())
    }

    fn statement(&mut self, operation: &str) -> Result<(&mut dyn StatementDriver, Dialect)> {
        let backend = self.driver.backend();
        match (&mut self.driver, backend.dialect()) {
            (Driver::Statement(driver), Some(dialect)) => Ok((driver.as_mut(), dialect)),
            _ => Err(unsupported(backend, operation, "needs a SQL backend")),
        }
    }

    fn document(&mut self, operation: &str) -> Result<&mut MongoDriver> {
        let backend = self.driver.backend();
        match &mut self.driver {
            Driver::Document(driver) => Ok(driver),
            Driver::Statement(_) => Err(unsupported(backend, operation, "needs the document backend")),
        }
    }
}

fn unsupported(backend: Backend, operation: &str, reason: &str) -> Error {
    Error::Statement(StatementError::new(
        backend,
        StatementErrorKind::Database,
        format!("{operation} {reason}, but the connection uses '{backend}'"),
    ))
}

fn column_list(dialect: Dialect, columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| dialect.quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `INSERT` that returns the stored row where the dialect can. Tables
/// without a key column still accept it.
fn insert_sql(dialect: Dialect, table: &str, columns: &[&str]) -> String {
    let table = dialect.quote_qualified(table);
    let names = column_list(dialect, columns);
    let values = dialect.placeholders(1, columns.len());
    match dialect {
        Dialect::Postgres if columns.is_empty() => {
            format!("INSERT INTO {table} DEFAULT VALUES RETURNING *")
        }
        Dialect::Postgres => {
            format!("INSERT INTO {table} ({names}) VALUES ({values}) RETURNING *")
        }
        Dialect::SqlServer if columns.is_empty() => {
            format!("INSERT INTO {table} OUTPUT INSERTED.* DEFAULT VALUES")
        }
        Dialect::SqlServer => {
            format!("INSERT INTO {table} ({names}) OUTPUT INSERTED.* VALUES ({values})")
        }
        Dialect::MySql if columns.is_empty() => format!("INSERT INTO {table} () VALUES ()"),
        Dialect::MySql | Dialect::Sqlite if columns.is_empty() => {
            format!("INSERT INTO {table} DEFAULT VALUES")
        }
        Dialect::MySql | Dialect::Sqlite => {
            format!("INSERT INTO {table} ({names}) VALUES ({values})")
        }
    }
}

/// `UPDATE`; the fragment's placeholders number after the assignments.
fn update_sql(dialect: Dialect, table: &str, columns: &[&str], where_fragment: &str) -> String {
    let assignments = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = {}", dialect.quote_identifier(c), dialect.placeholder(i + 1)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "UPDATE {} SET {} WHERE {}",
        dialect.quote_qualified(table),
        assignments,
        where_fragment
    )
}

fn delete_sql(dialect: Dialect, table: &str, where_fragment: &str) -> String {
    format!("DELETE FROM {} WHERE {}", dialect.quote_qualified(table), where_fragment)
}

fn find_sql(dialect: Dialect, table: &str, key: &str) -> String {
    let table = dialect.quote_qualified(table);
    let condition = format!("{} = {}", dialect.quote_identifier(key), dialect.placeholder(1));
    if dialect == Dialect::SqlServer {
        format!("SELECT TOP 1 * FROM {table} WHERE {condition}")
    } else {
        format!("SELECT * FROM {table} WHERE {condition} LIMIT 1")
    }
}

/// Documents are keyed by `_id`; a top-level `id` in a filter means that.
fn document_filter(mut filter: Document) -> Document {
    if !filter.contains_key(DOCUMENT_ID) {
        if let Some(id) = filter.remove("id") {
            filter.insert(DOCUMENT_ID, id);
        }
    }
    filter
}

fn document_key(key: &str) -> &str {
    if key == "id" { DOCUMENT_ID } else { key }
}

impl DataAccess for Connection {
    fn backend(&self) -> Backend {
        self.driver.backend()
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let (driver, _) = self.statement("query")?;
        driver.query(sql, params)
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        let (driver, _) = self.statement("execute")?;
        driver.execute(sql, params)
    }

    /// Postgres and SQL Server read `key` from the row the statement returns,
    /// or report null when the table has no such column. Other SQL backends
    /// use the driver's last insert id unless `attributes` already carries
    /// the key. The document store returns the new `_id` as text.
    fn insert_returning(&mut self, table: &str, attributes: &Document, key: &str) -> Result<Value> {
        if let Driver::Document(driver) = &mut self.driver {
            let id = driver.insert_one(table, attributes.clone())?;
            return Ok(Value::Text(id));
        }
        let (driver, dialect) = self.statement("insert")?;
        let columns: Vec<&str> = attributes.keys().collect();
        let values: Vec<Value> = attributes.iter().map(|(_, v)| v.clone()).collect();
        let sql = insert_sql(dialect, table, &columns);
        match dialect {
            Dialect::Postgres | Dialect::SqlServer => {
                let rows = driver.query(&sql, &values)?;
                Ok(rows
                    .first()
                    .and_then(|row| row.get_by_name(key))
                    .cloned()
                    .unwrap_or(Value::Null))
            }
            Dialect::MySql | Dialect::Sqlite => {
                driver.execute(&sql, &values)?;
                match attributes.get(key) {
                    Some(value) if !value.is_null() => Ok(value.clone()),
                    _ => Ok(Value::BigInt(driver.last_insert_id()?)),
                }
            }
        }
    }

    fn update(
        &mut self,
        table: &str,
        attributes: &Document,
        where_fragment: &str,
        params: &[Value],
    ) -> Result<u64> {
        let (driver, dialect) = self.statement("update with a SQL condition")?;
        if attributes.is_empty() {
            return Ok(0);
        }
        let columns: Vec<&str> = attributes.keys().collect();
        let sql = update_sql(dialect, table, &columns, where_fragment);
        let mut bound: Vec<Value> = attributes.iter().map(|(_, v)| v.clone()).collect();
        bound.extend_from_slice(params);
        driver.execute(&sql, &bound)
    }

    fn delete(&mut self, table: &str, where_fragment: &str, params: &[Value]) -> Result<u64> {
        let (driver, dialect) = self.statement("delete with a SQL condition")?;
        driver.execute(&delete_sql(dialect, table, where_fragment), params)
    }

    fn find(&mut self, table: &str, id: &Value, key: &str) -> Result<Option<Row>> {
        if let Driver::Document(driver) = &mut self.driver {
            let filter = Document::new().with(document_key(key), id.clone());
            let rows = driver.find(table, filter, FindOptions::new().limit(1))?;
            return Ok(rows.into_iter().next());
        }
        let (driver, dialect) = self.statement("find")?;
        let rows = driver.query(&find_sql(dialect, table, key), std::slice::from_ref(id))?;
        Ok(rows.into_iter().next())
    }

    fn all(&mut self, table: &str) -> Result<Vec<Row>> {
        if let Driver::Document(driver) = &mut self.driver {
            return driver.find(table, Document::new(), FindOptions::new());
        }
        let (driver, dialect) = self.statement("all")?;
        driver.query(&format!("SELECT * FROM {}", dialect.quote_qualified(table)), &[])
    }

    fn begin_transaction(&mut self) -> Result<()> {
        match &mut self.driver {
            Driver::Statement(driver) => driver.begin_transaction(),
            Driver::Document(driver) => driver.begin_transaction(),
        }
    }

    fn commit(&mut self) -> Result<()> {
        match &mut self.driver {
            Driver::Statement(driver) => driver.commit(),
            Driver::Document(driver) => driver.commit(),
        }
    }

    fn rollback(&mut self) -> Result<()> {
        match &mut self.driver {
            Driver::Statement(driver) => driver.rollback(),
            Driver::Document(driver) => driver.rollback(),
        }
    }

    fn find_documents(
        &mut self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> Result<Vec<Row>> {
        self.document("find_documents")?
            .find(collection, document_filter(filter), options)
    }

    fn count_documents(&mut self, collection: &str, filter: Document) -> Result<u64> {
        self.document("count_documents")?
            .count(collection, document_filter(filter))
    }

    fn update_documents(
        &mut self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<u64> {
        let op = DocumentOp::UpdateMany {
            filter: document_filter(filter),
            update: normalize_update(update),
        };
        self.document("update_documents")?.execute(collection, op)
    }

    fn delete_documents(&mut self, collection: &str, filter: Document) -> Result<u64> {
        let op = DocumentOp::DeleteMany(document_filter(filter));
        self.document("delete_documents")?.execute(collection, op)
    }

    fn list_collections(&mut self) -> Result<Vec<String>> {
        self.document("list_collections")?.list_collections()
    }

    fn create_collection(&mut self, name: &str) -> Result<()> {
        self.document("create_collection")?.create_collection(name)
    }

    fn drop_collection(&mut self, name: &str) -> Result<()> {
        self.document("drop_collection")?.drop_collection(name)
    }
}
