//! polystore: one data-access layer over relational, document and remote SQL
//! backends, with schema migrations.
//!
//! polystore provides:
//!
//! - A [`Connection`] facade that picks a driver from configuration and offers
//!   the same CRUD helpers on every backend
//! - Drivers for SQLite, MySQL, PostgreSQL, SQL Server, Turso (libSQL over
//!   HTTP) and MongoDB
//! - A [`QueryBuilder`], active [`Record`]s and the [`Model`] trait
//! - Schema [`Blueprint`]s compiled per dialect, and a batch-numbered
//!   [`Migrator`]
//!
//! # Quick Start
//!
//! ```ignore
//! use polystore::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let mut conn = Connection::open(&ConnectionConfig::new("sqlite").database(":memory:"))?;
//!
//!     Schema::new(&mut conn).create("widgets", |t| {
//!         t.id();
//!         t.string("name").unique();
//!         t.timestamps();
//!     })?;
//!
//!     let id = conn.insert("widgets", &Document::new().with("name", "gizmo"))?;
//!     let widget = conn.find("widgets", &id, "id")?;
//!
//!     let cheap = QueryBuilder::new("widgets")
//!         .where_op("price", Operator::Lt, 10)
//!         .order_by("name", Order::Asc)
//!         .get(&mut conn)?;
//!
//!     let migrations = MigrationSet::from_directory("migrations")?;
//!     let applied = Migrator::new(migrations).run(&mut conn)?;
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! | driver name | backend |
//! |---|---|
//! | `sqlite` | embedded SQLite file or `:memory:` |
//! | `mysql` | MySQL / MariaDB |
//! | `pgsql`, `postgres` | PostgreSQL |
//! | `sqlsrv`, `sqlserver` | SQL Server |
//! | `turso`, `libsql` | remote libSQL pipeline |
//! | `mongodb`, `mongo` | MongoDB |

pub mod connection;

pub use connection::{Connection, Driver};

// Core types
pub use polystore_core::{
    Backend, ColumnInfo, ConnectionConfig, DataAccess, Dialect, Document, DocumentDriver,
    DocumentOp, Error, FindOptions, FromValue, Order, Result, Row, StatementDriver, Value,
};
pub use polystore_core::{
    ConfigError, ConnectionError, ConnectionErrorKind, ProtocolError, StatementError,
    StatementErrorKind, TypeError,
};

// Query building
pub use polystore_query::{Condition, Model, Operator, OrderBy, QueryBuilder, Record};

// Schema and migrations
pub use polystore_schema::{
    Blueprint, Column, ColumnType, ForeignKey, IndexKind, Migration, MigrationLock, MigrationSet,
    MigrationStatus, Migrator, ReferentialAction, Schema, SqlMigration,
};

// Drivers
pub use polystore_mongo::{MongoConfig, MongoDriver};
pub use polystore_mssql::{MssqlConfig, MssqlDriver};
pub use polystore_mysql::{MySqlConfig, MySqlDriver};
pub use polystore_postgres::{PgConfig, PgDriver};
pub use polystore_sqlite::{SqliteConfig, SqliteDriver};
pub use polystore_turso::{TursoConfig, TursoDriver};

/// Everything most applications need.
pub mod prelude {
    pub use crate::{
        // Connection
        Backend,
        Connection,
        ConnectionConfig,
        DataAccess,
        Dialect,
        Document,
        Error,
        FindOptions,
        // Schema
        Blueprint,
        Migration,
        MigrationSet,
        Migrator,
        // Query building
        Model,
        Operator,
        Order,
        QueryBuilder,
        Record,
        Result,
        Row,
        Schema,
        SqlMigration,
        Value,
    };
}
