//! The data-access surface shared by the query and schema layers.

use crate::config::Backend;
use crate::dialect::Dialect;
use crate::document::Document;
use crate::driver::FindOptions;
use crate::error::{Error, Result};
use crate::row::Row;
use crate::value::Value;

/// Backend-agnostic CRUD plus the raw statement and document primitives.
///
/// Implemented by the connection facade. Record, query builder, schema and
/// migrator code is written against this trait so it never names a driver.
pub trait DataAccess {
    fn backend(&self) -> Backend;

    fn dialect(&self) -> Option<Dialect> {
        self.backend().dialect()
    }

    fn is_nosql(&self) -> bool {
        self.backend().is_document()
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Insert one row (or document) and return the value of `key` for it.
    fn insert_returning(&mut self, table: &str, attributes: &Document, key: &str)
    -> Result<Value>;

    /// Insert keyed on `id`.
    fn insert(&mut self, table: &str, attributes: &Document) -> Result<Value> {
        self.insert_returning(table, attributes, "id")
    }

    /// `UPDATE table SET … WHERE <where_fragment>`.
    ///
    /// The fragment is pasted into the statement text as-is; only `params`
    /// are bound. Never build it from untrusted input.
    fn update(
        &mut self,
        table: &str,
        attributes: &Document,
        where_fragment: &str,
        params: &[Value],
    ) -> Result<u64>;

    /// `DELETE FROM table WHERE <where_fragment>`, with the same caveat as
    /// [`DataAccess::update`].
    fn delete(&mut self, table: &str, where_fragment: &str, params: &[Value]) -> Result<u64>;

    /// Fetch the single row whose `key` equals `id`.
    fn find(&mut self, table: &str, id: &Value, key: &str) -> Result<Option<Row>>;

    fn all(&mut self, table: &str) -> Result<Vec<Row>>;

    fn begin_transaction(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;

    fn find_documents(
        &mut self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> Result<Vec<Row>>;

    fn count_documents(&mut self, collection: &str, filter: Document) -> Result<u64>;

    fn update_documents(
        &mut self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<u64>;

    fn delete_documents(&mut self, collection: &str, filter: Document) -> Result<u64>;

    fn list_collections(&mut self) -> Result<Vec<String>>;
    fn create_collection(&mut self, name: &str) -> Result<()>;
    fn drop_collection(&mut self, name: &str) -> Result<()>;

    /// The SQL dialect, or an error when the backend is the document store.
    fn require_dialect(&self) -> Result<Dialect> {
        self.dialect().ok_or_else(|| {
            Error::invalid_state(format!(
                "operation requires a SQL backend, but the connection uses '{}'",
                self.backend()
            ))
        })
    }
}
