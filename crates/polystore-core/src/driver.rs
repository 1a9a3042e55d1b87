//! Driver capability traits.
//!
//! - [`StatementDriver`] is implemented by every SQL-speaking backend.
//! - [`DocumentDriver`] is implemented by the document store.
//!
//! All methods block the calling thread and take `&mut self`: a driver owns
//! exactly one connection and is never shared.

use crate::config::Backend;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::row::Row;
use crate::value::Value;
use std::str::FromStr;

/// A relational backend that runs SQL with positional parameters.
///
/// Parameters are always bound through the backend's native mechanism and
/// never spliced into the statement text.
pub trait StatementDriver: Send {
    /// Run a statement that returns rows.
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Run a statement and return the number of affected rows.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Identifier generated by the most recent insert on this connection.
    fn last_insert_id(&mut self) -> Result<i64>;

    /// Open a transaction. Fails if one is already open.
    fn begin_transaction(&mut self) -> Result<()>;

    /// Commit the open transaction. Fails if none is open.
    fn commit(&mut self) -> Result<()>;

    /// Roll back the open transaction. Fails if none is open.
    fn rollback(&mut self) -> Result<()>;

    fn in_transaction(&self) -> bool;

    /// Close the connection. Later calls fail with a connection error.
    fn disconnect(&mut self) -> Result<()>;

    fn backend(&self) -> Backend;
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl Order {
    pub const fn as_sql(self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }

    /// `1` or `-1`, as document stores expect in sort specifications.
    pub const fn as_sign(self) -> i32 {
        match self {
            Order::Asc => 1,
            Order::Desc => -1,
        }
    }
}

impl FromStr for Order {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Order::Asc),
            "desc" => Ok(Order::Desc),
            other => Err(Error::invalid_state(format!(
                "invalid sort direction '{}'",
                other
            ))),
        }
    }
}

/// Sort, limit and skip for a document query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Vec<(String, Order)>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort(mut self, field: impl Into<String>, order: Order) -> Self {
        self.sort.push((field.into(), order));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }
}

/// A write operation against one collection.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentOp {
    Insert(Document),
    InsertMany(Vec<Document>),
    Update { filter: Document, update: Document },
    UpdateMany { filter: Document, update: Document },
    Delete(Document),
    DeleteMany(Document),
}

impl DocumentOp {
    /// Build an operation from its tag name.
    ///
    /// Inserts take their documents from `payload`; updates take the first
    /// payload document as the update; deletes ignore `payload`.
    pub fn from_tag(tag: &str, filter: Document, mut payload: Vec<Document>) -> Result<Self> {
        let first = |payload: &mut Vec<Document>| {
            if payload.is_empty() {
                Err(Error::invalid_state(format!(
                    "document operation '{}' needs a payload",
                    tag
                )))
            } else {
                Ok(payload.remove(0))
            }
        };
        match tag {
            "insert" => Ok(DocumentOp::Insert(first(&mut payload)?)),
            "insertMany" => Ok(DocumentOp::InsertMany(payload)),
            "update" => Ok(DocumentOp::Update {
                filter,
                update: first(&mut payload)?,
            }),
            "updateMany" => Ok(DocumentOp::UpdateMany {
                filter,
                update: first(&mut payload)?,
            }),
            "delete" => Ok(DocumentOp::Delete(filter)),
            "deleteMany" => Ok(DocumentOp::DeleteMany(filter)),
            other => Err(Error::invalid_state(format!(
                "unknown document operation '{}'",
                other
            ))),
        }
    }

    pub const fn tag(&self) -> &'static str {
        match self {
            DocumentOp::Insert(_) => "insert",
            DocumentOp::InsertMany(_) => "insertMany",
            DocumentOp::Update { .. } => "update",
            DocumentOp::UpdateMany { .. } => "updateMany",
            DocumentOp::Delete(_) => "delete",
            DocumentOp::DeleteMany(_) => "deleteMany",
        }
    }
}

/// Wrap a plain update payload in `$set`.
///
/// Payloads that already start with an operator (`$set`, `$inc`, ...) are
/// returned unchanged.
pub fn normalize_update(update: Document) -> Document {
    if update.keys().any(|k| k.starts_with('$')) {
        return update;
    }
    let fields: serde_json::Map<String, serde_json::Value> = update
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_json()))
        .collect();
    Document::new().with("$set", Value::Json(serde_json::Value::Object(fields)))
}

/// A document store addressed by collection name and filter documents.
pub trait DocumentDriver: Send {
    fn find(&mut self, collection: &str, filter: Document, options: FindOptions)
    -> Result<Vec<Row>>;

    /// Run a write operation and return the number of documents touched.
    fn execute(&mut self, collection: &str, op: DocumentOp) -> Result<u64>;

    /// Insert one document and return its generated id as a string.
    fn insert_one(&mut self, collection: &str, doc: Document) -> Result<String>;

    fn count(&mut self, collection: &str, filter: Document) -> Result<u64>;

    /// Always `0`: document ids are not integers.
    fn last_insert_id(&self) -> i64 {
        0
    }

    fn begin_transaction(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;
    fn in_transaction(&self) -> bool;

    fn list_collections(&mut self) -> Result<Vec<String>>;
    fn create_collection(&mut self, name: &str) -> Result<()>;
    fn drop_collection(&mut self, name: &str) -> Result<()>;

    fn disconnect(&mut self) -> Result<()>;
}

/// Fail unless no transaction is open.
pub fn ensure_can_begin(in_transaction: bool) -> Result<()> {
    if in_transaction {
        Err(Error::invalid_state("a transaction is already open"))
    } else {
        Ok(())
    }
}

/// Fail unless a transaction is open.
pub fn ensure_open_transaction(in_transaction: bool, action: &str) -> Result<()> {
    if in_transaction {
        Ok(())
    } else {
        Err(Error::invalid_state(format!(
            "cannot {} without an open transaction",
            action
        )))
    }
}
