//! Blocking document-store connection.

use crate::config::MongoConfig;
use crate::convert::{document_to_row, id_string, to_bson_document};
use bson::doc;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::sync::{Client, ClientSession, Collection};
use polystore_core::{
    Backend, ConnectionError, ConnectionErrorKind, Document, DocumentDriver, DocumentOp, Error,
    FindOptions, Result, Row, StatementError, StatementErrorKind, ensure_can_begin,
    ensure_open_transaction, normalize_update,
};

/// Attach the open session, if any, to a driver action and run it.
macro_rules! run_in_session {
    ($session:expr, $action:expr) => {
        match $session {
            Some(session) => $action.session(&mut *session).run(),
            None => $action.run(),
        }
    };
}

/// A connection to one database of a document store.
pub struct MongoDriver {
    config: MongoConfig,
    client: Option<Client>,
    session: Option<ClientSession>,
}

impl std::fmt::Debug for MongoDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoDriver")
            .field("database", &self.config.database)
            .field("connected", &self.client.is_some())
            .field("in_transaction", &self.session.is_some())
            .finish_non_exhaustive()
    }
}

impl MongoDriver {
    /// Connect and verify the server answers a `ping`.
    pub fn connect(config: MongoConfig) -> Result<Self> {
        let uri = config.connection_uri()?;
        let client = Client::with_uri_str(&uri).map_err(|e| {
            ConnectionError::new(
                Backend::Mongo,
                ConnectionErrorKind::Connect,
                format!("invalid connection string: {}", e),
            )
            .with_source(e)
        })?;
        client
            .database(&config.database)
            .run_command(doc! { "ping": 1 })
            .run()
            .map_err(connect_error)?;

        tracing::info!(
            backend = "mongodb",
            database = %config.database,
            "document store connection established"
        );
        Ok(Self {
            config,
            client: Some(client),
            session: None,
        })
    }

    pub fn database_name(&self) -> &str {
        &self.config.database
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    fn client(&self) -> Result<&Client> {
        self.client.as_ref().ok_or_else(closed)
    }

    fn collection(&self, name: &str) -> Result<Collection<bson::Document>> {
        Ok(self
            .client()?
            .database(&self.config.database)
            .collection(name))
    }
}

impl DocumentDriver for MongoDriver {
    fn find(&mut self, collection: &str, filter: Document, options: FindOptions) -> Result<Vec<Row>> {
        tracing::debug!(
            backend = "mongodb",
            collection,
            filter = filter.len(),
            "find"
        );
        let coll = self.collection(collection)?;
        let mut sort = bson::Document::new();
        for (field, order) in &options.sort {
            sort.insert(field.clone(), order.as_sign());
        }
        let mut action = coll.find(to_bson_document(&filter));
        if !sort.is_empty() {
            action = action.sort(sort);
        }
        if let Some(limit) = options.limit {
            action = action.limit(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if let Some(skip) = options.skip {
            action = action.skip(skip);
        }

        let fail = |e| statement_error(e, collection, "find");
        let documents = match self.session.as_mut() {
            Some(session) => {
                let mut cursor = action.session(&mut *session).run().map_err(fail)?;
                cursor
                    .iter(session)
                    .collect::<mongodb::error::Result<Vec<_>>>()
                    .map_err(fail)?
            }
            None => action
                .run()
                .map_err(fail)?
                .collect::<mongodb::error::Result<Vec<_>>>()
                .map_err(fail)?,
        };
        Ok(documents.into_iter().map(document_to_row).collect())
    }

    fn execute(&mut self, collection: &str, op: DocumentOp) -> Result<u64> {
        let tag = op.tag();
        tracing::debug!(backend = "mongodb", collection, op = tag, "execute");
        let coll = self.collection(collection)?;
        let session = self.session.as_mut();
        let fail = |e| statement_error(e, collection, tag);

        let touched = match op {
            DocumentOp::Insert(doc) => {
                run_in_session!(session, coll.insert_one(to_bson_document(&doc))).map_err(fail)?;
                1
            }
            DocumentOp::InsertMany(docs) => {
                if docs.is_empty() {
                    return Ok(0);
                }
                let docs: Vec<_> = docs.iter().map(to_bson_document).collect();
                let result = run_in_session!(session, coll.insert_many(docs)).map_err(fail)?;
                result.inserted_ids.len() as u64
            }
            DocumentOp::Update { filter, update } => {
                let update = to_bson_document(&normalize_update(update));
                run_in_session!(session, coll.update_one(to_bson_document(&filter), update))
                    .map_err(fail)?
                    .modified_count
            }
            DocumentOp::UpdateMany { filter, update } => {
                let update = to_bson_document(&normalize_update(update));
                run_in_session!(session, coll.update_many(to_bson_document(&filter), update))
                    .map_err(fail)?
                    .modified_count
            }
            DocumentOp::Delete(filter) => {
                run_in_session!(session, coll.delete_one(to_bson_document(&filter)))
                    .map_err(fail)?
                    .deleted_count
            }
            DocumentOp::DeleteMany(filter) => {
                run_in_session!(session, coll.delete_many(to_bson_document(&filter)))
                    .map_err(fail)?
                    .deleted_count
            }
        };
        Ok(touched)
    }

    fn insert_one(&mut self, collection: &str, doc: Document) -> Result<String> {
        tracing::debug!(backend = "mongodb", collection, "insert_one");
        let coll = self.collection(collection)?;
        let result = run_in_session!(self.session.as_mut(), coll.insert_one(to_bson_document(&doc)))
            .map_err(|e| statement_error(e, collection, "insert"))?;
        Ok(id_string(result.inserted_id))
    }

    fn count(&mut self, collection: &str, filter: Document) -> Result<u64> {
        let coll = self.collection(collection)?;
        run_in_session!(
            self.session.as_mut(),
            coll.count_documents(to_bson_document(&filter))
        )
        .map_err(|e| statement_error(e, collection, "count"))
    }

    fn begin_transaction(&mut self) -> Result<()> {
        ensure_can_begin(self.session.is_some())?;
        let fail = |e| statement_error(e, "", "startTransaction");
        let mut session = self.client()?.start_session().run().map_err(fail)?;
        session.start_transaction().run().map_err(fail)?;
        self.session = Some(session);
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        ensure_open_transaction(self.session.is_some(), "commit")?;
        if let Some(mut session) = self.session.take() {
            session
                .commit_transaction()
                .run()
                .map_err(|e| statement_error(e, "", "commitTransaction"))?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        ensure_open_transaction(self.session.is_some(), "roll back")?;
        if let Some(mut session) = self.session.take() {
            session
                .abort_transaction()
                .run()
                .map_err(|e| statement_error(e, "", "abortTransaction"))?;
        }
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.session.is_some()
    }

    fn list_collections(&mut self) -> Result<Vec<String>> {
        let mut names = self
            .client()?
            .database(&self.config.database)
            .list_collection_names()
            .run()
            .map_err(|e| statement_error(e, "", "listCollections"))?;
        names.sort();
        Ok(names)
    }

    fn create_collection(&mut self, name: &str) -> Result<()> {
        tracing::debug!(backend = "mongodb", collection = name, "create collection");
        self.client()?
            .database(&self.config.database)
            .create_collection(name)
            .run()
            .map_err(|e| statement_error(e, name, "create"))
    }

    fn drop_collection(&mut self, name: &str) -> Result<()> {
        tracing::debug!(backend = "mongodb", collection = name, "drop collection");
        self.collection(name)?
            .drop()
            .run()
            .map_err(|e| statement_error(e, name, "drop"))
    }

    fn disconnect(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.abort_transaction().run() {
                tracing::warn!(backend = "mongodb", error = %e, "failed to abort open transaction");
            }
        }
        if self.client.take().is_some() {
            tracing::info!(
                backend = "mongodb",
                database = %self.config.database,
                "document store connection closed"
            );
        }
        Ok(())
    }
}

impl Drop for MongoDriver {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}

/// Classify a server error code.
pub fn error_kind(code: i32) -> StatementErrorKind {
    match code {
        11000 | 11001 | 12582 => StatementErrorKind::Constraint,
        26 => StatementErrorKind::NotFound,
        13 => StatementErrorKind::Permission,
        112 | 251 => StatementErrorKind::Deadlock,
        50 => StatementErrorKind::Timeout,
        2 | 9 | 14 => StatementErrorKind::Syntax,
        _ => StatementErrorKind::Database,
    }
}

fn server_code(err: &mongodb::error::Error) -> Option<i32> {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => Some(e.code),
        ErrorKind::Command(e) => Some(e.code),
        _ => None,
    }
}

fn statement_error(err: mongodb::error::Error, collection: &str, op: &str) -> Error {
    if matches!(
        err.kind.as_ref(),
        ErrorKind::Io(_) | ErrorKind::ServerSelection { .. }
    ) {
        return ConnectionError::new(
            Backend::Mongo,
            ConnectionErrorKind::Disconnected,
            format!("server unavailable: {}", err),
        )
        .with_source(err)
        .into();
    }
    let code = server_code(&err);
    let kind = code.map_or(StatementErrorKind::Database, error_kind);
    let target = if collection.is_empty() {
        op.to_string()
    } else {
        format!("{} {}", op, collection)
    };
    let mut statement = StatementError::new(Backend::Mongo, kind, err.to_string()).with_sql(target);
    if matches!(code, Some(11000 | 11001)) {
        statement = statement.with_sqlstate("23505");
    }
    statement.with_source(err).into()
}

fn connect_error(err: mongodb::error::Error) -> Error {
    let kind = match err.kind.as_ref() {
        ErrorKind::Authentication { .. } => ConnectionErrorKind::Authentication,
        ErrorKind::ServerSelection { .. } => ConnectionErrorKind::Timeout,
        _ => ConnectionErrorKind::Connect,
    };
    ConnectionError::new(Backend::Mongo, kind, format!("cannot reach server: {}", err))
        .with_source(err)
        .into()
}

fn closed() -> Error {
    ConnectionError::new(
        Backend::Mongo,
        ConnectionErrorKind::Disconnected,
        "connection is closed",
    )
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(error_kind(11000), StatementErrorKind::Constraint);
        assert_eq!(error_kind(26), StatementErrorKind::NotFound);
        assert_eq!(error_kind(13), StatementErrorKind::Permission);
        assert_eq!(error_kind(112), StatementErrorKind::Deadlock);
        assert_eq!(error_kind(2), StatementErrorKind::Syntax);
        assert_eq!(error_kind(8000), StatementErrorKind::Database);
    }

    #[test]
    fn test_unreachable_server_is_connection_error() {
        let config = MongoConfig::new("polystore_test")
            .host("127.0.0.1")
            .port(1)
            .timeout(Duration::from_millis(500));
        let err = MongoDriver::connect(config).unwrap_err();
        assert!(err.is_connection_error());
        assert_eq!(err.backend(), Some(Backend::Mongo));
    }
}
