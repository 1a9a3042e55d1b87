//! A [`DataAccess`] that records statements and replays queued query results.

use polystore_core::{
    Backend, DataAccess, Document, Error, FindOptions, Result, Row, StatementError,
    StatementErrorKind, Value,
};
use std::collections::VecDeque;

pub struct ScriptedDb {
    backend: Backend,
    executed: Vec<String>,
    queries: Vec<(String, Vec<Value>)>,
    results: VecDeque<Vec<Row>>,
    collections: Vec<String>,
    fail_on: Option<String>,
}

impl ScriptedDb {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            executed: Vec::new(),
            queries: Vec::new(),
            results: VecDeque::new(),
            collections: Vec::new(),
            fail_on: None,
        }
    }

    /// Make every executed statement starting with `prefix` fail.
    pub fn fail_on(&mut self, prefix: &str) {
        self.fail_on = Some(prefix.to_string());
    }

    pub fn push_rows(&mut self, rows: Vec<Row>) {
        self.results.push_back(rows);
    }

    /// Queue a one-column result of names.
    pub fn push_names(&mut self, names: &[&str]) {
        self.push_rows(
            names
                .iter()
                .map(|n| Row::new(vec!["name".into()], vec![Value::from(*n)]))
                .collect(),
        );
    }

    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    pub fn queries(&self) -> &[(String, Vec<Value>)] {
        &self.queries
    }
}

fn unsupported(what: &str) -> Error {
    Error::invalid_state(format!("{what} is not scripted"))
}

impl DataAccess for ScriptedDb {
    fn backend(&self) -> Backend {
        self.backend
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.queries.push((sql.to_string(), params.to_vec()));
        Ok(self.results.pop_front().unwrap_or_default())
    }

    fn execute(&mut self, sql: &str, _params: &[Value]) -> Result<u64> {
        self.executed.push(sql.to_string());
        if self.fail_on.as_deref().is_some_and(|prefix| sql.starts_with(prefix)) {
            let err = StatementError::new(
                self.backend,
                StatementErrorKind::Database,
                "scripted failure",
            );
            return Err(err.with_sql(sql).into());
        }
        Ok(0)
    }

    fn insert_returning(&mut self, _table: &str, _attributes: &Document, _key: &str) -> Result<Value> {
        Err(unsupported("insert"))
    }

    fn update(&mut self, _: &str, _: &Document, _: &str, _: &[Value]) -> Result<u64> {
        Err(unsupported("update"))
    }

    fn delete(&mut self, _table: &str, _where_fragment: &str, _params: &[Value]) -> Result<u64> {
        Err(unsupported("delete"))
    }

    fn find(&mut self, _table: &str, _id: &Value, _key: &str) -> Result<Option<Row>> {
        Err(unsupported("find"))
    }

    fn all(&mut self, _table: &str) -> Result<Vec<Row>> {
        Err(unsupported("all"))
    }

    fn begin_transaction(&mut self) -> Result<()> {
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        Ok(())
    }

    fn find_documents(&mut self, _: &str, _: Document, _: FindOptions) -> Result<Vec<Row>> {
        Err(unsupported("find_documents"))
    }

    fn count_documents(&mut self, _collection: &str, _filter: Document) -> Result<u64> {
        Err(unsupported("count_documents"))
    }

    fn update_documents(&mut self, _: &str, _: Document, _: Document) -> Result<u64> {
        Err(unsupported("update_documents"))
    }

    fn delete_documents(&mut self, _collection: &str, _filter: Document) -> Result<u64> {
        Err(unsupported("delete_documents"))
    }

    fn list_collections(&mut self) -> Result<Vec<String>> {
        Ok(self.collections.clone())
    }

    fn create_collection(&mut self, name: &str) -> Result<()> {
        self.collections.push(name.to_string());
        Ok(())
    }

    fn drop_collection(&mut self, name: &str) -> Result<()> {
        self.collections.retain(|c| c != name);
        Ok(())
    }
}
