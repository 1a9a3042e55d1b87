//! In-memory [`DataAccess`] that records what it is asked to do.

use polystore_core::{Backend, DataAccess, Document, FindOptions, Result, Row, Value};
use std::collections::VecDeque;

pub struct RecordingDb {
    backend: Backend,
    statements: Vec<(String, Vec<Value>)>,
    results: VecDeque<Vec<Row>>,
    next_id: i64,
    collections: Vec<String>,
}

fn keys(doc: &Document) -> String {
    doc.keys().collect::<Vec<_>>().join(", ")
}

impl RecordingDb {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            statements: Vec::new(),
            results: VecDeque::new(),
            next_id: 1,
            collections: Vec::new(),
        }
    }

    /// Queue the result of the next row-returning call.
    pub fn push_rows(&mut self, rows: Vec<Row>) {
        self.results.push_back(rows);
    }

    pub fn statements(&self) -> &[(String, Vec<Value>)] {
        &self.statements
    }

    fn record(&mut self, text: String, params: &[Value]) {
        self.statements.push((text, params.to_vec()));
    }

    fn next_rows(&mut self) -> Vec<Row> {
        self.results.pop_front().unwrap_or_default()
    }
}

impl DataAccess for RecordingDb {
    fn backend(&self) -> Backend {
        self.backend
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.record(sql.to_string(), params);
        Ok(self.next_rows())
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        self.record(sql.to_string(), params);
        Ok(0)
    }

    fn insert_returning(&mut self, table: &str, attributes: &Document, key: &str) -> Result<Value> {
        self.record(
            format!("INSERT {} ({}) RETURNING {}", table, keys(attributes), key),
            &[],
        );
        let id = self.next_id;
        self.next_id += 1;
        Ok(Value::BigInt(id))
    }

    fn update(
        &mut self,
        table: &str,
        attributes: &Document,
        where_fragment: &str,
        params: &[Value],
    ) -> Result<u64> {
        self.record(
            format!("UPDATE {} SET ({}) WHERE {}", table, keys(attributes), where_fragment),
            params,
        );
        Ok(1)
    }

    fn delete(&mut self, table: &str, where_fragment: &str, params: &[Value]) -> Result<u64> {
        self.record(format!("DELETE {} WHERE {}", table, where_fragment), params);
        Ok(1)
    }

    fn find(&mut self, table: &str, id: &Value, key: &str) -> Result<Option<Row>> {
        self.record(format!("FIND {} {}", table, key), std::slice::from_ref(id));
        Ok(self.next_rows().into_iter().next())
    }

    fn all(&mut self, table: &str) -> Result<Vec<Row>> {
        self.record(format!("ALL {}", table), &[]);
        Ok(self.next_rows())
    }

    fn begin_transaction(&mut self) -> Result<()> {
        self.record("BEGIN".to_string(), &[]);
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.record("COMMIT".to_string(), &[]);
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.record("ROLLBACK".to_string(), &[]);
        Ok(())
    }

    fn find_documents(
        &mut self,
        collection: &str,
        filter: Document,
        _options: FindOptions,
    ) -> Result<Vec<Row>> {
        self.record(format!("findDocuments {} {{{}}}", collection, keys(&filter)), &[]);
        Ok(self.next_rows())
    }

    fn count_documents(&mut self, collection: &str, filter: Document) -> Result<u64> {
        self.record(format!("countDocuments {} {{{}}}", collection, keys(&filter)), &[]);
        Ok(self.next_rows().len() as u64)
    }

    fn update_documents(
        &mut self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<u64> {
        self.record(
            format!(
                "updateDocuments {} {{{}}} SET ({})",
                collection,
                keys(&filter),
                keys(&update)
            ),
            &[],
        );
        Ok(1)
    }

    fn delete_documents(&mut self, collection: &str, filter: Document) -> Result<u64> {
        self.record(format!("deleteDocuments {} {{{}}}", collection, keys(&filter)), &[]);
        Ok(1)
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
