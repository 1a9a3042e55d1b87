//! Active records: a row plus its identity and change tracking.

use polystore_core::{DataAccess, Document, Error, FromValue, Result, Row, Value};

/// Field the document store keys documents by.
const DOCUMENT_ID: &str = "_id";

/// A row of `table` identified by its primary key.
///
/// A record is either new (`exists() == false`) or persisted. [`save`]
/// inserts a new record and stores the generated key; on a persisted record
/// it writes every attribute back, keyed on the primary key. Dirty tracking
/// is informational only.
///
/// Rows from the document store carry their key as `_id`. A record whose
/// primary key is the default `id` but has no `id` attribute uses `_id`.
///
/// [`save`]: Record::save
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    table: String,
    primary_key: String,
    attributes: Document,
    original: Document,
    exists: bool,
}

impl Record {
    /// An empty, unsaved record.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: "id".to_string(),
            attributes: Document::new(),
            original: Document::new(),
            exists: false,
        }
    }

    /// An unsaved record with initial attributes.
    pub fn with_attributes(table: impl Into<String>, attributes: Document) -> Self {
        let mut record = Self::new(table);
        record.attributes = attributes;
        record
    }

    /// A persisted record loaded from a result row.
    pub fn from_row(table: impl Into<String>, row: &Row) -> Self {
        let attributes = Document::from_row(row);
        Self {
            table: table.into(),
            primary_key: "id".to_string(),
            original: attributes.clone(),
            attributes,
            exists: true,
        }
    }

    pub fn primary_key(mut self, key: impl Into<String>) -> Self {
        self.primary_key = key.into();
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn key_name(&self) -> &str {
        &self.primary_key
    }

    /// The primary key value, if set and not null.
    pub fn key(&self) -> Option<&Value> {
        self.attributes
            .get(self.key_field())
            .filter(|v| !v.is_null())
    }

    /// The attribute holding the key.
    fn key_field(&self) -> &str {
        if self.primary_key == "id"
            && !self.attributes.contains_key("id")
            && self.attributes.contains_key(DOCUMENT_ID)
        {
            DOCUMENT_ID
        } else {
            &self.primary_key
        }
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.attributes.get(column)
    }

    /// Typed attribute access. A missing attribute reads as null.
    pub fn get_as<T: FromValue>(&self, column: &str) -> Result<T> {
        T::from_value(self.get(column).unwrap_or(&Value::Null)).map_err(|e| match e {
            Error::Type(mut te) => {
                te.column = Some(column.to_string());
                Error::Type(te)
            }
            other => other,
        })
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(column, value);
    }

    /// Set several attributes at once.
    pub fn fill(&mut self, attributes: Document) {
        for (column, value) in attributes {
            self.attributes.insert(column, value);
        }
    }

    pub fn attributes(&self) -> &Document {
        &self.attributes
    }

    pub fn into_attributes(self) -> Document {
        self.attributes
    }

    /// Treat the current attributes as stored.
    pub fn mark_persisted(&mut self) {
        self.original = self.attributes.clone();
        self.exists = true;
    }

    /// Attributes whose value differs from the last load or save.
    pub fn dirty(&self) -> Document {
        self.attributes
            .iter()
            .filter(|(column, value)| self.original.get(column) != Some(*value))
            .map(|(column, value)| (column.to_string(), value.clone()))
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.attributes
            .iter()
            .any(|(column, value)| self.original.get(column) != Some(value))
    }

    fn persisted_key(&self, action: &str) -> Result<Value> {
        if !self.exists {
            return Err(Error::invalid_state(format!(
                "cannot {} a record of '{}' that was never saved",
                action, self.table
            )));
        }
        self.key().cloned().ok_or_else(|| {
            Error::invalid_state(format!(
                "cannot {} a record of '{}' without a value for '{}'",
                action, self.table, self.primary_key
            ))
        })
    }

    /// Insert or update the backing row.
    pub fn save<D: DataAccess + ?Sized>(&mut self, db: &mut D) -> Result<()> {
        if !self.exists {
            let mut payload = self.attributes.clone();
            if self.key().is_none() {
                payload.remove(&self.primary_key);
            }
            let id = db.insert_returning(&self.table, &payload, &self.primary_key)?;
            tracing::debug!(table = %self.table, key = ?id, "record inserted");
            if self.key().is_none() && !id.is_null() {
                self.attributes.insert(self.primary_key.clone(), id);
            }
            self.mark_persisted();
            return Ok(());
        }

        let key = self.persisted_key("update")?;
        let mut changes = self.attributes.clone();
        changes.remove(&self.primary_key);
        if db.is_nosql() {
            changes.remove(DOCUMENT_ID);
        }
        if changes.is_empty() {
            return Ok(());
        }
        if db.is_nosql() {
            let filter = Document::new().with(self.key_field(), key);
            db.update_documents(&self.table, filter, changes)?;
        } else {
            let dialect = db.require_dialect()?;
            let fragment = format!(
                "{} = {}",
                dialect.quote_identifier(&self.primary_key),
                dialect.placeholder(changes.len() + 1)
            );
            db.update(&self.table, &changes, &fragment, &[key])?;
        }
        self.mark_persisted();
        Ok(())
    }

    /// Remove the backing row. The record keeps its attributes but no
    /// longer exists.
    pub fn delete<D: DataAccess + ?Sized>(&mut self, db: &mut D) -> Result<u64> {
        let key = self.persisted_key("delete")?;
        let deleted = if db.is_nosql() {
            let filter = Document::new().with(self.key_field(), key);
            db.delete_documents(&self.table, filter)?
        } else {
            let dialect = db.require_dialect()?;
            let fragment = format!(
                "{} = {}",
                dialect.quote_identifier(&self.primary_key),
                dialect.placeholder(1)
            );
            db.delete(&self.table, &fragment, &[key])?
        };
        self.exists = false;
        Ok(deleted)
    }

    /// Reload from the backend. `None` if the record is unsaved or its row
    /// is gone.
    pub fn fresh<D: DataAccess + ?Sized>(&self, db: &mut D) -> Result<Option<Record>> {
        let Some(key) = self.key().filter(|_| self.exists) else {
            return Ok(None);
        };
        let row = db.find(&self.table, key, self.key_field())?;
        Ok(row.map(|row| Record::from_row(self.table.clone(), &row).primary_key(&self.primary_key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QueryBuilder;
    use crate::testing::RecordingDb;
    use polystore_core::Backend;

    fn persisted() -> Record {
        Record::from_row(
            "widgets",
            &Row::new(
                vec!["id".into(), "name".into(), "price".into()],
                vec![Value::BigInt(3), Value::from("gizmo"), Value::Double(2.5)],
            ),
        )
    }

    #[test]
    fn test_dirty_tracking() {
        let mut record = persisted();
        assert!(record.exists());
        assert!(!record.is_dirty());
        record.set("price", 3.0);
        record.set("color", "red");
        assert!(record.is_dirty());
        let dirty = record.dirty();
        assert_eq!(dirty.keys().collect::<Vec<_>>(), vec!["price", "color"]);
    }

    #[test]
    fn test_typed_access() {
        let record = persisted();
        assert_eq!(record.get_as::<String>("name").unwrap(), "gizmo");
        assert_eq!(record.get_as::<Option<i64>>("missing").unwrap(), None);
        match record.get_as::<i64>("missing") {
            Err(Error::Type(te)) => assert_eq!(te.column.as_deref(), Some("missing")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_save_new_record_takes_generated_key() {
        let mut db = RecordingDb::new(Backend::Postgres);
        let mut record = Record::new("widgets");
        record.set("id", Value::Null);
        record.set("name", "gizmo");
        record.save(&mut db).unwrap();
        assert!(record.exists());
        assert_eq!(record.key(), Some(&Value::BigInt(1)));
        assert!(!record.is_dirty());
        // a null key is not sent to the backend
        assert_eq!(db.statements()[0].0, "INSERT widgets (name) RETURNING id");
    }

    #[test]
    fn test_save_persisted_record_updates_by_key() {
        let mut db = RecordingDb::new(Backend::Postgres);
        let mut record = persisted();
        record.set("name", "gadget");
        record.save(&mut db).unwrap();
        let (sql, params) = &db.statements()[0];
        assert_eq!(sql, "UPDATE widgets SET (name, price) WHERE \"id\" = $3");
        assert_eq!(params, &vec![Value::BigInt(3)]);
        assert!(!record.is_dirty());
    }

    #[test]
    fn test_delete_and_fresh() {
        let mut db = RecordingDb::new(Backend::SqlServer);
        let mut record = persisted();
        assert_eq!(record.delete(&mut db).unwrap(), 1);
        assert!(!record.exists());
        assert_eq!(db.statements()[0].0, "DELETE widgets WHERE [id] = @P1");
        assert!(matches!(record.delete(&mut db), Err(Error::InvalidState(_))));
        assert!(record.fresh(&mut db).unwrap().is_none());

        let record = persisted();
        db.push_rows(vec![Row::new(
            vec!["id".into(), "name".into()],
            vec![Value::BigInt(3), Value::from("reloaded")],
        )]);
        let fresh = record.fresh(&mut db).unwrap().unwrap();
        assert_eq!(fresh.get("name"), Some(&Value::from("reloaded")));
        assert_eq!(fresh.key_name(), "id");
    }

    #[test]
    fn test_document_backend_uses_filters() {
        let mut db = RecordingDb::new(Backend::Mongo);
        let mut record = Record::from_row(
            "widgets",
            &Row::new(
                vec!["_id".into(), "name".into()],
                vec![Value::from("65f1c0ffee0000000000abcd"), Value::from("gizmo")],
            ),
        )
        .primary_key("_id");
        record.set("name", "gadget");
        record.save(&mut db).unwrap();
        record.delete(&mut db).unwrap();
        let log: Vec<_> = db.statements().iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(
            log,
            vec![
                "updateDocuments widgets {_id} SET (name)",
                "deleteDocuments widgets {_id}"
            ]
        );
    }

    #[test]
    fn test_loaded_document_saves_by_object_id() {
        let mut db = RecordingDb::new(Backend::Mongo);
        db.push_rows(vec![Row::new(
            vec!["_id".into(), "name".into()],
            vec![Value::from("65a1c0ffee0000000000abcd"), Value::from("gear")],
        )]);
        let mut record = QueryBuilder::new("widgets").first(&mut db).unwrap().unwrap();
        assert_eq!(record.key(), Some(&Value::from("65a1c0ffee0000000000abcd")));

        record.set("name", "cog");
        record.save(&mut db).unwrap();
        assert_eq!(
            db.statements().last().unwrap().0,
            "updateDocuments widgets {_id} SET (name)"
        );

        assert_eq!(record.delete(&mut db).unwrap(), 1);
        assert_eq!(
            db.statements().last().unwrap().0,
            "deleteDocuments widgets {_id}"
        );
    }
}
