//! Typed models backed by [`Record`]s.

use crate::builder::QueryBuilder;
use crate::operator::Operator;
use crate::record::Record;
use polystore_core::{DataAccess, Document, Result, Value};

/// A Rust type stored as one row of [`Model::TABLE`].
///
/// Implementors convert to and from a [`Record`]; everything else is
/// provided.
///
/// ```ignore
/// struct Widget { id: Option<i64>, name: String }
///
/// impl Model for Widget {
///     const TABLE: &'static str = "widgets";
///
///     fn from_record(record: &Record) -> Result<Self> {
///         Ok(Widget { id: record.get_as("id")?, name: record.get_as("name")? })
///     }
///
///     fn into_record(self) -> Record {
///         Record::with_attributes(Self::TABLE, Document::new().with("id", self.id).with("name", self.name))
///     }
/// }
/// ```
pub trait Model: Sized {
    const TABLE: &'static str;
    const PRIMARY_KEY: &'static str = "id";

    fn from_record(record: &Record) -> Result<Self>;

    /// The model's attributes as an unsaved record of [`Model::TABLE`].
    fn into_record(self) -> Record;

    fn query() -> QueryBuilder {
        QueryBuilder::new(Self::TABLE).primary_key(Self::PRIMARY_KEY)
    }

    fn where_eq(column: impl Into<String>, value: impl Into<Value>) -> QueryBuilder {
        Self::query().where_eq(column, value)
    }

    fn where_op(column: impl Into<String>, op: Operator, value: impl Into<Value>) -> QueryBuilder {
        Self::query().where_op(column, op, value)
    }

    fn all<D: DataAccess + ?Sized>(db: &mut D) -> Result<Vec<Self>> {
        Self::query().get_models(db)
    }

    fn find<D: DataAccess + ?Sized>(db: &mut D, id: impl Into<Value>) -> Result<Option<Self>> {
        let id = id.into();
        match db.find(Self::TABLE, &id, Self::PRIMARY_KEY)? {
            Some(row) => {
                let record = Record::from_row(Self::TABLE, &row).primary_key(Self::PRIMARY_KEY);
                Self::from_record(&record).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Insert a row built from `attributes` and return it as a model.
    fn create<D: DataAccess + ?Sized>(db: &mut D, attributes: Document) -> Result<Self> {
        let mut record = Record::with_attributes(Self::TABLE, attributes).primary_key(Self::PRIMARY_KEY);
        record.save(db)?;
        Self::from_record(&record)
    }

    /// Insert the model, or update it when its key is already set.
    fn save<D: DataAccess + ?Sized>(self, db: &mut D) -> Result<Self> {
        let mut record = self.into_record().primary_key(Self::PRIMARY_KEY);
        if record.key().is_some() {
            record.mark_persisted();
        }
        record.save(db)?;
        Self::from_record(&record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingDb;
    use polystore_core::{Backend, Row};

    #[derive(Debug, PartialEq)]
    struct Widget {
        id: Option<i64>,
        name: String,
    }

    impl Model for Widget {
        const TABLE: &'static str = "widgets";

        fn from_record(record: &Record) -> Result<Self> {
            Ok(Widget {
                id: record.get_as("id")?,
                name: record.get_as("name")?,
            })
        }

        fn into_record(self) -> Record {
            Record::with_attributes(
                Self::TABLE,
                Document::new().with("id", self.id).with("name", self.name),
            )
        }
    }

    #[test]
    fn test_create_returns_model_with_key() {
        let mut db = RecordingDb::new(Backend::Sqlite);
        let widget = Widget::create(&mut db, Document::new().with("name", "gizmo")).unwrap();
        assert_eq!(
            widget,
            Widget {
                id: Some(1),
                name: "gizmo".into()
            }
        );
    }

    #[test]
    fn test_save_with_key_updates() {
        let mut db = RecordingDb::new(Backend::Sqlite);
        let widget = Widget {
            id: Some(9),
            name: "gadget".into(),
        }
        .save(&mut db)
        .unwrap();
        assert_eq!(widget.id, Some(9));
        assert_eq!(db.statements()[0].0, "UPDATE widgets SET (name) WHERE \"id\" = ?");
        assert_eq!(db.statements()[0].1, vec![Value::BigInt(9)]);
    }

    #[test]
    fn test_find_and_query_helpers() {
        let mut db = RecordingDb::new(Backend::Sqlite);
        db.push_rows(vec![Row::new(
            vec!["id".into(), "name".into()],
            vec![Value::BigInt(2), Value::from("gizmo")],
        )]);
        let found = Widget::find(&mut db, 2).unwrap().unwrap();
        assert_eq!(found.name, "gizmo");
        assert!(Widget::find(&mut db, 3).unwrap().is_none());

        let (sql, params) = Widget::where_op("name", Operator::Like, "giz%")
            .to_sql(polystore_core::Dialect::Sqlite);
        assert_eq!(sql, "SELECT * FROM \"widgets\" WHERE \"name\" LIKE ?");
        assert_eq!(params, vec![Value::from("giz%")]);
    }
}
