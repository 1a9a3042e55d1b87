//! Fluent SELECT builder.

use crate::clause::{Condition, OrderBy};
use crate::filter;
use crate::model::Model;
use crate::operator::Operator;
use crate::record::Record;
use polystore_core::{
    DataAccess, Dialect, Document, Error, FindOptions, Order, Result, TypeError, Value,
};

/// A single-table query.
///
/// Builders are consumed by value; start every logical query from
/// [`QueryBuilder::new`].
///
/// ```ignore
/// let cheap = QueryBuilder::new("widgets")
///     .where_op("price", Operator::Lt, 10)
///     .order_by("name", Order::Asc)
///     .limit(20)
///     .get(&mut conn)?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct QueryBuilder {
    table: String,
    primary_key: String,
    columns: Vec<String>,
    conditions: Vec<Condition>,
    orders: Vec<OrderBy>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl QueryBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: "id".to_string(),
            columns: Vec::new(),
            conditions: Vec::new(),
            orders: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Key column given to the records this query returns.
    pub fn primary_key(mut self, key: impl Into<String>) -> Self {
        self.primary_key = key.into();
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Restrict the selected columns (default `*`).
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn where_op(mut self, column: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Compare {
            column: column.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn where_eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.where_op(column, Operator::Eq, value)
    }

    /// Like [`where_op`](Self::where_op) with the operator given as text
    /// (`"="`, `"<>"`, `"like"`, ...).
    pub fn where_expr(
        self,
        column: impl Into<String>,
        op: &str,
        value: impl Into<Value>,
    ) -> Result<Self> {
        Ok(self.where_op(column, op.parse()?, value))
    }

    pub fn where_in<I, V>(mut self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.conditions.push(Condition::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn where_null(mut self, column: impl Into<String>) -> Self {
        self.conditions.push(Condition::Null(column.into()));
        self
    }

    pub fn where_not_null(mut self, column: impl Into<String>) -> Self {
        self.conditions.push(Condition::NotNull(column.into()));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        self.orders.push(OrderBy {
            column: column.into(),
            order,
        });
        self
    }

    pub fn order_by_desc(self, column: impl Into<String>) -> Self {
        self.order_by(column, Order::Desc)
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    fn build_from_where(&self, dialect: Dialect, sql: &mut String, params: &mut Vec<Value>) {
        sql.push_str(" FROM ");
        sql.push_str(&dialect.quote_qualified(&self.table));
        if !self.conditions.is_empty() {
            let parts: Vec<String> = self
                .conditions
                .iter()
                .map(|c| c.build(dialect, params))
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&parts.join(" AND "));
        }
    }

    /// Compile to one `SELECT` and its bound values.
    pub fn to_sql(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let mut sql = String::from("SELECT ");
        if self.columns.is_empty() {
            sql.push('*');
        } else {
            let columns: Vec<String> = self
                .columns
                .iter()
                .map(|c| dialect.quote_qualified(c))
                .collect();
            sql.push_str(&columns.join(", "));
        }
        self.build_from_where(dialect, &mut sql, &mut params);

        if !self.orders.is_empty() {
            let orders: Vec<String> = self.orders.iter().map(|o| o.to_sql(dialect)).collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&orders.join(", "));
        } else if dialect == Dialect::SqlServer && (self.limit.is_some() || self.offset.is_some()) {
            // OFFSET/FETCH is only valid after ORDER BY
            sql.push_str(" ORDER BY (SELECT NULL)");
        }

        let paging = dialect.limit_clause(self.limit, self.offset);
        if !paging.is_empty() {
            sql.push(' ');
            sql.push_str(&paging);
        }
        (sql, params)
    }

    /// `SELECT COUNT(*) AS aggregate` with the same conditions; ordering and
    /// paging are ignored.
    pub fn to_count_sql(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let mut sql = String::from("SELECT COUNT(*) AS aggregate");
        self.build_from_where(dialect, &mut sql, &mut params);
        (sql, params)
    }

    /// Compile for the document store: a filter plus sort/limit/skip.
    /// Column selection does not apply there.
    pub fn to_document_query(&self) -> (Document, FindOptions) {
        let options = FindOptions {
            sort: self
                .orders
                .iter()
                .map(|o| (o.column.clone(), o.order))
                .collect(),
            limit: self.limit,
            skip: self.offset,
        };
        (filter::compile(&self.conditions), options)
    }

    /// Run the query and wrap each row in a persisted [`Record`].
    pub fn get<D: DataAccess + ?Sized>(self, db: &mut D) -> Result<Vec<Record>> {
        tracing::trace!(
            table = %self.table,
            conditions = self.conditions.len(),
            backend = db.backend().name(),
            "running query"
        );
        let rows = if db.is_nosql() {
            let (filter, options) = self.to_document_query();
            db.find_documents(&self.table, filter, options)?
        } else {
            let (sql, params) = self.to_sql(db.require_dialect()?);
            db.query(&sql, &params)?
        };
        Ok(rows
            .iter()
            .map(|row| Record::from_row(&self.table, row).primary_key(&self.primary_key))
            .collect())
    }

    /// Run the query and map each row through [`Model::from_record`].
    pub fn get_models<M: Model, D: DataAccess + ?Sized>(self, db: &mut D) -> Result<Vec<M>> {
        self.get(db)?.iter().map(M::from_record).collect()
    }

    pub fn first<D: DataAccess + ?Sized>(self, db: &mut D) -> Result<Option<Record>> {
        Ok(self.limit(1).get(db)?.into_iter().next())
    }

    pub fn count<D: DataAccess + ?Sized>(self, db: &mut D) -> Result<u64> {
        if db.is_nosql() {
            let (filter, _) = self.to_document_query();
            return db.count_documents(&self.table, filter);
        }
        let (sql, params) = self.to_count_sql(db.require_dialect()?);
        let rows = db.query(&sql, &params)?;
        let count = rows
            .first()
            .and_then(|row| row.get_by_name("aggregate").or_else(|| row.get(0)))
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                Error::Type(TypeError {
                    expected: "integer",
                    actual: "no aggregate column".to_string(),
                    column: Some("aggregate".to_string()),
                })
            })?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    pub fn exists<D: DataAccess + ?Sized>(self, db: &mut D) -> Result<bool> {
        Ok(self.count(db)? > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingDb;
    use polystore_core::{Backend, Row};

    fn widgets() -> QueryBuilder {
        QueryBuilder::new("widgets")
            .where_eq("name", "gizmo")
            .where_op("price", Operator::Gte, 2.5)
    }

    #[test]
    fn test_select_all_sqlite() {
        let (sql, params) = QueryBuilder::new("widgets").to_sql(Dialect::Sqlite);
        assert_eq!(sql, "SELECT * FROM \"widgets\"");
        assert!(params.is_empty());
    }

    #[test]
    fn test_conditions_order_and_paging_postgres() {
        let (sql, params) = widgets()
            .where_in("id", [1, 2])
            .where_null("deleted_at")
            .select(["id", "name"])
            .order_by("name", Order::Asc)
            .order_by_desc("id")
            .limit(10)
            .offset(20)
            .to_sql(Dialect::Postgres);
        assert_eq!(
            sql,
            "SELECT \"id\", \"name\" FROM \"widgets\" WHERE \"name\" = $1 AND \"price\" >= $2 \
             AND \"id\" IN ($3, $4) AND \"deleted_at\" IS NULL \
             ORDER BY \"name\" ASC, \"id\" DESC LIMIT 10 OFFSET 20"
        );
        assert_eq!(
            params,
            vec![
                Value::from("gizmo"),
                Value::Double(2.5),
                Value::BigInt(1),
                Value::BigInt(2)
            ]
        );
    }

    #[test]
    fn test_values_never_reach_statement_text() {
        let (sql, params) = QueryBuilder::new("widgets")
            .where_eq("name", "1; DROP TABLE widgets")
            .to_sql(Dialect::MySql);
        assert_eq!(sql, "SELECT * FROM `widgets` WHERE `name` = ?");
        assert_eq!(params, vec![Value::from("1; DROP TABLE widgets")]);
    }

    #[test]
    fn test_sql_server_paging_needs_order() {
        let (sql, _) = QueryBuilder::new("widgets").limit(5).to_sql(Dialect::SqlServer);
        assert_eq!(
            sql,
            "SELECT * FROM [widgets] ORDER BY (SELECT NULL) OFFSET 0 ROWS FETCH NEXT 5 ROWS ONLY"
        );
    }

    #[test]
    fn test_count_ignores_order_and_paging() {
        let (sql, params) = widgets()
            .order_by("name", Order::Asc)
            .limit(3)
            .to_count_sql(Dialect::SqlServer);
        assert_eq!(
            sql,
            "SELECT COUNT(*) AS aggregate FROM [widgets] WHERE [name] = @P1 AND [price] >= @P2"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_where_expr_parses_operator() {
        let query = QueryBuilder::new("widgets").where_expr("name", "like", "giz%").unwrap();
        assert_eq!(
            query.conditions()[0],
            Condition::Compare {
                column: "name".into(),
                op: Operator::Like,
                value: Value::from("giz%"),
            }
        );
        assert!(QueryBuilder::new("widgets").where_expr("name", "=~", 1).is_err());
    }

    #[test]
    fn test_document_query() {
        let (filter, options) = widgets()
            .order_by_desc("price")
            .limit(2)
            .offset(4)
            .to_document_query();
        assert_eq!(filter.get("name"), Some(&Value::from("gizmo")));
        assert_eq!(options.sort, vec![("price".to_string(), Order::Desc)]);
        assert_eq!(options.limit, Some(2));
        assert_eq!(options.skip, Some(4));
    }

    #[test]
    fn test_get_and_count_through_data_access() {
        let mut db = RecordingDb::new(Backend::Sqlite);
        db.push_rows(vec![Row::new(
            vec!["id".into(), "name".into()],
            vec![Value::BigInt(1), Value::from("gizmo")],
        )]);
        let records = widgets().get(&mut db).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].exists());
        assert_eq!(records[0].key(), Some(&Value::BigInt(1)));
        assert_eq!(
            db.statements()[0].0,
            "SELECT * FROM \"widgets\" WHERE \"name\" = ? AND \"price\" >= ?"
        );

        db.push_rows(vec![Row::new(vec!["aggregate".into()], vec![Value::BigInt(7)])]);
        assert_eq!(widgets().count(&mut db).unwrap(), 7);
    }

    #[test]
    fn test_first_applies_limit() {
        let mut db = RecordingDb::new(Backend::MySql);
        db.push_rows(Vec::new());
        assert!(widgets().first(&mut db).unwrap().is_none());
        assert!(db.statements()[0].0.ends_with("LIMIT 1"));
    }
}
