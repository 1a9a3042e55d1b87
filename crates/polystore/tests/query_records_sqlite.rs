use polystore::prelude::*;

#[derive(Debug, Clone, PartialEq)]
struct Widget {
    id: Option<i64>,
    name: String,
    price: i64,
}

impl Model for Widget {
    const TABLE: &'static str = "widgets";

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Widget {
            id: record.get_as("id")?,
            name: record.get_as("name")?,
            price: record.get_as("price")?,
        })
    }

    fn into_record(self) -> Record {
        Record::with_attributes(
            Self::TABLE,
            Document::new()
                .with("id", self.id)
                .with("name", self.name)
                .with("price", self.price),
        )
    }
}

fn seeded() -> Connection {
    let mut conn = Connection::open(&ConnectionConfig::new("sqlite").database(":memory:"))
        .expect("open sqlite memory db");
    Schema::new(&mut conn)
        .create("widgets", |t| {
            t.increments("id");
            t.string("name");
            t.integer("price");
        })
        .unwrap();
    for (name, price) in [("gizmo", 5), ("widget", 12), ("doohickey", 20), ("sprocket", 3)] {
        conn.insert("widgets", &Document::new().with("name", name).with("price", price))
            .unwrap();
    }
    conn
}

fn names(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.get_as::<String>("name").unwrap())
        .collect()
}

#[test]
fn sqlite_query_builder_get_first_count() {
    let mut conn = seeded();

    let cheap = QueryBuilder::new("widgets")
        .where_op("price", Operator::Lt, 10)
        .order_by("name", Order::Asc)
        .get(&mut conn)
        .unwrap();
    assert_eq!(names(&cheap), ["gizmo", "sprocket"]);
    assert!(cheap.iter().all(Record::exists));

    let priciest = QueryBuilder::new("widgets")
        .order_by_desc("price")
        .first(&mut conn)
        .unwrap()
        .expect("a widget");
    assert_eq!(priciest.get_as::<String>("name").unwrap(), "doohickey");

    let paged = QueryBuilder::new("widgets")
        .select(["name"])
        .order_by("price", Order::Asc)
        .limit(2)
        .offset(1)
        .get(&mut conn)
        .unwrap();
    assert_eq!(names(&paged), ["gizmo", "widget"]);

    let count = QueryBuilder::new("widgets")
        .where_op("price", Operator::Gte, 5)
        .order_by("name", Order::Asc)
        .limit(1)
        .count(&mut conn)
        .unwrap();
    assert_eq!(count, 3);

    let listed = QueryBuilder::new("widgets")
        .where_in("name", ["gizmo", "sprocket", "missing"])
        .count(&mut conn)
        .unwrap();
    assert_eq!(listed, 2);

    assert!(!QueryBuilder::new("widgets")
        .where_eq("name", "nope")
        .exists(&mut conn)
        .unwrap());
    assert!(QueryBuilder::new("widgets")
        .where_null("name")
        .first(&mut conn)
        .unwrap()
        .is_none());
}

#[test]
fn sqlite_query_values_are_bound() {
    let mut conn = seeded();
    let hostile = QueryBuilder::new("widgets")
        .where_eq("name", "gizmo' OR '1'='1")
        .get(&mut conn)
        .unwrap();
    assert!(hostile.is_empty());
    assert_eq!(QueryBuilder::new("widgets").count(&mut conn).unwrap(), 4);
}

#[test]
fn sqlite_record_lifecycle() {
    let mut conn = seeded();

    let mut record = Record::new("widgets");
    record.set("name", "flange");
    record.set("price", 8);
    assert!(!record.exists());
    record.save(&mut conn).unwrap();
    assert!(record.exists());
    assert_eq!(record.key(), Some(&Value::BigInt(5)));
    assert!(!record.is_dirty());

    record.set("price", 9);
    assert!(record.is_dirty());
    record.save(&mut conn).unwrap();
    assert!(!record.is_dirty());

    let fresh = record.fresh(&mut conn).unwrap().expect("stored row");
    assert_eq!(fresh.get_as::<i64>("price").unwrap(), 9);
    assert_eq!(fresh.get_as::<String>("name").unwrap(), "flange");

    assert_eq!(record.delete(&mut conn).unwrap(), 1);
    assert!(!record.exists());
    assert!(record.fresh(&mut conn).unwrap().is_none());
    assert!(conn.find("widgets", &Value::from(5), "id").unwrap().is_none());
}

#[test]
fn sqlite_unsaved_record_cannot_be_deleted() {
    let mut conn = seeded();
    let mut record = Record::new("widgets");
    record.set("name", "ghost");
    assert!(matches!(
        record.delete(&mut conn),
        Err(Error::InvalidState(_))
    ));
}

#[test]
fn sqlite_model_helpers() {
    let mut conn = seeded();

    let created = Widget::create(
        &mut conn,
        Document::new().with("name", "flange").with("price", 8),
    )
    .unwrap();
    assert_eq!(
        created,
        Widget {
            id: Some(5),
            name: "flange".to_string(),
            price: 8
        }
    );

    let mut found = Widget::find(&mut conn, 5).unwrap().expect("widget 5");
    found.price = 11;
    let saved = found.save(&mut conn).unwrap();
    assert_eq!(saved.price, 11);
    assert_eq!(Widget::find(&mut conn, 5).unwrap().unwrap().price, 11);

    let unsaved = Widget {
        id: None,
        name: "cog".to_string(),
        price: 2,
    }
    .save(&mut conn)
    .unwrap();
    assert_eq!(unsaved.id, Some(6));

    let cheap: Vec<Widget> = Widget::where_op("price", Operator::Lt, 5)
        .order_by("price", Order::Asc)
        .get_models(&mut conn)
        .unwrap();
    assert_eq!(
        cheap.iter().map(|w| w.name.as_str()).collect::<Vec<_>>(),
        ["cog", "sprocket"]
    );
    assert_eq!(Widget::all(&mut conn).unwrap().len(), 6);
    assert!(Widget::find(&mut conn, 99).unwrap().is_none());
}
