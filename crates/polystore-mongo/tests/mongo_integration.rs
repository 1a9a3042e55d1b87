//! Live-server tests. Set `POLYSTORE_TEST_MONGO_URL`
//! (e.g. `mongodb://127.0.0.1:27017`) to run them against the
//! `polystore_test` database.

use polystore_core::{Document, DocumentDriver, DocumentOp, FindOptions, Order, Value};
use polystore_mongo::{MongoConfig, MongoDriver};
use serde_json::json;

fn driver_from_env() -> Option<MongoDriver> {
    let Ok(url) = std::env::var("POLYSTORE_TEST_MONGO_URL") else {
        eprintln!("POLYSTORE_TEST_MONGO_URL not set; skipping document store integration test");
        return None;
    };
    Some(MongoDriver::connect(MongoConfig::new("polystore_test").url(url)).unwrap())
}

#[test]
fn document_roundtrip() {
    let Some(mut db) = driver_from_env() else {
        return;
    };
    let _ = db.drop_collection("polystore_it_widgets");

    let id = db
        .insert_one(
            "polystore_it_widgets",
            Document::new().with("name", "bolt").with("qty", 3),
        )
        .unwrap();
    assert_eq!(id.len(), 24);
    assert_eq!(db.last_insert_id(), 0);

    let inserted = db
        .execute(
            "polystore_it_widgets",
            DocumentOp::InsertMany(vec![
                Document::new().with("name", "nut").with("qty", 10),
                Document::new().with("name", "gear").with("qty", 1),
            ]),
        )
        .unwrap();
    assert_eq!(inserted, 2);

    let rows = db
        .find(
            "polystore_it_widgets",
            Document::new().with("_id", id.as_str()),
            FindOptions::new(),
        )
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_by_name("_id"), Some(&Value::from(id.as_str())));
    assert_eq!(rows[0].get_by_name("name"), Some(&Value::from("bolt")));

    let rows = db
        .find(
            "polystore_it_widgets",
            Document::new().with("qty", Value::Json(json!({"$gte": 2}))),
            FindOptions::new().sort("qty", Order::Desc).limit(5),
        )
        .unwrap();
    let names: Vec<_> = rows.iter().filter_map(|r| r.get_by_name("name")).collect();
    assert_eq!(names, vec![&Value::from("nut"), &Value::from("bolt")]);

    let updated = db
        .execute(
            "polystore_it_widgets",
            DocumentOp::Update {
                filter: Document::new().with("name", "gear"),
                update: Document::new().with("qty", 7),
            },
        )
        .unwrap();
    assert_eq!(updated, 1);
    assert_eq!(
        db.count(
            "polystore_it_widgets",
            Document::new().with("qty", Value::Json(json!({"$gt": 5})))
        )
        .unwrap(),
        2
    );

    let deleted = db
        .execute(
            "polystore_it_widgets",
            DocumentOp::DeleteMany(Document::new()),
        )
        .unwrap();
    assert_eq!(deleted, 3);

    assert!(
        db.list_collections()
            .unwrap()
            .contains(&"polystore_it_widgets".to_string())
    );
    db.drop_collection("polystore_it_widgets").unwrap();
    db.disconnect().unwrap();
    assert!(
        db.count("polystore_it_widgets", Document::new())
            .unwrap_err()
            .is_connection_error()
    );
}
