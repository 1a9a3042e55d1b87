use polystore::prelude::*;

fn memory() -> Connection {
    Connection::open(&ConnectionConfig::new("sqlite").database(":memory:"))
        .expect("open sqlite memory db")
}

fn create_users_and_posts(conn: &mut Connection) {
    let mut schema = Schema::new(conn);
    schema
        .create("users", |t| {
            t.id();
            t.string("email").unique();
            t.string("nickname").nullable();
        })
        .unwrap();
    schema
        .create("posts", |t| {
            t.id();
            t.foreign_id("user_id");
            t.string("title").index();
            t.timestamps();
            t.foreign("user_id").references("id").on("users").cascade_on_delete();
        })
        .unwrap();
}

#[test]
fn sqlite_tables_and_columns_are_listed() {
    let mut conn = memory();
    create_users_and_posts(&mut conn);

    let mut schema = Schema::new(&mut conn);
    assert_eq!(schema.get_tables().unwrap(), ["posts", "users"]);
    assert!(schema.has_table("users").unwrap());
    assert!(!schema.has_table("Users").unwrap());
    assert_eq!(
        schema.get_column_listing("posts").unwrap(),
        ["id", "user_id", "title", "created_at", "updated_at"]
    );
    assert!(schema.has_column("users", "EMAIL").unwrap());
    assert!(!schema.has_column("users", "password").unwrap());
    assert!(schema.get_column_listing("missing").unwrap().is_empty());
}

#[test]
fn sqlite_constraints_are_enforced() {
    let mut conn = memory();
    create_users_and_posts(&mut conn);

    let user = conn
        .insert("users", &Document::new().with("email", "ada@example.com"))
        .unwrap();
    let duplicate = conn.insert("users", &Document::new().with("email", "ada@example.com"));
    assert!(matches!(duplicate, Err(Error::Statement(_))));

    let orphan = conn.insert(
        "posts",
        &Document::new().with("user_id", 99).with("title", "lost"),
    );
    assert!(matches!(orphan, Err(Error::Statement(_))));

    conn.insert(
        "posts",
        &Document::new().with("user_id", user.clone()).with("title", "hello"),
    )
    .unwrap();
    conn.delete("users", "\"id\" = ?", &[user]).unwrap();
    assert!(conn.all("posts").unwrap().is_empty());
}

#[test]
fn sqlite_alter_rename_and_drop() {
    let mut conn = memory();
    create_users_and_posts(&mut conn);

    let mut schema = Schema::new(&mut conn);
    schema
        .table("users", |t| {
            t.string("bio").nullable();
            t.integer("karma").default(0);
            t.rename_column("nickname", "handle");
        })
        .unwrap();
    assert_eq!(
        schema.get_column_listing("users").unwrap(),
        ["id", "email", "handle", "bio", "karma"]
    );

    schema.table("users", |t| t.drop_column("bio")).unwrap();
    assert!(!schema.has_column("users", "bio").unwrap());

    let refused = schema.table("posts", |t| {
        t.foreign("user_id").references("id").on("users");
    });
    assert!(matches!(refused, Err(Error::InvalidState(_))));

    schema.rename("posts", "articles").unwrap();
    assert!(schema.has_table("articles").unwrap());
    assert!(!schema.has_table("posts").unwrap());

    schema.drop("articles").unwrap();
    schema.drop_if_exists("articles").unwrap();
    assert!(matches!(schema.drop("articles"), Err(Error::Statement(_))));
    assert_eq!(schema.get_tables().unwrap(), ["users"]);
}

#[test]
fn sqlite_drop_all_tables() {
    let mut conn = memory();
    create_users_and_posts(&mut conn);
    let user = conn
        .insert("users", &Document::new().with("email", "ada@example.com"))
        .unwrap();
    conn.insert(
        "posts",
        &Document::new().with("user_id", user).with("title", "hello"),
    )
    .unwrap();

    let mut schema = Schema::new(&mut conn);
    schema.disable_foreign_key_constraints().unwrap();
    schema.drop_all_tables().unwrap();
    schema.enable_foreign_key_constraints().unwrap();
    assert!(schema.get_tables().unwrap().is_empty());
}
