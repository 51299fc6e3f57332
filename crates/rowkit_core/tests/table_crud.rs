use rowkit_core::db::open_db_in_memory;
use rowkit_core::{
    attributes, ConfigError, FieldValue, FindOptions, Found, Projection, Record, RecordSchema,
    RepoError, Repository, SaveOutcome, TableAccess, TableConfig,
};
use rusqlite::Connection;
use std::sync::Arc;

const DEFAULT_EMAIL: &str = "nobody@example.com";

fn setup_conn() -> Connection {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            karma INTEGER NOT NULL DEFAULT 0
        );
        CREATE TABLE posts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            title TEXT NOT NULL
        );",
    )
    .unwrap();
    conn
}

fn users_config() -> Arc<TableConfig> {
    let schema = RecordSchema::builder("user")
        .fields(["id", "name", "email", "karma"])
        .required(["name"])
        .default_value("email", DEFAULT_EMAIL)
        .build()
        .unwrap();
    Arc::new(TableConfig::new("users", "id", Arc::new(schema)).unwrap())
}

fn posts_config() -> Arc<TableConfig> {
    let schema = RecordSchema::builder("post")
        .fields(["id", "user_id", "title"])
        .default_value("title", "untitled")
        .build()
        .unwrap();
    Arc::new(TableConfig::new("posts", "id", Arc::new(schema)).unwrap())
}

fn insert_user(repo: &Repository<'_>, name: &str) -> i64 {
    let record = repo.create(attributes([("name", name)])).unwrap();
    match repo.save(&record).unwrap() {
        SaveOutcome::Inserted { row_id } => row_id,
        other => panic!("expected insert, got {other:?}"),
    }
}

fn count_rows(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })
    .unwrap()
}

#[test]
fn create_then_save_inserts_defaults_and_storage_assigned_id() {
    let conn = setup_conn();
    let repo = Repository::new(&conn, users_config());

    let record = repo.create(attributes([("name", "A")])).unwrap();
    assert_eq!(record.get("id"), None);

    let row_id = insert_user(&repo, "A");
    let loaded = repo
        .find(row_id, &FindOptions::default())
        .unwrap()
        .into_one()
        .unwrap();

    assert_eq!(loaded.get("id"), Some(&FieldValue::Integer(row_id)));
    assert_eq!(loaded.get("name"), Some(&FieldValue::from("A")));
    assert_eq!(loaded.get("email"), Some(&FieldValue::from(DEFAULT_EMAIL)));
    assert_eq!(loaded.kind(), "user");
}

#[test]
fn create_has_no_side_effects() {
    let conn = setup_conn();
    let repo = Repository::new(&conn, users_config());

    repo.create(attributes([("name", "A")])).unwrap();
    assert_eq!(count_rows(&conn, "users"), 0);
}

#[test]
fn find_without_match_returns_no_result_for_any_limit() {
    let conn = setup_conn();
    let repo = Repository::new(&conn, users_config());
    insert_user(&repo, "A");

    for limit in [1, 5] {
        let err = repo
            .find(999, &FindOptions::default().with_limit(limit))
            .unwrap_err();
        assert!(err.is_no_result(), "limit {limit}: {err}");
    }
}

#[test]
fn find_with_larger_limit_returns_sequence_in_storage_order() {
    let conn = setup_conn();
    let repo = Repository::new(&conn, users_config());
    insert_user(&repo, "A");
    insert_user(&repo, "B");
    insert_user(&repo, "C");

    let found = repo
        .find(0, &FindOptions::default().with_limit(2))
        .unwrap();
    let Found::Many(records) = found else {
        panic!("limit > 1 should return a sequence");
    };
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get("name"), Some(&FieldValue::from("A")));
    assert_eq!(records[1].get("name"), Some(&FieldValue::from("B")));
}

#[test]
fn find_merges_extra_conditions_and_projection() {
    let conn = setup_conn();
    let repo = Repository::new(&conn, users_config());
    insert_user(&repo, "A");
    let b = insert_user(&repo, "B");

    let options = FindOptions::default()
        .with_conditions(attributes([("name", "B")]))
        .with_projection(Projection::fields(["id", "name"]));
    let found = repo.find(FieldValue::Null, &options).unwrap();
    let Found::One(record) = found else {
        panic!("limit 1 should return one record");
    };

    assert_eq!(record.get("id"), Some(&FieldValue::Integer(b)));
    assert_eq!(record.get("email"), None);

    let mismatch = FindOptions::default().with_conditions(attributes([("name", "A")]));
    assert!(repo.find(b, &mismatch).unwrap_err().is_no_result());
}

#[test]
fn find_rejects_undeclared_columns_and_zero_limit() {
    let conn = setup_conn();
    let repo = Repository::new(&conn, users_config());

    let unknown = FindOptions::default().with_conditions(attributes([("password", "x")]));
    assert!(matches!(
        repo.find(1, &unknown),
        Err(RepoError::Configuration(ConfigError::UnknownField { .. }))
    ));

    let projection = FindOptions::default().with_projection(Projection::fields(["password"]));
    assert!(matches!(
        repo.find(1, &projection),
        Err(RepoError::Configuration(ConfigError::UnknownField { .. }))
    ));

    assert!(matches!(
        repo.find(1, &FindOptions::default().with_limit(0)),
        Err(RepoError::Configuration(ConfigError::ZeroLimit))
    ));
}

#[test]
fn remove_with_empty_conditions_is_rejected_and_deletes_nothing() {
    let conn = setup_conn();
    let repo = Repository::new(&conn, users_config());
    insert_user(&repo, "A");

    let err = repo.remove(&attributes::<_, &str, FieldValue>([]), 1).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Configuration(ConfigError::EmptyConditions { .. })
    ));
    assert_eq!(count_rows(&conn, "users"), 1);
}

#[test]
fn remove_honours_limit() {
    let conn = setup_conn();
    let repo = Repository::new(&conn, users_config());
    for _ in 0..3 {
        insert_user(&repo, "dup");
    }

    let removed = repo.remove(&attributes([("name", "dup")]), 1).unwrap();
    assert_eq!(removed, 1);
    assert_eq!(count_rows(&conn, "users"), 2);

    let removed = repo.remove(&attributes([("name", "dup")]), 10).unwrap();
    assert_eq!(removed, 2);
    assert_eq!(count_rows(&conn, "users"), 0);
}

#[test]
fn update_without_primary_key_is_rejected_before_writing() {
    let conn = setup_conn();
    let repo = Repository::new(&conn, users_config());
    insert_user(&repo, "A");

    let record = repo.create(attributes([("name", "B")])).unwrap();
    let err = repo.update(&record, 1).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Configuration(ConfigError::MissingPrimaryKey { .. })
    ));

    let names: String = conn
        .query_row("SELECT group_concat(name) FROM users", [], |row| row.get(0))
        .unwrap();
    assert_eq!(names, "A");
}

#[test]
fn partial_update_keeps_untouched_fields_and_writes_zero() {
    let conn = setup_conn();
    let repo = Repository::new(&conn, users_config());
    let id = insert_user(&repo, "A");
    conn.execute("UPDATE users SET karma = 7 WHERE id = ?1", [id])
        .unwrap();

    let record = repo
        .create(attributes([
            ("id", FieldValue::Integer(id)),
            ("name", FieldValue::from("A2")),
            ("email", FieldValue::from("")),
            ("karma", FieldValue::Integer(0)),
        ]))
        .unwrap();
    assert_eq!(repo.update(&record, 1).unwrap(), 1);

    let loaded = repo
        .find(id, &FindOptions::default())
        .unwrap()
        .into_one()
        .unwrap();
    assert_eq!(loaded.get("name"), Some(&FieldValue::from("A2")));
    assert_eq!(loaded.get("email"), Some(&FieldValue::from(DEFAULT_EMAIL)));
    assert_eq!(loaded.get("karma"), Some(&FieldValue::Integer(0)));
}

#[test]
fn save_with_primary_key_updates_existing_row() {
    let conn = setup_conn();
    let repo = Repository::new(&conn, users_config());
    let id = insert_user(&repo, "A");

    let mut loaded = repo
        .find(id, &FindOptions::default())
        .unwrap()
        .into_one()
        .unwrap();
    loaded.set("name", "renamed").unwrap();

    assert_eq!(repo.save(&loaded).unwrap(), SaveOutcome::Updated { rows: 1 });
    assert_eq!(count_rows(&conn, "users"), 1);

    let reloaded = repo
        .find(id, &FindOptions::default())
        .unwrap()
        .into_one()
        .unwrap();
    assert_eq!(reloaded.get("name"), Some(&FieldValue::from("renamed")));
}

#[test]
fn save_rejects_missing_required_field() {
    let conn = setup_conn();
    let repo = Repository::new(&conn, users_config());

    let record = repo
        .create(attributes([("email", "a@example.com")]))
        .unwrap();
    let err = repo.save(&record).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Configuration(ConfigError::MissingRequiredField { .. })
    ));
    assert_eq!(count_rows(&conn, "users"), 0);
}

#[test]
fn update_and_save_reject_records_of_another_type() {
    let conn = setup_conn();
    let users = Repository::new(&conn, users_config());
    let posts = Repository::new(&conn, posts_config());

    let post = posts
        .create(attributes([
            ("id", FieldValue::Integer(1)),
            ("title", FieldValue::from("hello")),
        ]))
        .unwrap();

    let err = users.update(&post, 1).unwrap_err();
    assert!(matches!(
        err,
        RepoError::TypeMismatch { ref expected, ref actual }
            if expected == "user" && actual == "post"
    ));
    assert!(matches!(
        users.save(&post),
        Err(RepoError::TypeMismatch { .. })
    ));

    let blank_post = Record::blank(posts.config().schema().clone());
    assert!(matches!(
        users.save(&blank_post),
        Err(RepoError::TypeMismatch { .. })
    ));
}

#[test]
fn rows_with_undeclared_columns_are_invalid_data() {
    let conn = setup_conn();
    conn.execute_batch("ALTER TABLE users ADD COLUMN secret TEXT;")
        .unwrap();
    let repo = Repository::new(&conn, users_config());
    insert_user(&repo, "A");

    let err = repo.find(0, &FindOptions::default()).unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(message) if message.contains("secret")));
}

#[test]
fn accessors_and_join_condition_compose_inner_joins() {
    let conn = setup_conn();
    let users = Repository::new(&conn, users_config());
    let posts = Repository::new(&conn, posts_config());
    let author = insert_user(&users, "A");
    let post = posts
        .create(attributes([
            ("user_id", FieldValue::Integer(author)),
            ("title", FieldValue::from("first")),
        ]))
        .unwrap();
    posts.save(&post).unwrap();

    assert_eq!(users.table(), "users");
    assert_eq!(users.primary_key(), "id");
    assert_eq!(users.fields(), ["id", "name", "email", "karma"]);
    assert!(users.prefix_field("title").is_err());

    let join = posts.join_cond(&users).unwrap();
    assert_eq!(join, "posts.id=users.id");

    let sql = format!(
        "SELECT {}, {} FROM {} INNER JOIN {} ON {} = {}",
        users.prefix_field("name").unwrap(),
        posts.prefix_field("title").unwrap(),
        posts.table(),
        users.table(),
        posts.prefix_field("user_id").unwrap(),
        users.prefix_field(users.primary_key()).unwrap(),
    );
    let (name, title): (String, String) = conn
        .query_row(&sql, [], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap();
    assert_eq!(name, "A");
    assert_eq!(title, "first");
}
