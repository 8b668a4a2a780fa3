//! Include hydration against real joined rows: one-to-many, to-one,
//! many-to-many, nested and self-referential paths, root pagination, and
//! per-relation include options.

use relorm_db::{
    field, DatabaseBackendType, Field, FieldType, IncludeOption, ModelSchema, Order, OrderBy, Orm,
    Record, Relation, SchemaRegistry, Value,
};
use relorm_db_backends::SqliteExecutor;

// ── Fixtures ──────────────────────────────────────────────────────────

const SCHEMA: &str = "
    CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
    CREATE TABLE posts (
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL,
        user_id INTEGER NOT NULL REFERENCES users(id),
        views INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE comments (
        id INTEGER PRIMARY KEY,
        body TEXT NOT NULL,
        post_id INTEGER NOT NULL REFERENCES posts(id)
    );
    CREATE TABLE tags (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
    CREATE TABLE post_tags (
        posts_id INTEGER NOT NULL REFERENCES posts(id),
        tags_id INTEGER NOT NULL REFERENCES tags(id)
    );
    CREATE TABLE categories (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        parent_id INTEGER REFERENCES categories(id)
    );

    INSERT INTO users (id, name) VALUES (1, 'Ann'), (2, 'Bob'), (3, 'Cy');
    INSERT INTO posts (id, title, user_id, views) VALUES
        (1, 'Hello', 1, 10), (2, 'Rust', 1, 50), (3, 'Bob''s', 2, 5);
    INSERT INTO comments (id, body, post_id) VALUES
        (1, 'nice', 1), (2, 'thanks', 1), (3, 'ok', 3);
    INSERT INTO tags (id, name) VALUES (1, 'rust'), (2, 'db');
    INSERT INTO post_tags (posts_id, tags_id) VALUES (1, 1), (2, 1), (2, 2);
    INSERT INTO categories (id, name, parent_id) VALUES
        (1, 'root', NULL), (2, 'child', 1), (3, 'grandchild', 2), (4, 'other', NULL);
";

fn registry() -> SchemaRegistry {
    SchemaRegistry::new()
        .with(
            ModelSchema::new("User")
                .add_field(Field::new("id", FieldType::Int).primary_key())
                .add_field(Field::new("name", FieldType::String))
                .add_relation("posts", Relation::one_to_many("Post", "userId")),
        )
        .with(
            ModelSchema::new("Post")
                .add_field(Field::new("id", FieldType::Int).primary_key())
                .add_field(Field::new("title", FieldType::String))
                .add_field(Field::new("userId", FieldType::Int).map("user_id"))
                .add_field(Field::new("views", FieldType::Int))
                .add_relation("author", Relation::many_to_one("User", "userId"))
                .add_relation("comments", Relation::one_to_many("Comment", "postId"))
                .add_relation("tags", Relation::many_to_many("Tag")),
        )
        .with(
            ModelSchema::new("Comment")
                .add_field(Field::new("id", FieldType::Int).primary_key())
                .add_field(Field::new("body", FieldType::String))
                .add_field(Field::new("postId", FieldType::Int).map("post_id"))
                .add_relation("post", Relation::many_to_one("Post", "postId")),
        )
        .with(
            ModelSchema::new("Tag")
                .add_field(Field::new("id", FieldType::Int).primary_key())
                .add_field(Field::new("name", FieldType::String))
                .add_relation("posts", Relation::many_to_many("Post")),
        )
        .with(
            ModelSchema::new("Category")
                .add_field(Field::new("id", FieldType::Int).primary_key())
                .add_field(Field::new("name", FieldType::String))
                .add_field(Field::new("parentId", FieldType::Int).map("parent_id").nullable())
                .add_relation("parent", Relation::many_to_one("Category", "parentId"))
                .add_relation("children", Relation::one_to_many("Category", "parentId")),
        )
}

async fn seeded() -> (Orm, SqliteExecutor) {
    let db = SqliteExecutor::memory().unwrap();
    db.execute_batch(SCHEMA).await.unwrap();
    (Orm::new(registry(), DatabaseBackendType::SQLite), db)
}

fn names<'a>(records: impl IntoIterator<Item = &'a Record>, field: &str) -> Vec<String> {
    records
        .into_iter()
        .filter_map(|r| r.get(field).and_then(Value::as_str).map(str::to_string))
        .collect()
}

// ── One level ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_one_to_many_groups_children_under_each_root() {
    let (orm, db) = seeded().await;
    let users = orm
        .model("User")
        .include_with(IncludeOption::new("posts").order_by(OrderBy::desc("views")))
        .order_by("id", Order::Asc)
        .find_many(&db)
        .await
        .unwrap();

    assert_eq!(names(&users, "name"), ["Ann", "Bob", "Cy"]);
    assert_eq!(names(users[0].many("posts").unwrap(), "title"), ["Rust", "Hello"]);
    assert_eq!(names(users[1].many("posts").unwrap(), "title"), ["Bob's"]);
    assert_eq!(users[2].many("posts"), Some(&[][..]));
}

#[tokio::test]
async fn test_to_one_include() {
    let (orm, db) = seeded().await;
    let posts = orm
        .model("Post")
        .include("author")
        .order_by("id", Order::Asc)
        .find_many(&db)
        .await
        .unwrap();
    assert_eq!(posts.len(), 3);
    let author = posts[2].one("author").unwrap();
    assert_eq!(author.get("name"), Some(&Value::from("Bob")));
    assert_eq!(posts[2].get("userId"), Some(&Value::from(2)));
}

#[tokio::test]
async fn test_many_to_many_through_junction() {
    let (orm, db) = seeded().await;
    let posts = orm
        .model("Post")
        .include_with(IncludeOption::new("tags").order_by(OrderBy::asc("id")))
        .order_by("id", Order::Asc)
        .find_many(&db)
        .await
        .unwrap();
    assert_eq!(names(posts[0].many("tags").unwrap(), "name"), ["rust"]);
    assert_eq!(names(posts[1].many("tags").unwrap(), "name"), ["rust", "db"]);
    assert!(posts[2].many("tags").unwrap().is_empty());
}

#[tokio::test]
async fn test_where_on_root_with_include() {
    let (orm, db) = seeded().await;
    let users = orm
        .model("User")
        .where_condition(field("name").equals("Ann"))
        .include("posts")
        .find_many(&db)
        .await
        .unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].many("posts").unwrap().len(), 2);
}

// ── Nested paths ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_nested_one_to_many() {
    let (orm, db) = seeded().await;
    let users = orm
        .model("User")
        .include_with(IncludeOption::new("posts").order_by(OrderBy::asc("id")))
        .include_with(IncludeOption::new("posts.comments").order_by(OrderBy::desc("id")))
        .order_by("id", Order::Asc)
        .find_many(&db)
        .await
        .unwrap();

    let ann_posts = users[0].many("posts").unwrap();
    assert_eq!(names(ann_posts, "title"), ["Hello", "Rust"]);
    assert_eq!(
        names(ann_posts[0].many("comments").unwrap(), "body"),
        ["thanks", "nice"]
    );
    assert!(ann_posts[1].many("comments").unwrap().is_empty());
    assert_eq!(
        names(users[1].many("posts").unwrap()[0].many("comments").unwrap(), "body"),
        ["ok"]
    );
    assert!(users[2].many("posts").unwrap().is_empty());
}

#[tokio::test]
async fn test_nested_to_one_chain() {
    let (orm, db) = seeded().await;
    let comments = orm
        .model("Comment")
        .include("post.author")
        .order_by("id", Order::Asc)
        .find_many(&db)
        .await
        .unwrap();
    assert_eq!(comments.len(), 3);
    let author = comments[2].one("post").unwrap().one("author").unwrap();
    assert_eq!(author.get("name"), Some(&Value::from("Bob")));
}

#[tokio::test]
async fn test_self_referential_tree() {
    let (orm, db) = seeded().await;
    let roots = orm
        .model("Category")
        .where_condition(field("parentId").is_null())
        .include("children.children")
        .order_by("id", Order::Asc)
        .find_many(&db)
        .await
        .unwrap();

    assert_eq!(names(&roots, "name"), ["root", "other"]);
    let children = roots[0].many("children").unwrap();
    assert_eq!(names(children, "name"), ["child"]);
    assert_eq!(
        names(children[0].many("children").unwrap(), "name"),
        ["grandchild"]
    );
    assert!(roots[1].many("children").unwrap().is_empty());
}

// ── Pagination and include options ────────────────────────────────────

#[tokio::test]
async fn test_limit_pages_roots_not_joined_rows() {
    let (orm, db) = seeded().await;
    let users = orm
        .model("User")
        .include("posts")
        .order_by("id", Order::Asc)
        .limit(1)
        .find_many(&db)
        .await
        .unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].many("posts").unwrap().len(), 2);

    let second = orm
        .model("User")
        .include("posts")
        .order_by("id", Order::Asc)
        .limit(1)
        .offset(1)
        .find_many(&db)
        .await
        .unwrap();
    assert_eq!(names(&second, "name"), ["Bob"]);
    assert_eq!(second[0].many("posts").unwrap().len(), 1);
}

#[tokio::test]
async fn test_include_filter_select_and_limit() {
    let (orm, db) = seeded().await;
    let users = orm
        .model("User")
        .where_condition(field("id").equals(1))
        .include_with(
            IncludeOption::new("posts")
                .filter(field("views").greater_than(20))
                .select(["title"]),
        )
        .find_many(&db)
        .await
        .unwrap();
    let posts = users[0].many("posts").unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].get("title"), Some(&Value::from("Rust")));
    assert_eq!(posts[0].get("id"), Some(&Value::from(2)));
    assert!(posts[0].get("views").is_none());

    let users = orm
        .model("User")
        .where_condition(field("id").equals(1))
        .include_with(
            IncludeOption::new("posts")
                .order_by(OrderBy::asc("views"))
                .offset(1)
                .limit(1),
        )
        .find_many(&db)
        .await
        .unwrap();
    assert_eq!(names(users[0].many("posts").unwrap(), "title"), ["Rust"]);
}

#[tokio::test]
async fn test_count_ignores_includes() {
    let (orm, db) = seeded().await;
    let count = orm
        .model("User")
        .include("posts")
        .count(&db)
        .await
        .unwrap();
    assert_eq!(count, 3);
}

#[tokio::test]
async fn test_records_serialize_with_relations() {
    let (orm, db) = seeded().await;
    let users = orm
        .model("User")
        .where_condition(field("id").equals(2))
        .include("posts")
        .find_many(&db)
        .await
        .unwrap();
    assert_eq!(
        users[0].to_json(),
        serde_json::json!({
            "id": 2,
            "name": "Bob",
            "posts": [{"id": 3, "title": "Bob's", "userId": 2, "views": 5}]
        })
    );
}
