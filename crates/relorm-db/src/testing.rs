//! Shared fixtures for unit tests: a schema registry and a scripted executor.

use std::collections::VecDeque;
use std::sync::Mutex;

use relorm_core::{OrmError, OrmResult};

use crate::dialect::DatabaseBackendType;
use crate::executor::{DbExecutor, ExecResult, RowCursor, RowSet};
use crate::schema::{Field, FieldType, ModelSchema, Relation, SchemaRegistry};
use crate::value::Value;

/// Users, posts, comments, profiles, tags, and self-related categories.
pub fn registry() -> SchemaRegistry {
    SchemaRegistry::new()
        .with(
            ModelSchema::new("User")
                .add_field(Field::new("id", FieldType::Int).primary_key().auto_increment())
                .add_field(Field::new("name", FieldType::String))
                .add_field(Field::new("email", FieldType::String).unique())
                .add_field(Field::new("age", FieldType::Int).nullable())
                .add_relation("posts", Relation::one_to_many("Post", "userId"))
                .add_relation("profile", Relation::one_to_one("Profile", "userId"))
                .add_relation("friends", Relation::many_to_many("User")),
        )
        .with(
            ModelSchema::new("Post")
                .add_field(Field::new("id", FieldType::Int).primary_key().auto_increment())
                .add_field(Field::new("title", FieldType::String))
                .add_field(Field::new("content", FieldType::String).nullable())
                .add_field(Field::new("userId", FieldType::Int).map("user_id"))
                .add_field(Field::new("published", FieldType::Bool).default(false))
                .add_field(Field::new("views", FieldType::Int).default(0))
                .add_relation("author", Relation::many_to_one("User", "userId"))
                .add_relation("comments", Relation::one_to_many("Comment", "postId"))
                .add_relation("tags", Relation::many_to_many("Tag")),
        )
        .with(
            ModelSchema::new("Comment")
                .add_field(Field::new("id", FieldType::Int).primary_key().auto_increment())
                .add_field(Field::new("body", FieldType::String))
                .add_field(Field::new("postId", FieldType::Int).map("post_id"))
                .add_field(Field::new("userId", FieldType::Int).map("user_id").nullable())
                .add_relation("post", Relation::many_to_one("Post", "postId")),
        )
        .with(
            ModelSchema::new("Profile")
                .add_field(Field::new("id", FieldType::Int).primary_key().auto_increment())
                .add_field(Field::new("bio", FieldType::String))
                .add_field(Field::new("userId", FieldType::Int).map("user_id").unique())
                .add_relation("user", Relation::one_to_one("User", "userId")),
        )
        .with(
            ModelSchema::new("Tag")
                .add_field(Field::new("id", FieldType::Int).primary_key().auto_increment())
                .add_field(Field::new("name", FieldType::String).unique())
                .add_relation("posts", Relation::many_to_many("Post")),
        )
        .with(
            ModelSchema::new("Category")
                .add_field(Field::new("id", FieldType::Int).primary_key().auto_increment())
                .add_field(Field::new("name", FieldType::String))
                .add_field(Field::new("parentId", FieldType::Int).map("parent_id").nullable())
                .add_relation("parent", Relation::many_to_one("Category", "parentId"))
                .add_relation("children", Relation::one_to_many("Category", "parentId")),
        )
}

/// An executor that replays queued results and records every statement.
#[derive(Debug)]
pub struct MockDb {
    rows: Mutex<VecDeque<OrmResult<RowSet>>>,
    exec_results: Mutex<VecDeque<OrmResult<ExecResult>>>,
    executed: Mutex<Vec<(String, Vec<Value>)>>,
}

impl MockDb {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(VecDeque::new()),
            exec_results: Mutex::new(VecDeque::new()),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Queues the result of the next `query` call.
    pub fn with_rows(self, columns: Vec<&str>, rows: Vec<Vec<Value>>) -> Self {
        let columns = columns.into_iter().map(String::from).collect();
        self.rows
            .lock()
            .unwrap()
            .push_back(Ok(RowSet::new(columns, rows)));
        self
    }

    /// Makes the next `query` call fail.
    pub fn with_query_error(self, error: OrmError) -> Self {
        self.rows.lock().unwrap().push_back(Err(error));
        self
    }

    /// Queues the result of the next `execute_sql` call.
    pub fn with_exec(self, result: ExecResult) -> Self {
        self.exec_results.lock().unwrap().push_back(Ok(result));
        self
    }

    /// Makes the next `execute_sql` call fail.
    pub fn with_exec_error(self, error: OrmError) -> Self {
        self.exec_results.lock().unwrap().push_back(Err(error));
        self
    }

    /// Every statement seen so far, in order.
    pub fn executed(&self) -> Vec<(String, Vec<Value>)> {
        self.executed.lock().unwrap().clone()
    }

    /// The SQL of every statement seen so far.
    pub fn statements(&self) -> Vec<String> {
        self.executed().into_iter().map(|(sql, _)| sql).collect()
    }

    fn record(&self, sql: &str, params: &[Value]) {
        self.executed
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
    }
}

#[async_trait::async_trait]
impl DbExecutor for MockDb {
    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::SQLite
    }

    async fn execute_sql(&self, sql: &str, params: &[Value]) -> OrmResult<ExecResult> {
        self.record(sql, params);
        self.exec_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(ExecResult {
                last_insert_id: Some(1),
                rows_affected: 1,
            }))
    }

    async fn query(&self, sql: &str, params: &[Value]) -> OrmResult<Box<dyn RowCursor>> {
        self.record(sql, params);
        let next = self
            .rows
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(RowSet::new(Vec::new(), Vec::new())));
        Ok(Box::new(next?))
    }
}
