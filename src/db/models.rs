use crate::schema::{cache_entries, companies, tasks};
use diesel::{AsChangeset, Identifiable, Insertable, Queryable, Selectable};
use serde::{Deserialize, Serialize};

/// Represents a task row in the database
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TaskRow {
    /// UUID assigned at creation
    pub id: String,
    /// Insertion sequence, breaks `created_at` ties
    pub seq: i64,
    /// Storage name of the task type
    pub task_type: String,
    /// JSON serialized handler arguments
    pub args: String,
    /// Storage name of the status
    pub status: String,
    /// Optional JSON serialized result
    pub result: Option<String>,
    /// Optional failure description
    pub error: Option<String>,
    /// Timestamp when the task was created
    pub created_at: String,
    /// Timestamp of the last status transition
    pub updated_at: String,
}

/// Represents a researched company in the database
#[derive(
    Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable, AsChangeset, Insertable,
)]
#[diesel(table_name = companies)]
#[diesel(primary_key(name))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CompanyRow {
    /// Company name, unique
    pub name: String,
    /// JSON serialized research details
    pub details: String,
    /// Recruiter message the research started from, if any
    pub initial_message: Option<String>,
    /// Drafted reply, empty until generated
    pub reply_message: String,
    /// Timestamp when the company was created
    pub created_at: String,
    /// Timestamp when the company was last updated
    pub updated_at: String,
}

/// Represents a memoized stage result in the database
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = cache_entries)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CacheEntryRow {
    /// Ordinal of the pipeline stage
    pub stage: i32,
    /// Name of the memoized function
    pub function_name: String,
    /// Fingerprint of the call arguments
    pub fingerprint: String,
    /// JSON serialized value
    pub value: String,
    /// Timestamp when the entry was written
    pub created_at: String,
}
