mod cache_repository;
mod company_repository;
mod models;
mod task_repository;

use crate::errors::Error;
use chrono::{SecondsFormat, Utc};
use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub use cache_repository::*;
pub use company_repository::*;
pub use models::*;
pub use task_repository::*;

/// DDL of the task store file (tasks and companies); applied on each open
const STORE_SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY NOT NULL,
    seq BIGINT NOT NULL,
    task_type TEXT NOT NULL,
    args TEXT NOT NULL,
    status TEXT NOT NULL,
    result TEXT,
    error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tasks_status_created ON tasks (status, created_at, seq);
CREATE TABLE IF NOT EXISTS companies (
    name TEXT PRIMARY KEY NOT NULL,
    details TEXT NOT NULL,
    initial_message TEXT,
    reply_message TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

/// DDL of the step cache file
const CACHE_SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS cache_entries (
    stage INTEGER NOT NULL,
    function_name TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    value TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (stage, function_name, fingerprint)
);
";

/// Fixed-width UTC timestamp, so lexical order matches chronological order
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Pragmas applied to every pooled connection
#[derive(Debug)]
struct SqlitePragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(
            "PRAGMA busy_timeout = 5000; PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;",
        )
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Pooled handle on one SQLite file
#[derive(Clone, Debug)]
pub struct Database {
    pool: Arc<Pool<ConnectionManager<SqliteConnection>>>,
}

impl Database {
    /// Opens (creating if needed) the task store at `db_path`
    ///
    /// # Arguments
    ///
    /// * `db_path` - Filesystem path of the database file
    ///
    /// # Errors
    ///
    /// Returns an Error if the parent directory cannot be created, the pool
    /// cannot be built or the schema cannot be applied
    pub fn new(db_path: &str) -> Result<Self, Error> {
        Self::open(db_path, STORE_SCHEMA_SQL)
    }

    /// Opens (creating if needed) a step cache file at `db_path`
    pub fn new_cache(db_path: &str) -> Result<Self, Error> {
        Self::open(db_path, CACHE_SCHEMA_SQL)
    }

    fn open(db_path: &str, schema: &str) -> Result<Self, Error> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = ConnectionManager::<SqliteConnection>::new(db_path);
        let pool = Pool::builder()
            .connection_customizer(Box::new(SqlitePragmas))
            .build(manager)?;

        let database = Database {
            pool: Arc::new(pool),
        };
        database.get_conn()?.batch_execute(schema)?;
        Ok(database)
    }

    /// Checks a connection out of the pool
    pub fn get_conn(&self) -> Result<PooledConnection<ConnectionManager<SqliteConnection>>, Error> {
        Ok(self.pool.get()?)
    }

    /// Drops every task record and recreates the empty table
    pub fn reset_tasks(&self) -> Result<(), Error> {
        info!("Deleting existing tasks table if it exists");
        let mut conn = self.get_conn()?;
        conn.batch_execute("DROP TABLE IF EXISTS tasks;")?;
        conn.batch_execute(STORE_SCHEMA_SQL)?;
        Ok(())
    }
}
