use super::models::TaskRow;
use super::timestamp;
use crate::core::{Task, TaskStatus, TaskType};
use crate::errors::Error;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

/// Repository for task records in the SQLite database
///
/// Every write runs inside an immediate transaction, so concurrent
/// processes sharing the file serialize on the SQLite write lock.
pub struct TaskRepository<'a> {
    /// Database connection
    pub conn: &'a mut SqliteConnection,
}

impl<'a> TaskRepository<'a> {
    /// Creates a new TaskRepository instance
    ///
    /// # Arguments
    ///
    /// * `conn` - Mutable reference to SQLite database connection
    pub fn new(conn: &'a mut SqliteConnection) -> Self {
        TaskRepository { conn }
    }

    /// Inserts a new `Pending` task and returns its freshly generated id
    ///
    /// # Arguments
    ///
    /// * `task_type` - Kind of work, selects the handler
    /// * `args` - Opaque handler arguments
    ///
    /// # Errors
    ///
    /// Returns an Error if serialization or database operations fail
    pub fn create_task(&mut self, task_type: &TaskType, args: &Value) -> Result<String, Error> {
        use crate::schema::tasks;

        let args_str = serde_json::to_string(args)?;
        self.conn.immediate_transaction(|conn| {
            let last_seq: Option<i64> = tasks::table
                .select(diesel::dsl::max(tasks::seq))
                .first(conn)?;

            let now = timestamp();
            let row = TaskRow {
                id: Uuid::new_v4().to_string(),
                seq: last_seq.unwrap_or(0) + 1,
                task_type: task_type.as_str().to_string(),
                args: args_str,
                status: TaskStatus::Pending.as_str().to_string(),
                result: None,
                error: None,
                created_at: now.clone(),
                updated_at: now,
            };

            diesel::insert_into(tasks::table)
                .values(&row)
                .execute(conn)?;

            debug!("Created task {} of type {}", row.id, row.task_type);
            Ok(row.id)
        })
    }

    /// Retrieves a single task by id
    ///
    /// # Errors
    ///
    /// Returns `Error::TaskNotFound` if no task has this id
    pub fn get_task(&mut self, task_id: &str) -> Result<Task, Error> {
        use crate::schema::tasks;

        let row = tasks::table
            .filter(tasks::id.eq(task_id))
            .select(TaskRow::as_select())
            .first(self.conn)
            .optional()?
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;

        row_to_task(row)
    }

    /// Returns the oldest `Pending` task without changing it
    ///
    /// Tasks are ordered by creation timestamp, then by insertion order.
    pub fn next_pending(&mut self) -> Result<Option<Task>, Error> {
        oldest_pending(self.conn)?.map(row_to_task).transpose()
    }

    /// Claims the oldest `Pending` task by moving it to `Running`
    ///
    /// Selection and the conditional `pending -> running` update share one
    /// immediate transaction, so two consumers can never claim the same task.
    ///
    /// # Returns
    ///
    /// The claimed task, already `Running`, or `None` when nothing is pending
    pub fn claim_next_pending(&mut self) -> Result<Option<Task>, Error> {
        use crate::schema::tasks;

        self.conn.immediate_transaction(|conn| {
            let Some(mut row) = oldest_pending(conn)? else {
                return Ok(None);
            };

            let now = timestamp();
            let claimed = diesel::update(
                tasks::table
                    .filter(tasks::id.eq(&row.id))
                    .filter(tasks::status.eq(TaskStatus::Pending.as_str())),
            )
            .set((
                tasks::status.eq(TaskStatus::Running.as_str()),
                tasks::updated_at.eq(&now),
            ))
            .execute(conn)?;

            if claimed == 0 {
                return Ok(None);
            }

            row.status = TaskStatus::Running.as_str().to_string();
            row.updated_at = now;
            row_to_task(row).map(Some)
        })
    }

    /// Moves a task to `new_status`, recording its result or error
    ///
    /// # Arguments
    ///
    /// * `task_id` - The task to update
    /// * `new_status` - Target status, must be reachable from the current one
    /// * `result` - Handler result, only allowed with `Completed` (defaults to `{}`)
    /// * `error` - Failure description, required and non-empty with `Failed`
    ///
    /// # Errors
    ///
    /// * `Error::TaskNotFound` if the id does not exist
    /// * `Error::InvalidTransition` if the move is not on the state machine
    /// * `Error::InvalidUpdate` if result/error do not match the target status
    pub fn update_status(
        &mut self,
        task_id: &str,
        new_status: TaskStatus,
        result: Option<&Value>,
        error: Option<&str>,
    ) -> Result<(), Error> {
        use crate::schema::tasks;

        let invalid = |reason: &str| Error::InvalidUpdate {
            id: task_id.to_string(),
            reason: reason.to_string(),
        };

        let (result_col, error_col) = match new_status {
            TaskStatus::Completed => {
                if error.is_some() {
                    return Err(invalid("a completed task cannot carry an error"));
                }
                let empty = Value::Object(Default::default());
                (Some(serde_json::to_string(result.unwrap_or(&empty))?), None)
            }
            TaskStatus::Failed => {
                if result.is_some() {
                    return Err(invalid("a failed task cannot carry a result"));
                }
                let message = error
                    .filter(|e| !e.trim().is_empty())
                    .ok_or_else(|| invalid("a failed task needs an error message"))?;
                (None, Some(message.to_string()))
            }
            TaskStatus::Pending | TaskStatus::Running => {
                if result.is_some() || error.is_some() {
                    return Err(invalid("only terminal tasks carry a result or error"));
                }
                (None, None)
            }
        };

        self.conn.immediate_transaction(|conn| {
            let current: String = tasks::table
                .filter(tasks::id.eq(task_id))
                .select(tasks::status)
                .first(conn)
                .optional()?
                .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;
            let current = parse_status(task_id, &current)?;

            if !current.can_transition_to(new_status) {
                return Err(Error::InvalidTransition {
                    id: task_id.to_string(),
                    from: current,
                    to: new_status,
                });
            }

            diesel::update(
                tasks::table
                    .filter(tasks::id.eq(task_id))
                    .filter(tasks::status.eq(current.as_str())),
            )
            .set((
                tasks::status.eq(new_status.as_str()),
                tasks::result.eq(result_col.as_deref()),
                tasks::error.eq(error_col.as_deref()),
                tasks::updated_at.eq(timestamp()),
            ))
            .execute(conn)?;

            debug!("Task {} moved {} -> {}", task_id, current, new_status);
            Ok(())
        })
    }

    /// Lists tasks in creation order, optionally restricted to one status
    pub fn list_tasks(&mut self, status: Option<TaskStatus>) -> Result<Vec<Task>, Error> {
        use crate::schema::tasks;

        let mut query = tasks::table
            .select(TaskRow::as_select())
            .order((tasks::created_at.asc(), tasks::seq.asc()))
            .into_boxed();
        if let Some(status) = status {
            query = query.filter(tasks::status.eq(status.as_str()));
        }

        query
            .load(self.conn)?
            .into_iter()
            .map(row_to_task)
            .collect()
    }
}

fn oldest_pending(conn: &mut SqliteConnection) -> Result<Option<TaskRow>, Error> {
    use crate::schema::tasks;

    Ok(tasks::table
        .filter(tasks::status.eq(TaskStatus::Pending.as_str()))
        .order((tasks::created_at.asc(), tasks::seq.asc()))
        .select(TaskRow::as_select())
        .first(conn)
        .optional()?)
}

fn parse_status(task_id: &str, raw: &str) -> Result<TaskStatus, Error> {
    raw.parse().map_err(|reason| Error::CorruptRecord {
        id: task_id.to_string(),
        reason,
    })
}

fn row_to_task(row: TaskRow) -> Result<Task, Error> {
    let status = parse_status(&row.id, &row.status)?;
    let args = serde_json::from_str(&row.args)?;
    let result = row
        .result
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?;

    Ok(Task {
        id: row.id,
        task_type: TaskType::from_name(&row.task_type),
        args,
        status,
        result,
        error: row.error,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}
