use crate::api::errors::{api_error, ApiError};
use crate::core::{Task, TaskStatus, TaskType};
use crate::db::{Company, CompanyRepository, Database, TaskRepository};
use axum::extract::Query;
use axum::http::StatusCode;
use axum::{
    extract::{Extension, Path},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Represents the request payload for creating a new task
#[derive(Deserialize)]
pub struct CreateTaskRequest {
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default = "empty_args")]
    pub args: Value,
}

fn empty_args() -> Value {
    Value::Object(Default::default())
}

/// Represents the response payload after successfully creating a task
#[derive(Serialize)]
pub struct CreateTaskResponse {
    pub id: String,
    pub status: TaskStatus,
    pub created_at: String,
}

/// Query string of the task listing
#[derive(Deserialize)]
pub struct ListTasksQuery {
    pub status: Option<String>,
}

/// Enqueues a new task
///
/// # Arguments
/// * `database` - Database connection pool
/// * `payload` - JSON payload with the task type and its arguments
///
/// # Returns
/// * `Result<(StatusCode, Json<CreateTaskResponse>), ApiError>` - 201 with the new id, or error
#[axum::debug_handler]
pub async fn create_task(
    Extension(database): Extension<Database>,
    Json(payload): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<CreateTaskResponse>), ApiError> {
    if payload.task_type.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Task type is required"));
    }

    let mut conn = database.get_conn()?;
    let mut repo = TaskRepository::new(&mut conn);

    let task_type = TaskType::from_name(payload.task_type.trim());
    let id = repo.create_task(&task_type, &payload.args)?;
    let task = repo.get_task(&id)?;

    Ok((
        StatusCode::CREATED,
        Json(CreateTaskResponse {
            id: task.id,
            status: task.status,
            created_at: task.created_at,
        }),
    ))
}

/// Retrieves a task by its ID
///
/// # Returns
/// * `Result<Json<Task>, ApiError>` - The task, or 404 when it does not exist
#[axum::debug_handler]
pub async fn get_task(
    Path(id): Path<String>,
    Extension(database): Extension<Database>,
) -> Result<Json<Task>, ApiError> {
    let mut conn = database.get_conn()?;
    let task = TaskRepository::new(&mut conn).get_task(&id)?;
    Ok(Json(task))
}

/// Lists tasks in creation order, optionally filtered by `?status=`
#[axum::debug_handler]
pub async fn list_tasks(
    Query(query): Query<ListTasksQuery>,
    Extension(database): Extension<Database>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            raw.parse::<TaskStatus>()
                .map_err(|e| api_error(StatusCode::BAD_REQUEST, &e))?,
        ),
    };

    let mut conn = database.get_conn()?;
    let tasks = TaskRepository::new(&mut conn).list_tasks(status)?;
    Ok(Json(tasks))
}

/// Lists researched companies
#[axum::debug_handler]
pub async fn list_companies(
    Extension(database): Extension<Database>,
) -> Result<Json<Vec<Company>>, ApiError> {
    let mut conn = database.get_conn()?;
    let companies = CompanyRepository::new(&mut conn).list()?;
    Ok(Json(companies))
}
