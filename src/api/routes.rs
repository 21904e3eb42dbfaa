//! API routes configuration module

use crate::api::handlers::{create_task, get_task, list_companies, list_tasks};
use crate::db::Database;
use axum::{
    routing::{get, post},
    Extension, Router,
};

/// Creates and configures the API router with all routes
///
/// # Arguments
/// * `database` - Database connection pool to be shared across handlers
///
/// # Returns
/// * `Router` - Configured router with all API endpoints and middleware
pub fn app(database: Database) -> Router {
    Router::new()
        .route("/tasks", post(create_task).get(list_tasks))
        .route("/tasks/:id", get(get_task))
        .route("/companies", get(list_companies))
        .layer(Extension(database))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn database() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("tasks.db").to_str().unwrap()).unwrap();
        (dir, db)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post_task(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/tasks")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_uri(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn create_then_fetch_task() {
        let (_dir, db) = database();

        let (status, created) = send(
            app(db.clone()),
            post_task(json!({"type": "company_research", "args": {"company_name": "Acme"}})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], json!("pending"));

        let id = created["id"].as_str().unwrap();
        let (status, task) = send(app(db), get_uri(&format!("/tasks/{}", id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(task["type"], json!("company_research"));
        assert_eq!(task["args"], json!({"company_name": "Acme"}));
        assert_eq!(task["result"], Value::Null);
    }

    #[tokio::test]
    async fn missing_task_is_404() {
        let (_dir, db) = database();
        let (status, body) = send(app(db), get_uri("/tasks/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], json!(404));
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let (_dir, db) = database();
        send(app(db.clone()), post_task(json!({"type": "generate_reply"}))).await;
        send(app(db.clone()), post_task(json!({"type": "bogus", "args": {}}))).await;

        let (_, all) = send(app(db.clone()), get_uri("/tasks")).await;
        assert_eq!(all.as_array().unwrap().len(), 2);
        assert_eq!(all[1]["type"], json!("bogus"));

        let (_, done) = send(app(db.clone()), get_uri("/tasks?status=completed")).await;
        assert!(done.as_array().unwrap().is_empty());

        let (status, _) = send(app(db), get_uri("/tasks?status=stuck")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn companies_start_empty() {
        let (_dir, db) = database();
        let (status, body) = send(app(db), get_uri("/companies")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }
}
