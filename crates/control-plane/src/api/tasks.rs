// Task HTTP routes
// Decision: limit/offset are parsed leniently; unparseable values fall back to defaults
// Decision: A malformed JSON body is a 400 with the standard error body

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use noscope_durable::{PageRequest, Task, TaskListing, TaskQuery, TaskService};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::common::{service_error, ApiError, ErrorResponse};

/// Request to create a new task
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateTaskRequest {
    /// Reference to the object the task works on.
    #[schema(example = "0193a6a2-7c1e-7d2b-9a55-3f0e1b2c4d5e")]
    pub object_id: String,
    /// Structured input payload. Must be a JSON object.
    #[serde(default)]
    #[schema(value_type = Object, example = json!({"url": "https://example.com"}))]
    pub input: serde_json::Value,
}

/// Query parameters for listing tasks
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListTasksQuery {
    /// Only tasks for this object.
    pub object_id: Option<String>,
    /// Only tasks in this status (pending, processing, completed, failed).
    pub status: Option<String>,
    /// Page size, 1 to 100. Defaults to 10.
    #[param(value_type = Option<i64>)]
    pub limit: Option<String>,
    /// Number of tasks to skip. Defaults to 0.
    #[param(value_type = Option<i64>)]
    pub offset: Option<String>,
}

impl ListTasksQuery {
    fn into_task_query(self) -> TaskQuery {
        let lenient = |raw: Option<String>| raw.and_then(|v| v.trim().parse::<i64>().ok());
        TaskQuery {
            object_id: self.object_id,
            status: self.status,
            page: PageRequest::new(lenient(self.limit), lenient(self.offset)),
        }
    }
}

/// Effective pagination of a listing
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaginationInfo {
    /// Number of tasks matching the filters.
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

/// One page of tasks
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TaskListResponse {
    pub tasks: Vec<Task>,
    pub pagination: PaginationInfo,
}

impl From<TaskListing> for TaskListResponse {
    fn from(listing: TaskListing) -> Self {
        Self {
            tasks: listing.tasks,
            pagination: PaginationInfo {
                total: listing.total,
                limit: listing.limit,
                offset: listing.offset,
            },
        }
    }
}

/// App state for task routes
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TaskService>,
}

impl AppState {
    pub fn new(service: Arc<TaskService>) -> Self {
        Self { service }
    }
}

/// Create task routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/tasks", post(create_task).get(list_tasks))
        .route("/tasks/:task_id", get(get_task))
        .with_state(state)
}

/// POST /tasks - Create a pending task
#[utoipa::path(
    post,
    path = "/tasks",
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "Task created", body = Task),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "tasks"
)]
pub async fn create_task(
    State(state): State<AppState>,
    body: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let Json(req) = body
        .map_err(|e| ErrorResponse::new(e.body_text()).into_response(StatusCode::BAD_REQUEST))?;

    let task = state
        .service
        .create(req.object_id, req.input)
        .await
        .map_err(service_error)?;

    tracing::info!(task_id = %task.id, object_id = %task.object_id, "Task created");
    Ok((StatusCode::CREATED, Json(task)))
}

/// GET /tasks - List tasks, newest first
#[utoipa::path(
    get,
    path = "/tasks",
    params(ListTasksQuery),
    responses(
        (status = 200, description = "Page of tasks", body = TaskListResponse),
        (status = 400, description = "Unknown status filter", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "tasks"
)]
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<TaskListResponse>, ApiError> {
    let listing = state
        .service
        .list(query.into_task_query())
        .await
        .map_err(service_error)?;

    Ok(Json(listing.into()))
}

/// GET /tasks/{task_id} - Get a task by ID
#[utoipa::path(
    get,
    path = "/tasks/{task_id}",
    params(
        ("task_id" = Uuid, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Task found", body = Task),
        (status = 400, description = "Malformed task ID", body = ErrorResponse),
        (status = 404, description = "Task not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "tasks"
)]
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let task_id = Uuid::parse_str(task_id.trim()).map_err(|_| {
        ErrorResponse::new(format!("invalid task id: {task_id}"))
            .into_response(StatusCode::BAD_REQUEST)
    })?;

    let task = state.service.get(task_id).await.map_err(service_error)?;
    Ok(Json(task))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_pagination() {
        let query = ListTasksQuery {
            object_id: Some("o1".into()),
            status: None,
            limit: Some("abc".into()),
            offset: Some(" 20 ".into()),
        }
        .into_task_query();

        assert_eq!(query.page, PageRequest::new(None, Some(20)));
        let pagination = query.page.clamp();
        assert_eq!(pagination.limit, 10);
        assert_eq!(pagination.offset, 20);
    }
}
