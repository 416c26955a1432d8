// Worker lifecycle HTTP routes
// Decision: start/stop answer {"status": "started" | "stopped"}; lifecycle conflicts are 409

use axum::{extract::State, routing::get, routing::post, Json, Router};
use noscope_durable::{WorkerController, WorkerMetrics};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::common::{controller_error, ApiError, ErrorResponse};

/// Outcome of a lifecycle command
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkerCommandResponse {
    #[schema(example = "started")]
    pub status: String,
}

impl WorkerCommandResponse {
    fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
        }
    }
}

/// App state for worker routes
#[derive(Clone)]
pub struct AppState {
    pub controller: WorkerController,
}

impl AppState {
    pub fn new(controller: WorkerController) -> Self {
        Self { controller }
    }
}

/// Create worker routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/worker/metrics", get(get_metrics))
        .route("/worker/start", post(start_worker))
        .route("/worker/stop", post(stop_worker))
        .with_state(state)
}

/// GET /worker/metrics - Snapshot of worker counters and status
#[utoipa::path(
    get,
    path = "/worker/metrics",
    responses(
        (status = 200, description = "Current worker metrics", body = WorkerMetrics)
    ),
    tag = "worker"
)]
pub async fn get_metrics(State(state): State<AppState>) -> Json<WorkerMetrics> {
    Json(state.controller.metrics())
}

/// POST /worker/start - Start claiming and executing tasks
#[utoipa::path(
    post,
    path = "/worker/start",
    responses(
        (status = 200, description = "Worker started", body = WorkerCommandResponse),
        (status = 409, description = "Worker already running or stopping", body = ErrorResponse),
        (status = 500, description = "Worker cannot start", body = ErrorResponse)
    ),
    tag = "worker"
)]
pub async fn start_worker(
    State(state): State<AppState>,
) -> Result<Json<WorkerCommandResponse>, ApiError> {
    state.controller.start().await.map_err(controller_error)?;
    tracing::info!("Worker started via API");
    Ok(Json(WorkerCommandResponse::new("started")))
}

/// POST /worker/stop - Drain in-flight tasks and stop
#[utoipa::path(
    post,
    path = "/worker/stop",
    responses(
        (status = 200, description = "Worker stopped", body = WorkerCommandResponse),
        (status = 409, description = "Worker already stopped or starting", body = ErrorResponse)
    ),
    tag = "worker"
)]
pub async fn stop_worker(
    State(state): State<AppState>,
) -> Result<Json<WorkerCommandResponse>, ApiError> {
    state.controller.stop().await.map_err(controller_error)?;
    tracing::info!("Worker stopped via API");
    Ok(Json(WorkerCommandResponse::new("stopped")))
}
