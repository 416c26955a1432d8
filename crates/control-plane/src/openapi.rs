// OpenAPI specification generation
//
// This module defines the OpenAPI spec for the Noscope admin API.
// It is used by both the API server (for Swagger UI)
// and the export-openapi binary (for static spec generation).

use crate::api;
use noscope_durable::{Task, TaskStatus, WorkerMetrics, WorkerStatus};
use utoipa::OpenApi;

/// OpenAPI documentation for the Noscope admin API
#[derive(OpenApi)]
#[openapi(
    paths(
        api::tasks::create_task,
        api::tasks::list_tasks,
        api::tasks::get_task,
        api::worker::get_metrics,
        api::worker::start_worker,
        api::worker::stop_worker,
    ),
    components(
        schemas(
            Task, TaskStatus,
            WorkerMetrics, WorkerStatus,
            api::tasks::CreateTaskRequest,
            api::tasks::TaskListResponse,
            api::tasks::PaginationInfo,
            api::worker::WorkerCommandResponse,
            api::ErrorResponse,
        )
    ),
    tags(
        (name = "tasks", description = "Task submission and queries"),
        (name = "worker", description = "Worker lifecycle and metrics")
    ),
    info(
        title = "Noscope Admin API",
        version = "0.1.0",
        description = "API for submitting enrichment tasks and controlling the worker pool",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate the OpenAPI spec as a pretty-printed JSON string
    pub fn to_json() -> Result<String, serde_json::Error> {
        Self::openapi().to_pretty_json()
    }
}
