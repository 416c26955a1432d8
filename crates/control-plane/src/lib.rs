// Noscope Control Plane Library
// Decision: Shared library for binaries (API server, OpenAPI export)
// Decision: /health and Swagger UI stay outside the API prefix

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::{extract::State, routing::get, Json, Router};
use noscope_durable::{HandlerRegistry, TaskService, WorkerController, WorkerStatus};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

// API routes and types (shared for OpenAPI generation)
pub mod api;

// Environment configuration
pub mod config;
pub use config::ServerConfig;

// Task handlers
pub mod handlers;

// OpenAPI spec generation
pub mod openapi;
use openapi::ApiDoc;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    worker_status: WorkerStatus,
}

async fn health(State(controller): State<WorkerController>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        worker_status: controller.status(),
    })
}

/// Handlers for the configured task kinds
///
/// The enrichment handler is the default handler when its endpoint is
/// configured; otherwise the registry is empty and the worker refuses to start.
pub fn build_registry(config: &ServerConfig) -> HandlerRegistry {
    match &config.enrichment {
        Some(enrichment) => HandlerRegistry::new()
            .with_default(handlers::EnrichmentHandler::new(enrichment.clone())),
        None => HandlerRegistry::new(),
    }
}

/// Assemble the full HTTP application
pub fn build_app(
    service: Arc<TaskService>,
    controller: WorkerController,
    config: &ServerConfig,
) -> Router {
    let api_routes = Router::new()
        .merge(api::tasks::routes(api::tasks::AppState::new(service)))
        .merge(api::worker::routes(api::worker::AppState::new(
            controller.clone(),
        )));

    // Health is never prefixed
    let app = Router::new()
        .route("/health", get(health).with_state(controller))
        .merge(build_router_with_prefix(api_routes, &config.api_prefix))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()));

    let cors_origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let app = if cors_origins.is_empty() {
        app
    } else {
        app.layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(cors_origins))
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::AUTHORIZATION,
                    header::ACCEPT,
                    header::ORIGIN,
                ])
                .allow_credentials(true),
        )
    };

    app.layer(TraceLayer::new_for_http())
}

/// Build router with optional API prefix
pub fn build_router_with_prefix<S: Clone + Send + Sync + 'static>(
    api_routes: Router<S>,
    api_prefix: &str,
) -> Router<S> {
    if api_prefix.is_empty() {
        api_routes
    } else {
        Router::new().nest(api_prefix, api_routes)
    }
}
