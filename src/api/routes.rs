//! Route definitions for the API.

use axum::{routing::get, Router};
use utoipa_swagger_ui::SwaggerUi;

use super::handlers;
use super::SharedState;

/// Create the main API router
pub fn create_router(state: SharedState) -> Router {
    // Build OpenAPI spec once at startup
    let openapi = super::openapi::build_openapi();

    Router::new()
        // Health endpoints (no auth required)
        .route("/health", get(handlers::health::health_check))
        .route("/healthz", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route("/readyz", get(handlers::health::readiness_check))
        .route("/livez", get(handlers::health::liveness_check))
        // Prometheus scrape target
        .route("/metrics", get(handlers::health::metrics))
        // OpenAPI spec (served by SwaggerUi at /api/v1/openapi.json) and Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api/v1/openapi.json", openapi))
        // API v1 routes
        .nest("/api/v1", api_v1_routes())
        .with_state(state)
}

/// API v1 routes
fn api_v1_routes() -> Router<SharedState> {
    Router::new()
        // Webhook intake; the shared-secret check lives in the handler
        .nest("/events", handlers::events::router())
        // Read-only dedup state
        .nest("/fingerprints", handlers::fingerprints::router())
        // Live triage records
        .nest("/triage", handlers::stream::router())
}
