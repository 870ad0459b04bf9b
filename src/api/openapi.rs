//! OpenAPI specification generated from handler annotations via utoipa.

use utoipa::OpenApi;

/// Top-level OpenAPI document for the triage API.
///
/// Each handler module contributes its own paths and schemas via per-module
/// `#[derive(OpenApi)]` structs that are merged into this root document at
/// startup.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Pipeline Triage API",
        description = "Automated CI failure triage: deterministic evidence collection, \
                       model-assisted root-cause analysis, deduplicated issue filing.",
        version = "0.1.0",
        license(name = "Apache-2.0", url = "https://www.apache.org/licenses/LICENSE-2.0")
    ),
    servers(
        (url = "/", description = "Current server"),
    ),
    tags(
        (name = "events", description = "Webhook event intake"),
        (name = "fingerprints", description = "Deduplication state, read-only"),
        (name = "triage", description = "Live triage record stream"),
        (name = "health", description = "Health and readiness checks"),
    ),
    components(schemas(ErrorResponse))
)]
pub struct ApiDoc;

/// Standard error response body returned by all endpoints on failure.
#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g. "NOT_FOUND", "VALIDATION_ERROR")
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

/// Build the merged OpenAPI document from all handler modules.
pub fn build_openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();

    doc.merge(super::handlers::events::EventsApiDoc::openapi());
    doc.merge(super::handlers::fingerprints::FingerprintsApiDoc::openapi());
    doc.merge(super::handlers::stream::StreamApiDoc::openapi());
    doc.merge(super::handlers::health::HealthApiDoc::openapi());

    doc
}
