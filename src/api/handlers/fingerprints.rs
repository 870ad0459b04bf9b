//! Read-only fingerprint listing.
//!
//! Operators use these to see which failure signatures recur and where
//! they are tracked. All writes to the table go through the dedup service;
//! nothing here mutates.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, OpenApi, ToSchema};

use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::fingerprint::FingerprintRecord;

/// Create fingerprint routes
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_fingerprints))
        .route("/:fingerprint", get(get_fingerprint))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListFingerprintsQuery {
    /// Restrict the listing to one project
    pub project_id: Option<i64>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FingerprintListResponse {
    pub items: Vec<FingerprintRecord>,
    pub total: i64,
}

/// List fingerprint records, most recently seen first.
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/v1/fingerprints",
    tag = "fingerprints",
    params(ListFingerprintsQuery),
    responses(
        (status = 200, description = "Fingerprint records", body = FingerprintListResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_fingerprints(
    State(state): State<SharedState>,
    Query(query): Query<ListFingerprintsQuery>,
) -> Result<Json<FingerprintListResponse>> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).min(100);
    let offset = page_offset(page, per_page);

    let items = sqlx::query_as::<_, FingerprintRecord>(
        "SELECT fingerprint, project_id, issue_ref, first_seen, last_seen, occurrences
         FROM fingerprints
         WHERE ($1::bigint IS NULL OR project_id = $1)
         ORDER BY last_seen DESC
         LIMIT $2 OFFSET $3",
    )
    .bind(query.project_id)
    .bind(per_page as i64)
    .bind(offset)
    .fetch_all(&state.db)
    .await?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM fingerprints WHERE ($1::bigint IS NULL OR project_id = $1)",
    )
    .bind(query.project_id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(FingerprintListResponse { items, total }))
}

/// Fetch one fingerprint record by its hash.
#[utoipa::path(
    get,
    path = "/{fingerprint}",
    context_path = "/api/v1/fingerprints",
    tag = "fingerprints",
    params(("fingerprint" = String, Path, description = "Fingerprint hex digest")),
    responses(
        (status = 200, description = "Fingerprint record", body = FingerprintRecord),
        (status = 404, description = "Unknown fingerprint")
    )
)]
pub async fn get_fingerprint(
    State(state): State<SharedState>,
    Path(fingerprint): Path<String>,
) -> Result<Json<FingerprintRecord>> {
    let record = sqlx::query_as::<_, FingerprintRecord>(
        "SELECT fingerprint, project_id, issue_ref, first_seen, last_seen, occurrences
         FROM fingerprints
         WHERE fingerprint = $1",
    )
    .bind(&fingerprint)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("fingerprint {}", fingerprint)))?;

    Ok(Json(record))
}

/// Row offset for a 1-based page, widened before multiplying so extreme
/// page numbers cannot overflow.
fn page_offset(page: u32, per_page: u32) -> i64 {
    (page as i64 - 1) * per_page as i64
}

#[derive(OpenApi)]
#[openapi(
    paths(list_fingerprints, get_fingerprint),
    components(schemas(FingerprintListResponse, FingerprintRecord))
)]
pub struct FingerprintsApiDoc;
