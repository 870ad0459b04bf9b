//! Fingerprint persistence model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

/// One row of the `fingerprints` table: a recurring failure signature and
/// the issue that tracks it.
///
/// Rows are created on first occurrence, touched (counter, last_seen) on
/// repeats, and never deleted by this system.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct FingerprintRecord {
    /// Hex digest over project, subject id, commit and log-excerpt prefix
    pub fingerprint: String,
    pub project_id: i64,
    /// Issue reference as "<project_id>#<issue_iid>"
    pub issue_ref: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub occurrences: i64,
}
