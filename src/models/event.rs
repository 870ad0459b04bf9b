//! Inbound webhook payloads and the canonical event they normalize into.
//!
//! The code host delivers two payload shapes (job-level and pipeline-level)
//! with the same facts under different keys. Everything past the HTTP
//! boundary works on [`Event`]; the shape split ends here.

use serde::{Deserialize, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Canonical event
// ---------------------------------------------------------------------------

/// What kind of subject the event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Job,
    Pipeline,
}

/// Job/pipeline status as reported by the code host.
///
/// Unknown strings are preserved rather than dropped so logs and records
/// show what the host actually sent; they classify as non-failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Created,
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
    Skipped,
    Manual,
    Other(String),
}

impl JobStatus {
    /// Parse from string (case-insensitive); unknown values are kept verbatim.
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "created" => JobStatus::Created,
            "pending" => JobStatus::Pending,
            "running" => JobStatus::Running,
            "success" => JobStatus::Success,
            "failed" => JobStatus::Failed,
            "canceled" | "cancelled" => JobStatus::Canceled,
            "skipped" => JobStatus::Skipped,
            "manual" => JobStatus::Manual,
            _ => JobStatus::Other(s.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
            JobStatus::Skipped => "skipped",
            JobStatus::Manual => "manual",
            JobStatus::Other(s) => s.as_str(),
        }
    }

    /// Statuses that always warrant analysis. Everything else only gets
    /// looked at under success sampling.
    pub fn is_hard_failure(&self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Canceled | JobStatus::Manual)
    }
}

impl Serialize for JobStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Canonical representation of an inbound notification.
///
/// Built once at the boundary, immutable afterwards, discarded when the
/// event reaches a terminal status. Identifier fields stay optional so
/// incomplete deliveries reach the orchestrator and terminate `ignored`
/// with a reason instead of failing deserialization.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub kind: EventKind,
    pub project_id: Option<i64>,
    pub pipeline_id: Option<i64>,
    pub job_id: Option<i64>,
    pub job_name: Option<String>,
    pub job_stage: Option<String>,
    pub status: JobStatus,
    pub commit_sha: Option<String>,
}

impl Event {
    /// The identifier triage keys on: the job for job events, the pipeline
    /// for pipeline events, either as a fallback.
    pub fn subject_id(&self) -> Option<i64> {
        match self.kind {
            EventKind::Job => self.job_id.or(self.pipeline_id),
            EventKind::Pipeline => self.pipeline_id.or(self.job_id),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire payloads
// ---------------------------------------------------------------------------

/// Raw webhook body, tagged by the host's `object_kind` discriminator.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "object_kind")]
pub enum WebhookPayload {
    #[serde(rename = "build")]
    Job(JobEventPayload),
    #[serde(rename = "pipeline")]
    Pipeline(PipelineEventPayload),
}

/// Job-level hook: facts live at the top level under `build_*` keys.
#[derive(Debug, Clone, Deserialize)]
pub struct JobEventPayload {
    pub project_id: Option<i64>,
    pub build_id: Option<i64>,
    pub build_name: Option<String>,
    pub build_stage: Option<String>,
    pub build_status: Option<String>,
    pub pipeline_id: Option<i64>,
    pub sha: Option<String>,
}

/// Pipeline-level hook: facts live under `object_attributes` and `project`.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineEventPayload {
    pub project: Option<ProjectRef>,
    pub object_attributes: Option<PipelineAttributes>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectRef {
    pub id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineAttributes {
    pub id: Option<i64>,
    pub status: Option<String>,
    pub sha: Option<String>,
}

impl From<WebhookPayload> for Event {
    fn from(payload: WebhookPayload) -> Self {
        match payload {
            WebhookPayload::Job(job) => Event {
                kind: EventKind::Job,
                project_id: job.project_id,
                pipeline_id: job.pipeline_id,
                job_id: job.build_id,
                job_name: job.build_name,
                job_stage: job.build_stage,
                status: job
                    .build_status
                    .as_deref()
                    .map(JobStatus::from_str_loose)
                    .unwrap_or(JobStatus::Other("unknown".into())),
                commit_sha: job.sha,
            },
            WebhookPayload::Pipeline(pipeline) => {
                let attrs = pipeline.object_attributes.unwrap_or(PipelineAttributes {
                    id: None,
                    status: None,
                    sha: None,
                });
                Event {
                    kind: EventKind::Pipeline,
                    project_id: pipeline.project.and_then(|p| p.id),
                    pipeline_id: attrs.id,
                    job_id: None,
                    job_name: None,
                    job_stage: None,
                    status: attrs
                        .status
                        .as_deref()
                        .map(JobStatus::from_str_loose)
                        .unwrap_or(JobStatus::Other("unknown".into())),
                    commit_sha: attrs.sha,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_payload_normalizes_to_job_event() {
        let raw = serde_json::json!({
            "object_kind": "build",
            "project_id": 42,
            "build_id": 9001,
            "build_name": "unit-tests",
            "build_stage": "test",
            "build_status": "failed",
            "pipeline_id": 777,
            "sha": "abc123def456"
        });
        let payload: WebhookPayload = serde_json::from_value(raw).unwrap();
        let event = Event::from(payload);

        assert_eq!(event.kind, EventKind::Job);
        assert_eq!(event.project_id, Some(42));
        assert_eq!(event.job_id, Some(9001));
        assert_eq!(event.pipeline_id, Some(777));
        assert_eq!(event.job_name.as_deref(), Some("unit-tests"));
        assert_eq!(event.status, JobStatus::Failed);
        assert_eq!(event.commit_sha.as_deref(), Some("abc123def456"));
        assert_eq!(event.subject_id(), Some(9001));
    }

    #[test]
    fn pipeline_payload_normalizes_to_pipeline_event() {
        let raw = serde_json::json!({
            "object_kind": "pipeline",
            "project": { "id": 42 },
            "object_attributes": {
                "id": 777,
                "status": "failed",
                "sha": "abc123def456"
            }
        });
        let payload: WebhookPayload = serde_json::from_value(raw).unwrap();
        let event = Event::from(payload);

        assert_eq!(event.kind, EventKind::Pipeline);
        assert_eq!(event.project_id, Some(42));
        assert_eq!(event.pipeline_id, Some(777));
        assert_eq!(event.job_id, None);
        assert_eq!(event.subject_id(), Some(777));
    }

    #[test]
    fn missing_identifiers_survive_normalization() {
        let raw = serde_json::json!({
            "object_kind": "build",
            "build_status": "failed"
        });
        let payload: WebhookPayload = serde_json::from_value(raw).unwrap();
        let event = Event::from(payload);

        assert_eq!(event.project_id, None);
        assert_eq!(event.subject_id(), None);
    }

    #[test]
    fn unknown_status_is_preserved_not_dropped() {
        let status = JobStatus::from_str_loose("waiting_for_resource");
        assert_eq!(status, JobStatus::Other("waiting_for_resource".into()));
        assert_eq!(status.as_str(), "waiting_for_resource");
        assert!(!status.is_hard_failure());
    }

    #[test]
    fn status_parse_is_case_insensitive_with_aliases() {
        assert_eq!(JobStatus::from_str_loose("FAILED"), JobStatus::Failed);
        assert_eq!(JobStatus::from_str_loose("cancelled"), JobStatus::Canceled);
        assert_eq!(JobStatus::from_str_loose("Success"), JobStatus::Success);
    }

    #[test]
    fn hard_failure_statuses() {
        assert!(JobStatus::Failed.is_hard_failure());
        assert!(JobStatus::Canceled.is_hard_failure());
        assert!(JobStatus::Manual.is_hard_failure());
        assert!(!JobStatus::Success.is_hard_failure());
        assert!(!JobStatus::Running.is_hard_failure());
        assert!(!JobStatus::Skipped.is_hard_failure());
    }
}
