//! Terminal triage statuses and the per-event gating decision.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Where an event ended up. Every event reaches exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    /// Event did not qualify for triage (incomplete or unmonitored)
    Ignored,
    /// Event qualified but nothing warranted an issue
    Skipped,
    /// Issue created or appended from deterministic evidence
    IssueCreated,
    /// Issue created or appended from model analysis
    IssueCreatedAi,
    /// Triage aborted: trace fetch or issue write failed
    Failed,
}

impl TerminalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TerminalStatus::Ignored => "ignored",
            TerminalStatus::Skipped => "skipped",
            TerminalStatus::IssueCreated => "issue_created",
            TerminalStatus::IssueCreatedAi => "issue_created_ai",
            TerminalStatus::Failed => "failed",
        }
    }
}

/// What one event produced, returned to the webhook caller.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TriageOutcome {
    pub status: TerminalStatus,

    /// Reason code for ignored/skipped/failed statuses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Reference of the issue created or appended to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_ref: Option<String>,

    /// True when the write landed on an already-known fingerprint
    pub deduplicated: bool,
}

impl TriageOutcome {
    pub fn ignored(reason: &str) -> Self {
        Self {
            status: TerminalStatus::Ignored,
            reason: Some(reason.to_string()),
            issue_ref: None,
            deduplicated: false,
        }
    }

    pub fn skipped(reason: &str) -> Self {
        Self {
            status: TerminalStatus::Skipped,
            reason: Some(reason.to_string()),
            issue_ref: None,
            deduplicated: false,
        }
    }

    pub fn failed(reason: &str) -> Self {
        Self {
            status: TerminalStatus::Failed,
            reason: Some(reason.to_string()),
            issue_ref: None,
            deduplicated: false,
        }
    }
}

/// Trust assessment for one finding, computed fresh per event and never
/// persisted.
#[derive(Debug, Clone, Serialize)]
pub struct GatingDecision {
    /// A collector hit survived its own re-check
    pub deterministic_verified: bool,

    /// The model's file/line claim survived re-fetching
    pub ai_claim_verified: bool,

    /// Verified evidence or sufficient confidence backs auto-creation
    pub allow_auto_create: bool,

    /// Labels attached to the issue write
    pub labels: Vec<String>,
}

impl GatingDecision {
    /// Label set marker for findings backed by verified evidence or
    /// confidence above the configured floor.
    pub const LABEL_VALIDATED: &'static str = "triage:validated";

    /// Label set marker for low-confidence findings that are still filed.
    pub const LABEL_UNVERIFIED: &'static str = "triage:unverified";

    /// Evaluate the gate. Verified evidence of either kind bypasses the
    /// confidence floor; below the floor the issue is still created but
    /// labeled unverified, never suppressed.
    pub fn evaluate(
        deterministic_verified: bool,
        ai_claim_verified: bool,
        confidence: f64,
        min_confidence: f64,
    ) -> Self {
        let allow_auto_create =
            deterministic_verified || ai_claim_verified || confidence >= min_confidence;
        let marker = if allow_auto_create {
            Self::LABEL_VALIDATED
        } else {
            Self::LABEL_UNVERIFIED
        };
        Self {
            deterministic_verified,
            ai_claim_verified,
            allow_auto_create,
            labels: vec!["triage".to_string(), marker.to_string()],
        }
    }
}
