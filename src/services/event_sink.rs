//! Structured per-event triage records, published to subscribers.
//!
//! The orchestrator reports every terminal outcome here instead of writing
//! side-channel snapshots inline. Publication is fire-and-forget; a slow or
//! absent subscriber never blocks triage.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::triage::TerminalStatus;

/// One processed event, as published after its terminal status is known.
#[derive(Debug, Clone, Serialize)]
pub struct TriageRecord {
    /// Unique id for this processing pass
    pub triage_id: Uuid,
    pub project_id: Option<i64>,
    /// Pipeline or job id the event was keyed on
    pub subject_id: Option<i64>,
    pub status: TerminalStatus,
    /// Reason code for ignored/skipped/failed outcomes
    pub reason: Option<String>,
    pub root_cause: Option<String>,
    pub confidence: Option<f64>,
    pub fingerprint: Option<String>,
    pub issue_ref: Option<String>,
    pub elapsed_ms: u64,
    /// ISO 8601 timestamp
    pub timestamp: String,
}

/// Sink the orchestrator publishes records to.
pub trait EventSink: Send + Sync {
    fn publish(&self, record: TriageRecord);
}

/// Broadcast-based sink feeding the live stream endpoint.
///
/// Subscribers receive records via `tokio::sync::broadcast`. A subscriber
/// that falls behind sees `RecvError::Lagged` and simply resumes from the
/// most recent records.
pub struct TriageEventBus {
    tx: broadcast::Sender<TriageRecord>,
}

impl TriageEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TriageRecord> {
        self.tx.subscribe()
    }
}

impl EventSink for TriageEventBus {
    /// Publish a record. With no subscribers the record is dropped silently.
    fn publish(&self, record: TriageRecord) {
        let _ = self.tx.send(record);
    }
}
