//! Business logic services.

pub mod analysis_client;
pub mod code_host;
pub mod dedup_service;
pub mod event_sink;
pub mod evidence_collector;
pub mod metrics_service;
pub mod registry_client;
pub mod triage_service;
pub mod verification;
