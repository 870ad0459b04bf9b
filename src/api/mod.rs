//! API module - HTTP handlers and shared state.

pub mod handlers;
pub mod openapi;
pub mod routes;

use crate::config::Config;
use crate::services::event_sink::TriageEventBus;
use crate::services::triage_service::TriageService;
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: PgPool,
    pub triage: Arc<TriageService>,
    pub event_bus: Arc<TriageEventBus>,
    pub metrics_handle: Option<Arc<PrometheusHandle>>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        db: PgPool,
        triage: Arc<TriageService>,
        event_bus: Arc<TriageEventBus>,
    ) -> Self {
        Self {
            config,
            db,
            triage,
            event_bus,
            metrics_handle: None,
        }
    }

    /// Set the Prometheus metrics handle for rendering /metrics output.
    pub fn set_metrics_handle(&mut self, handle: PrometheusHandle) {
        self.metrics_handle = Some(Arc::new(handle));
    }
}

pub type SharedState = Arc<AppState>;
