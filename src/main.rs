//! Pipeline Triage - Main Entry Point

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::trace::TraceLayer;

use pipeline_triage::{
    api,
    config::Config,
    db,
    error::Result,
    retry::RetryPolicy,
    services::{
        analysis_client::{AnalysisClient, CompletionBackend, HttpCompletionBackend},
        code_host::{CodeHost, GitLabClient},
        dedup_service::{DedupService, PgFingerprintStore},
        event_sink::TriageEventBus,
        evidence_collector::EvidenceCollector,
        metrics_service,
        registry_client::RegistryClient,
        triage_service::TriageService,
        verification::ClaimVerifier,
    },
    telemetry,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    telemetry::init_tracing();

    // Load configuration
    let config = Arc::new(Config::from_env()?);
    tracing::info!("Starting Pipeline Triage");
    tracing::debug!(?config, "Configuration loaded");

    // Connect to database
    let db_pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("./migrations").run(&db_pool).await?;
    tracing::info!("Database migrations complete");

    // Initialize Prometheus metrics
    let metrics_handle = metrics_service::init_metrics();

    // One retry policy instance serves every upstream client
    let retry = RetryPolicy::new(
        config.model_max_attempts,
        Duration::from_millis(config.retry_base_delay_ms),
        Duration::from_millis(config.retry_max_delay_ms),
    );

    // Code host client; everything that touches the host goes through it
    let host: Arc<dyn CodeHost> = Arc::new(GitLabClient::new(
        &config.code_host_url,
        &config.code_host_token,
        retry.clone(),
    )?);

    // Package registry lookups for manifest staleness, optional
    let registry = if config.registry_check_enabled {
        Some(Arc::new(RegistryClient::new()?))
    } else {
        tracing::info!("Registry staleness checks disabled");
        None
    };
    let collector = EvidenceCollector::new(host.clone(), registry);

    // Model backend is optional; without it every analysis degrades to the
    // AI_UNAVAILABLE fallback and deterministic evidence still files issues
    let backend = HttpCompletionBackend::from_config(&config)?
        .map(|backend| Arc::new(backend) as Arc<dyn CompletionBackend>);
    if backend.is_none() {
        tracing::warn!("MODEL_URL not set; model analysis disabled");
    }
    let analysis = AnalysisClient::new(backend, config.model_max_concurrency, retry.clone());

    let verifier = ClaimVerifier::new(host.clone());
    let store = Arc::new(PgFingerprintStore::new(db_pool.clone()));
    let dedup = DedupService::new(host.clone(), store);

    let event_bus = Arc::new(TriageEventBus::new(256));
    let triage = Arc::new(TriageService::new(
        config.clone(),
        host,
        collector,
        analysis,
        verifier,
        dedup,
        Some(event_bus.clone()),
    ));

    // Assemble shared state and the router
    let mut state = api::AppState::new(config.clone(), db_pool, triage, event_bus);
    state.set_metrics_handle(metrics_handle);
    let state = Arc::new(state);

    let app = Router::new()
        .merge(api::routes::create_router(state))
        .layer(axum::middleware::from_fn(
            metrics_service::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr: SocketAddr = config.bind_address.parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
