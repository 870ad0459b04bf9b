//! Prometheus metrics collection and HTTP request instrumentation.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

use axum::{
    body::Body,
    http::{Request, Response},
    middleware::Next,
};

/// Initialize the Prometheus metrics recorder and return the handle for rendering.
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    builder
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Axum middleware that records HTTP request metrics.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().clone().to_string();
    let path = request.uri().path().to_string();
    // Normalize path to avoid high-cardinality labels (strip UUIDs and IDs)
    let normalized = normalize_path(&path);

    let start = Instant::now();
    counter!("pt_http_requests_total", "method" => method.clone(), "path" => normalized.clone())
        .increment(1);
    gauge!("pt_http_requests_in_flight", "method" => method.clone(), "path" => normalized.clone())
        .increment(1.0);

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    histogram!("pt_http_request_duration_seconds", "method" => method.clone(), "path" => normalized.clone(), "status" => status.clone()).record(duration);
    counter!("pt_http_responses_total", "method" => method.clone(), "path" => normalized.clone(), "status" => status).increment(1);
    gauge!("pt_http_requests_in_flight", "method" => method, "path" => normalized).decrement(1.0);

    response
}

/// Normalize URL paths to reduce label cardinality.
/// Replaces UUIDs, numeric IDs, and fingerprint hashes with placeholders.
fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').collect();
    let normalized: Vec<String> = segments
        .iter()
        .map(|seg| {
            if seg.len() == 36 && seg.chars().filter(|c| *c == '-').count() == 4 {
                // UUID pattern
                ":id".to_string()
            } else if seg.len() == 64 && seg.chars().all(|c| c.is_ascii_hexdigit()) {
                // Fingerprint hash
                ":fingerprint".to_string()
            } else if seg.parse::<i64>().is_ok() && !seg.is_empty() {
                // Numeric ID
                ":id".to_string()
            } else {
                seg.to_string()
            }
        })
        .collect();
    normalized.join("/")
}

/// Record one triaged event reaching a terminal status.
pub fn record_triage_outcome(status: &'static str, duration_secs: f64) {
    counter!("pt_triage_events_total", "status" => status).increment(1);
    histogram!("pt_triage_duration_seconds", "status" => status).record(duration_secs);
}

/// Record a model analysis call and whether it degraded to the fallback.
pub fn record_model_call(fallback: bool) {
    let result = if fallback { "fallback" } else { "ok" };
    counter!("pt_model_calls_total", "result" => result.to_string()).increment(1);
}

/// Record an issue-tracker write.
pub fn record_issue_write(disposition: &str) {
    counter!("pt_issue_writes_total", "disposition" => disposition.to_string()).increment(1);
}

/// Update database connection pool gauge metrics.
pub fn set_db_pool_gauges(pool: &sqlx::PgPool) {
    let size = pool.size() as f64;
    let idle = pool.num_idle() as f64;
    gauge!("pt_db_pool_connections_active").set(size - idle);
    gauge!("pt_db_pool_connections_idle").set(idle);
    gauge!("pt_db_pool_connections_max").set(pool.options().get_max_connections() as f64);
    gauge!("pt_db_pool_connections_size").set(size);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/api/v1/triages/550e8400-e29b-41d4-a716-446655440000";
        let result = normalize_path(path);
        assert_eq!(result, "/api/v1/triages/:id");
    }

    #[test]
    fn test_normalize_path_numeric() {
        let path = "/api/v1/fingerprints/123";
        let result = normalize_path(path);
        assert_eq!(result, "/api/v1/fingerprints/:id");
    }

    #[test]
    fn test_normalize_path_fingerprint() {
        let path = format!("/api/v1/fingerprints/{}", "a1b2c3d4".repeat(8));
        let result = normalize_path(&path);
        assert_eq!(result, "/api/v1/fingerprints/:fingerprint");
    }

    #[test]
    fn test_normalize_path_no_change() {
        let path = "/api/v1/health";
        let result = normalize_path(path);
        assert_eq!(result, "/api/v1/health");
    }
}
