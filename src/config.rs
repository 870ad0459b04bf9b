//! Application configuration loaded from environment variables.
//!
//! Built once at startup and passed by value into service constructors.
//! Nothing reads the environment after `Config::from_env` returns.

use crate::error::{AppError, Result};
use std::env;

/// Application configuration
#[derive(Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Server bind address (host:port)
    pub bind_address: String,

    /// Log level
    pub log_level: String,

    /// Code host API base URL, e.g. https://gitlab.example.com/api/v4
    pub code_host_url: String,

    /// Code host API token
    pub code_host_token: String,

    /// Shared secret expected in the webhook token header; unset disables the check
    pub webhook_secret: Option<String>,

    /// Model endpoint base URL; unset disables model analysis entirely
    pub model_url: Option<String>,

    /// Model endpoint API key
    pub model_api_key: Option<String>,

    /// Model identifier sent with every completion request
    pub model_name: String,

    /// Per-call model request timeout in seconds
    pub model_timeout_secs: u64,

    /// Maximum completion attempts per prompt (first try included)
    pub model_max_attempts: u32,

    /// Maximum in-flight model calls across all events
    pub model_max_concurrency: usize,

    /// Base delay for retry backoff in milliseconds
    pub retry_base_delay_ms: u64,

    /// Upper bound on a single retry delay in milliseconds
    pub retry_max_delay_ms: u64,

    /// Minimum model confidence for the validated label
    pub min_confidence: f64,

    /// Job names eligible for triage; empty means all
    pub monitored_job_names: Vec<String>,

    /// Pipeline stages eligible for triage; empty means all
    pub monitored_stages: Vec<String>,

    /// Whether successful/running jobs are ever analyzed
    pub success_sampling_enabled: bool,

    /// Fraction of successful jobs sampled when sampling is enabled
    pub success_sample_rate: f64,

    /// How many trailing log lines feed evidence collection and the model
    pub max_log_lines: usize,

    /// Key for keyed fingerprint hashing; unset falls back to plain SHA-256
    pub fingerprint_hmac_key: Option<String>,

    /// Whether manifest staleness checks query package registries
    pub registry_check_enabled: bool,

    /// Heuristic that decides when a healthy job still warrants analysis
    pub suspicion: SuspicionPolicy,
}

redacted_debug!(Config {
    show database_url,
    show bind_address,
    show log_level,
    show code_host_url,
    redact code_host_token,
    redact_option webhook_secret,
    show model_url,
    redact_option model_api_key,
    show model_name,
    show model_timeout_secs,
    show model_max_attempts,
    show model_max_concurrency,
    show retry_base_delay_ms,
    show retry_max_delay_ms,
    show min_confidence,
    show monitored_job_names,
    show monitored_stages,
    show success_sampling_enabled,
    show success_sample_rate,
    show max_log_lines,
    redact_option fingerprint_hmac_key,
    show registry_check_enabled,
    show suspicion,
});

/// Replaceable heuristic for success/running jobs: analyze when the log
/// contains one of the listed phrases or carries more warning lines than
/// the threshold.
#[derive(Debug, Clone)]
pub struct SuspicionPolicy {
    /// Lowercased phrases that mark a log as suspicious
    pub phrases: Vec<String>,

    /// Number of `warning`-bearing lines above which a log is suspicious
    pub warning_threshold: usize,
}

impl Default for SuspicionPolicy {
    fn default() -> Self {
        Self {
            phrases: [
                "deprecated",
                "deprecation",
                "timed out",
                "timeout",
                "retrying",
                "flaky",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            warning_threshold: 10,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let suspicion = SuspicionPolicy {
            phrases: match env::var("SUSPICION_PHRASES") {
                Ok(raw) if !raw.trim().is_empty() => csv_list(&raw),
                _ => SuspicionPolicy::default().phrases,
            },
            warning_threshold: env::var("SUSPICION_WARNING_THRESHOLD")
                .unwrap_or_else(|_| "10".into())
                .parse()
                .unwrap_or(10),
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| AppError::Config("DATABASE_URL not set".into()))?,
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            code_host_url: env::var("CODE_HOST_URL")
                .map_err(|_| AppError::Config("CODE_HOST_URL not set".into()))?,
            code_host_token: env::var("CODE_HOST_TOKEN")
                .map_err(|_| AppError::Config("CODE_HOST_TOKEN not set".into()))?,
            webhook_secret: env::var("WEBHOOK_SECRET").ok(),
            model_url: env::var("MODEL_URL").ok(),
            model_api_key: env::var("MODEL_API_KEY").ok(),
            model_name: env::var("MODEL_NAME").unwrap_or_else(|_| "gpt-4o-mini".into()),
            model_timeout_secs: env::var("MODEL_TIMEOUT_SECS")
                .unwrap_or_else(|_| "60".into())
                .parse()
                .unwrap_or(60),
            model_max_attempts: env::var("MODEL_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "4".into())
                .parse()
                .unwrap_or(4),
            model_max_concurrency: env::var("MODEL_MAX_CONCURRENCY")
                .unwrap_or_else(|_| "4".into())
                .parse()
                .unwrap_or(4),
            retry_base_delay_ms: env::var("RETRY_BASE_DELAY_MS")
                .unwrap_or_else(|_| "500".into())
                .parse()
                .unwrap_or(500),
            retry_max_delay_ms: env::var("RETRY_MAX_DELAY_MS")
                .unwrap_or_else(|_| "30000".into())
                .parse()
                .unwrap_or(30_000),
            min_confidence: env::var("TRIAGE_MIN_CONFIDENCE")
                .unwrap_or_else(|_| "0.6".into())
                .parse()
                .unwrap_or(0.6),
            monitored_job_names: env::var("MONITORED_JOB_NAMES")
                .map(|raw| csv_list(&raw))
                .unwrap_or_default(),
            monitored_stages: env::var("MONITORED_STAGES")
                .map(|raw| csv_list(&raw))
                .unwrap_or_default(),
            success_sampling_enabled: env::var("SUCCESS_SAMPLING_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            success_sample_rate: env::var("SUCCESS_SAMPLE_RATE")
                .unwrap_or_else(|_| "0.05".into())
                .parse()
                .unwrap_or(0.05),
            max_log_lines: env::var("TRIAGE_MAX_LOG_LINES")
                .unwrap_or_else(|_| "1200".into())
                .parse()
                .unwrap_or(1200),
            fingerprint_hmac_key: env::var("FINGERPRINT_HMAC_KEY").ok(),
            registry_check_enabled: env::var("REGISTRY_CHECK_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            suspicion,
        })
    }
}

/// Split a comma-separated env value into trimmed, non-empty entries.
fn csv_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
