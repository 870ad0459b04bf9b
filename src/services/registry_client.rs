//! Package registry lookups for dependency staleness checks.
//!
//! Asks npm, PyPI and crates.io for the latest published version of a
//! package. Lookups are best-effort with an in-process TTL cache: a
//! registry being down or a package being unknown yields `None` and a
//! warning, never an error that blocks triage.

use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::{AppError, Result};

const CACHE_TTL: Duration = Duration::from_secs(3600); // 1 hour

/// Package ecosystems with a registry we know how to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ecosystem {
    Npm,
    PyPi,
    CratesIo,
}

impl Ecosystem {
    pub fn as_str(self) -> &'static str {
        match self {
            Ecosystem::Npm => "npm",
            Ecosystem::PyPi => "pypi",
            Ecosystem::CratesIo => "crates.io",
        }
    }
}

struct CachedLookup {
    latest: Option<String>,
    fetched_at: Instant,
}

/// Cached latest-version client shared across collector invocations.
pub struct RegistryClient {
    http: Client,
    cache: RwLock<HashMap<String, CachedLookup>>,
}

impl RegistryClient {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("pipeline-triage/0.1")
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Insert a known latest version into the cache, bypassing the
    /// registry for the TTL window.
    pub async fn prime(&self, ecosystem: Ecosystem, package: &str, latest: &str) {
        let key = format!("{}:{}", ecosystem.as_str(), package);
        let mut cache = self.cache.write().await;
        cache.insert(
            key,
            CachedLookup {
                latest: Some(latest.to_string()),
                fetched_at: Instant::now(),
            },
        );
    }

    /// Latest published version of a package, or `None` when the registry
    /// cannot answer for any reason.
    pub async fn latest_version(&self, ecosystem: Ecosystem, package: &str) -> Option<String> {
        let key = format!("{}:{}", ecosystem.as_str(), package);

        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(&key) {
                if cached.fetched_at.elapsed() < CACHE_TTL {
                    return cached.latest.clone();
                }
            }
        }

        let latest = self.fetch_latest(ecosystem, package).await;

        let mut cache = self.cache.write().await;
        cache.insert(
            key,
            CachedLookup {
                latest: latest.clone(),
                fetched_at: Instant::now(),
            },
        );
        latest
    }

    async fn fetch_latest(&self, ecosystem: Ecosystem, package: &str) -> Option<String> {
        let url = match ecosystem {
            Ecosystem::Npm => format!("https://registry.npmjs.org/{}", urlencoding::encode(package)),
            Ecosystem::PyPi => format!("https://pypi.org/pypi/{}/json", urlencoding::encode(package)),
            Ecosystem::CratesIo => format!(
                "https://crates.io/api/v1/crates/{}",
                urlencoding::encode(package)
            ),
        };

        match self.http.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<Value>().await {
                Ok(body) => parse_latest(ecosystem, &body),
                Err(e) => {
                    warn!(package, registry = ecosystem.as_str(), error = %e, "Unparseable registry response");
                    None
                }
            },
            Ok(resp) => {
                warn!(package, registry = ecosystem.as_str(), status = %resp.status(), "Registry lookup refused");
                None
            }
            Err(e) => {
                warn!(package, registry = ecosystem.as_str(), error = %e, "Registry lookup failed");
                None
            }
        }
    }
}

/// Pull the latest version out of each registry's response shape.
fn parse_latest(ecosystem: Ecosystem, body: &Value) -> Option<String> {
    let version = match ecosystem {
        Ecosystem::Npm => body.get("dist-tags")?.get("latest")?.as_str()?,
        Ecosystem::PyPi => body.get("info")?.get("version")?.as_str()?,
        Ecosystem::CratesIo => {
            let krate = body.get("crate")?;
            krate
                .get("max_stable_version")
                .and_then(Value::as_str)
                .or_else(|| krate.get("newest_version").and_then(Value::as_str))?
        }
    };
    Some(version.to_string())
}
