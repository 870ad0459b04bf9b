//! Shared fixtures: in-memory fakes for the code host, the fingerprint
//! store, and the model backend. No test in this suite touches the
//! network or a database.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use pipeline_triage::config::{Config, SuspicionPolicy};
use pipeline_triage::error::{AppError, Result};
use pipeline_triage::models::event::{Event, EventKind, JobStatus};
use pipeline_triage::models::fingerprint::FingerprintRecord;
use pipeline_triage::retry::RetryPolicy;
use pipeline_triage::services::analysis_client::{AnalysisClient, CompletionBackend};
use pipeline_triage::services::code_host::{CodeHost, Issue, Job};
use pipeline_triage::services::dedup_service::{DedupService, FingerprintStore};
use pipeline_triage::services::evidence_collector::EvidenceCollector;
use pipeline_triage::services::registry_client::RegistryClient;
use pipeline_triage::services::triage_service::TriageService;
use pipeline_triage::services::verification::ClaimVerifier;

pub const PROJECT: i64 = 42;
pub const PIPELINE: i64 = 777;
pub const JOB: i64 = 9001;
pub const COMMIT: &str = "deadbeefcafe";

// ---------------------------------------------------------------------------
// Fake code host
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CreatedIssue {
    pub iid: i64,
    pub title: String,
    pub description: String,
    pub labels: Vec<String>,
}

/// Programmable in-memory code host. State is inspected by tests after
/// the pipeline runs.
pub struct FakeCodeHost {
    pub traces: Mutex<HashMap<(i64, i64), String>>,
    pub files: Mutex<HashMap<(String, String), String>>,
    pub jobs: Mutex<HashMap<(i64, i64), Vec<Job>>>,
    /// Issues that exist on the tracker before the test runs: (iid, description)
    pub remote_issues: Mutex<Vec<(i64, String)>>,
    pub created: Mutex<Vec<CreatedIssue>>,
    pub notes: Mutex<Vec<(i64, String)>>,
    pub fail_trace: AtomicBool,
    pub fail_create_issue: AtomicBool,
    pub trace_calls: AtomicU32,
    next_iid: AtomicI64,
}

impl FakeCodeHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            traces: Mutex::new(HashMap::new()),
            files: Mutex::new(HashMap::new()),
            jobs: Mutex::new(HashMap::new()),
            remote_issues: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            notes: Mutex::new(Vec::new()),
            fail_trace: AtomicBool::new(false),
            fail_create_issue: AtomicBool::new(false),
            trace_calls: AtomicU32::new(0),
            next_iid: AtomicI64::new(1),
        })
    }

    pub fn set_trace(&self, project_id: i64, job_id: i64, trace: &str) {
        self.traces
            .lock()
            .unwrap()
            .insert((project_id, job_id), trace.to_string());
    }

    pub fn set_file(&self, path: &str, commit: &str, content: &str) {
        self.files
            .lock()
            .unwrap()
            .insert((path.to_string(), commit.to_string()), content.to_string());
    }

    pub fn set_jobs(&self, project_id: i64, pipeline_id: i64, jobs: Vec<Job>) {
        self.jobs
            .lock()
            .unwrap()
            .insert((project_id, pipeline_id), jobs);
    }

    pub fn add_remote_issue(&self, iid: i64, description: &str) {
        self.remote_issues
            .lock()
            .unwrap()
            .push((iid, description.to_string()));
    }

    pub fn created_issues(&self) -> Vec<CreatedIssue> {
        self.created.lock().unwrap().clone()
    }

    pub fn notes_for(&self, iid: i64) -> Vec<String> {
        self.notes
            .lock()
            .unwrap()
            .iter()
            .filter(|(note_iid, _)| *note_iid == iid)
            .map(|(_, body)| body.clone())
            .collect()
    }
}

#[async_trait]
impl CodeHost for FakeCodeHost {
    async fn list_pipeline_jobs(&self, project_id: i64, pipeline_id: i64) -> Result<Vec<Job>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .get(&(project_id, pipeline_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn job_trace(&self, project_id: i64, job_id: i64) -> Result<String> {
        self.trace_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_trace.load(Ordering::SeqCst) {
            return Err(AppError::Upstream {
                status: 500,
                message: "trace storage offline".to_string(),
            });
        }
        self.traces
            .lock()
            .unwrap()
            .get(&(project_id, job_id))
            .cloned()
            .ok_or_else(|| AppError::Upstream {
                status: 404,
                message: format!("no trace for job {}", job_id),
            })
    }

    async fn file_at_commit(
        &self,
        _project_id: i64,
        path: &str,
        commit: &str,
    ) -> Result<Option<String>> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .get(&(path.to_string(), commit.to_string()))
            .cloned())
    }

    async fn search_issues(&self, _project_id: i64, text: &str) -> Result<Vec<Issue>> {
        let mut found = Vec::new();
        for (iid, description) in self.remote_issues.lock().unwrap().iter() {
            if description.contains(text) {
                found.push(Issue {
                    iid: *iid,
                    title: None,
                    web_url: None,
                });
            }
        }
        for issue in self.created.lock().unwrap().iter() {
            if issue.description.contains(text) {
                found.push(Issue {
                    iid: issue.iid,
                    title: Some(issue.title.clone()),
                    web_url: None,
                });
            }
        }
        Ok(found)
    }

    async fn create_issue(
        &self,
        _project_id: i64,
        title: &str,
        description: &str,
        labels: &[String],
    ) -> Result<Issue> {
        if self.fail_create_issue.load(Ordering::SeqCst) {
            return Err(AppError::Upstream {
                status: 500,
                message: "issue tracker offline".to_string(),
            });
        }
        let iid = self.next_iid.fetch_add(1, Ordering::SeqCst);
        self.created.lock().unwrap().push(CreatedIssue {
            iid,
            title: title.to_string(),
            description: description.to_string(),
            labels: labels.to_vec(),
        });
        Ok(Issue {
            iid,
            title: Some(title.to_string()),
            web_url: None,
        })
    }

    async fn create_issue_note(&self, _project_id: i64, issue_iid: i64, body: &str) -> Result<()> {
        self.notes
            .lock()
            .unwrap()
            .push((issue_iid, body.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory fingerprint store
// ---------------------------------------------------------------------------

/// HashMap-backed store with the same insert-or-fetch contract as the
/// Postgres implementation.
pub struct InMemoryFingerprintStore {
    rows: Mutex<HashMap<String, FingerprintRecord>>,
}

impl InMemoryFingerprintStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(HashMap::new()),
        })
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn get(&self, fingerprint: &str) -> Option<FingerprintRecord> {
        self.rows.lock().unwrap().get(fingerprint).cloned()
    }
}

#[async_trait]
impl FingerprintStore for InMemoryFingerprintStore {
    async fn find(&self, fingerprint: &str) -> Result<Option<FingerprintRecord>> {
        Ok(self.rows.lock().unwrap().get(fingerprint).cloned())
    }

    async fn insert_or_fetch(
        &self,
        fingerprint: &str,
        project_id: i64,
        issue_ref: &str,
    ) -> Result<(FingerprintRecord, bool)> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(existing) = rows.get(fingerprint) {
            return Ok((existing.clone(), false));
        }
        let record = FingerprintRecord {
            fingerprint: fingerprint.to_string(),
            project_id,
            issue_ref: issue_ref.to_string(),
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            occurrences: 1,
        };
        rows.insert(fingerprint.to_string(), record.clone());
        Ok((record, true))
    }

    async fn touch(&self, fingerprint: &str) -> Result<()> {
        if let Some(record) = self.rows.lock().unwrap().get_mut(fingerprint) {
            record.occurrences += 1;
            record.last_seen = Utc::now();
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scripted model backend
// ---------------------------------------------------------------------------

/// Replies are played back in order; an exhausted script answers as an
/// unreachable endpoint.
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<Result<String>>>,
    pub calls: AtomicU32,
}

impl ScriptedCompletion {
    pub fn new(replies: Vec<Result<String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: AtomicU32::new(0),
        })
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionBackend for ScriptedCompletion {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::Unavailable("script exhausted".to_string())))
    }
}

/// A schema-complete model reply with the given confidence and no claim.
pub fn model_reply(root_cause: &str, confidence: f64) -> String {
    format!(
        r#"{{"stage":"test","root_cause":"{}","suggested_fix":"pin the flaky dependency","confidence":{},"explain":"derived from the log excerpt"}}"#,
        root_cause, confidence
    )
}

/// A schema-complete model reply citing a file/line/match claim.
pub fn model_reply_with_claim(
    root_cause: &str,
    confidence: f64,
    file: &str,
    line: u64,
    matched: &str,
) -> String {
    format!(
        r#"{{"stage":"test","root_cause":"{}","suggested_fix":"fix the cited line","confidence":{},"explain":"cited from the excerpt","claim":{{"file":"{}","line":{},"match":"{}"}}}}"#,
        root_cause, confidence, file, line, matched
    )
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://unused".into(),
        bind_address: "127.0.0.1:0".into(),
        log_level: "debug".into(),
        code_host_url: "https://gitlab.example.com/api/v4".into(),
        code_host_token: "glpat-test".into(),
        webhook_secret: None,
        model_url: Some("https://models.example.com/v1".into()),
        model_api_key: None,
        model_name: "test-model".into(),
        model_timeout_secs: 5,
        model_max_attempts: 2,
        model_max_concurrency: 4,
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 4,
        min_confidence: 0.6,
        monitored_job_names: vec![],
        monitored_stages: vec![],
        success_sampling_enabled: false,
        success_sample_rate: 1.0,
        max_log_lines: 1200,
        fingerprint_hmac_key: None,
        registry_check_enabled: true,
        suspicion: SuspicionPolicy::default(),
    }
}

/// Everything a pipeline test needs: the wired service plus handles on
/// the fakes behind it.
pub struct Harness {
    pub host: Arc<FakeCodeHost>,
    pub store: Arc<InMemoryFingerprintStore>,
    pub backend: Arc<ScriptedCompletion>,
    pub service: TriageService,
}

impl Harness {
    pub fn new(config: Config, replies: Vec<Result<String>>) -> Self {
        Self::with_registry(config, replies, None)
    }

    pub fn with_registry(
        config: Config,
        replies: Vec<Result<String>>,
        registry: Option<Arc<RegistryClient>>,
    ) -> Self {
        let config = Arc::new(config);
        let host = FakeCodeHost::new();
        let store = InMemoryFingerprintStore::new();
        let backend = ScriptedCompletion::new(replies);

        let retry = RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(4));
        let collector = EvidenceCollector::new(host.clone(), registry);
        let analysis = AnalysisClient::new(
            Some(backend.clone()),
            config.model_max_concurrency,
            retry.clone(),
        );
        let verifier = ClaimVerifier::new(host.clone());
        let dedup = DedupService::new(host.clone(), store.clone());

        let service = TriageService::new(
            config,
            host.clone(),
            collector,
            analysis,
            verifier,
            dedup,
            None,
        );
        Self {
            host,
            store,
            backend,
            service,
        }
    }
}

// ---------------------------------------------------------------------------
// Event builders
// ---------------------------------------------------------------------------

pub fn failed_job_event() -> Event {
    Event {
        kind: EventKind::Job,
        project_id: Some(PROJECT),
        pipeline_id: Some(PIPELINE),
        job_id: Some(JOB),
        job_name: Some("unit-tests".to_string()),
        job_stage: Some("test".to_string()),
        status: JobStatus::Failed,
        commit_sha: Some(COMMIT.to_string()),
    }
}

pub fn job_event_with_status(status: JobStatus) -> Event {
    Event {
        status,
        ..failed_job_event()
    }
}

pub fn pipeline_event() -> Event {
    Event {
        kind: EventKind::Pipeline,
        project_id: Some(PROJECT),
        pipeline_id: Some(PIPELINE),
        job_id: None,
        job_name: None,
        job_stage: None,
        status: JobStatus::Failed,
        commit_sha: Some(COMMIT.to_string()),
    }
}
