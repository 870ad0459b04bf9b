//! The triage state machine.
//!
//! One normalized event goes in, one terminal status comes out: `ignored`,
//! `skipped`, `issue_created`, `issue_created_ai`, or `failed`. The
//! orchestrator owns the decision order and performs no I/O of its own
//! beyond trace bookkeeping; fetching, analysis, verification, and
//! persistence are all delegated.

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use chrono::Utc;
use rand::Rng;
use regex::Regex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{Config, SuspicionPolicy};
use crate::models::analysis::AnalysisResult;
use crate::models::event::{Event, EventKind, JobStatus};
use crate::models::evidence::EvidenceBundle;
use crate::models::triage::{GatingDecision, TerminalStatus, TriageOutcome};
use crate::services::analysis_client::AnalysisClient;
use crate::services::code_host::CodeHost;
use crate::services::dedup_service::{
    derive_fingerprint, DedupService, FingerprintInputs, IssueContext, IssueDisposition,
};
use crate::services::event_sink::{EventSink, TriageRecord};
use crate::services::evidence_collector::EvidenceCollector;
use crate::services::metrics_service;
use crate::services::verification::ClaimVerifier;

/// Lines kept from each end of the tail for the human-readable excerpt.
const EXCERPT_EDGE_LINES: usize = 40;

/// Fields the published record needs that the outcome does not carry.
#[derive(Default)]
struct TriageDetails {
    root_cause: Option<String>,
    confidence: Option<f64>,
    fingerprint: Option<String>,
}

pub struct TriageService {
    config: Arc<Config>,
    host: Arc<dyn CodeHost>,
    collector: EvidenceCollector,
    analysis: AnalysisClient,
    verifier: ClaimVerifier,
    dedup: DedupService,
    sink: Option<Arc<dyn EventSink>>,
}

impl TriageService {
    pub fn new(
        config: Arc<Config>,
        host: Arc<dyn CodeHost>,
        collector: EvidenceCollector,
        analysis: AnalysisClient,
        verifier: ClaimVerifier,
        dedup: DedupService,
        sink: Option<Arc<dyn EventSink>>,
    ) -> Self {
        Self {
            config,
            host,
            collector,
            analysis,
            verifier,
            dedup,
            sink,
        }
    }

    /// Run one event to its terminal status. Never returns an error; every
    /// failure mode is a terminal status with a reason.
    pub async fn triage(&self, event: Event) -> TriageOutcome {
        let started = Instant::now();
        info!(
            kind = ?event.kind,
            project_id = ?event.project_id,
            subject_id = ?event.subject_id(),
            status = event.status.as_str(),
            "Triage started"
        );

        let (outcome, details) = match event.kind {
            EventKind::Job => self.triage_job(&event).await,
            EventKind::Pipeline => self.triage_pipeline(&event).await,
        };

        let elapsed = started.elapsed();
        metrics_service::record_triage_outcome(outcome.status.as_str(), elapsed.as_secs_f64());
        if let Some(sink) = &self.sink {
            sink.publish(TriageRecord {
                triage_id: Uuid::new_v4(),
                project_id: event.project_id,
                subject_id: event.subject_id(),
                status: outcome.status,
                reason: outcome.reason.clone(),
                root_cause: details.root_cause,
                confidence: details.confidence,
                fingerprint: details.fingerprint,
                issue_ref: outcome.issue_ref.clone(),
                elapsed_ms: elapsed.as_millis() as u64,
                timestamp: Utc::now().to_rfc3339(),
            });
        }
        info!(
            status = outcome.status.as_str(),
            reason = ?outcome.reason,
            issue_ref = ?outcome.issue_ref,
            elapsed_ms = elapsed.as_millis() as u64,
            "Triage finished"
        );
        outcome
    }

    /// A pipeline event is triaged through its first failed job; with no
    /// failed jobs there is nothing to investigate.
    async fn triage_pipeline(&self, event: &Event) -> (TriageOutcome, TriageDetails) {
        let details = TriageDetails::default();
        let Some(project_id) = event.project_id else {
            return (TriageOutcome::ignored("missing_project_id"), details);
        };
        let Some(pipeline_id) = event.pipeline_id else {
            return (TriageOutcome::ignored("missing_subject_id"), details);
        };

        let jobs = match self.host.list_pipeline_jobs(project_id, pipeline_id).await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(project_id, pipeline_id, error = %e, "Listing pipeline jobs failed");
                return (TriageOutcome::failed("failed_to_list_jobs"), details);
            }
        };
        let Some(job) = jobs.into_iter().find(|j| j.status == "failed") else {
            return (TriageOutcome::skipped("no_failed_jobs"), details);
        };

        info!(project_id, pipeline_id, job_id = job.id, job_name = %job.name, "Routing pipeline event through its failed job");
        let job_event = Event {
            kind: EventKind::Job,
            project_id: Some(project_id),
            pipeline_id: Some(pipeline_id),
            job_id: Some(job.id),
            job_name: Some(job.name),
            job_stage: job.stage,
            status: JobStatus::Failed,
            commit_sha: event.commit_sha.clone(),
        };
        self.triage_job(&job_event).await
    }

    async fn triage_job(&self, event: &Event) -> (TriageOutcome, TriageDetails) {
        let mut details = TriageDetails::default();

        // Classification: reject incomplete events, filter to monitored
        // jobs, and sample successes before spending any upstream calls.
        let Some(project_id) = event.project_id else {
            return (TriageOutcome::ignored("missing_project_id"), details);
        };
        let Some(job_id) = event.job_id else {
            return (TriageOutcome::ignored("missing_subject_id"), details);
        };
        let subject_id = event.subject_id().unwrap_or(job_id);

        if !monitored(&self.config.monitored_job_names, event.job_name.as_deref())
            || !monitored(&self.config.monitored_stages, event.job_stage.as_deref())
        {
            return (TriageOutcome::ignored("unmonitored_job"), details);
        }

        if !event.status.is_hard_failure() {
            match event.status {
                JobStatus::Success | JobStatus::Running => {
                    if !self.config.success_sampling_enabled {
                        return (TriageOutcome::skipped("success_not_sampled"), details);
                    }
                    let roll: f64 = rand::rng().random();
                    if roll >= self.config.success_sample_rate {
                        return (TriageOutcome::skipped("success_not_sampled"), details);
                    }
                    debug!(project_id, job_id, "Success-path event sampled in");
                }
                _ => return (TriageOutcome::skipped("uninteresting_status"), details),
            }
        }

        // Trace fetch failure is terminal; the host client already owns
        // transport retries.
        let raw_trace = match self.host.job_trace(project_id, job_id).await {
            Ok(trace) => trace,
            Err(e) => {
                warn!(project_id, job_id, error = %e, "Trace fetch failed");
                return (TriageOutcome::failed("failed_to_fetch_trace"), details);
            }
        };
        let sanitized = sanitize_trace(&raw_trace);
        let tail = tail_lines(&sanitized, self.config.max_log_lines);
        let excerpt = display_excerpt(&tail, EXCERPT_EDGE_LINES);

        let commit = event.commit_sha.as_deref().unwrap_or("");
        let evidence = if commit.is_empty() {
            let mut bundle = EvidenceBundle::empty(commit);
            bundle.error = Some("event carried no commit reference".to_string());
            bundle
        } else {
            self.collector.collect(project_id, commit, &tail).await
        };
        if let Some(problem) = &evidence.error {
            debug!(project_id, job_id, problem = %problem, "Evidence collection degraded");
        }

        let job_name = event.job_name.as_deref().unwrap_or("unknown");
        let stage = event.job_stage.as_deref().unwrap_or("unknown");

        // Deterministic classifications skip the model entirely.
        let (analysis, model_used) = if let Some(hit) = evidence.verified_hits().next() {
            info!(project_id, job_id, file = %hit.file, line = hit.line, "Verified secret hit, skipping model");
            let explain = format!(
                "Secret pattern `{}` verified at `{}:{}` at commit {}.",
                hit.pattern, hit.file, hit.line, commit
            );
            (
                AnalysisResult::deterministic(AnalysisResult::HARD_CODED_SECRET, stage, explain),
                false,
            )
        } else if let Some(finding) = evidence.dependency_high.first() {
            info!(project_id, job_id, package = %finding.package, "High dependency finding, skipping model");
            let explain = format!(
                "Dependency `{}` declares `{}` while the latest published version is `{}` ({}).",
                finding.package, finding.installed, finding.latest, finding.reason
            );
            (
                AnalysisResult::deterministic(
                    AnalysisResult::DEPENDENCY_VULNERABILITY,
                    stage,
                    explain,
                ),
                false,
            )
        } else {
            if !event.status.is_hard_failure() {
                match suspicion_signal(&self.config.suspicion, &tail) {
                    Some(signal) => {
                        debug!(project_id, job_id, signal = %signal, "Suspicious success-path log")
                    }
                    None => return (TriageOutcome::skipped("no_suspicious_signals"), details),
                }
            }
            let result = self.analysis.analyze(job_name, stage, &tail, &evidence).await;
            metrics_service::record_model_call(result.root_cause == AnalysisResult::AI_UNAVAILABLE);
            (result, true)
        };

        details.root_cause = Some(analysis.root_cause.clone());
        details.confidence = Some(analysis.confidence);

        // A model file/line claim only counts once re-fetching confirms it.
        let ai_claim_verified = match &analysis.claim {
            Some(claim) if model_used && !commit.is_empty() => {
                let verdict = self.verifier.verify(project_id, claim, commit).await;
                debug!(
                    verified = verdict.verified,
                    reason = %verdict.reason,
                    file = %claim.file,
                    "Claim verification"
                );
                verdict.verified
            }
            _ => false,
        };

        let deterministic_verified = evidence.has_verified_hit() || evidence.has_high_dependency();
        let gating = GatingDecision::evaluate(
            deterministic_verified,
            ai_claim_verified,
            analysis.confidence,
            self.config.min_confidence,
        );

        let fingerprint = derive_fingerprint(
            &FingerprintInputs {
                project_id,
                subject_id,
                commit,
                excerpt: &tail,
            },
            self.config.fingerprint_hmac_key.as_deref(),
        );
        details.fingerprint = Some(fingerprint.clone());

        let ctx = IssueContext {
            project_id,
            subject_id,
            job_name,
            stage,
            commit,
            excerpt: &excerpt,
        };
        match self
            .dedup
            .create_or_append(&ctx, &fingerprint, &evidence, &analysis, &gating)
            .await
        {
            Ok(materialized) => {
                let disposition = match materialized.disposition {
                    IssueDisposition::Created => "created",
                    IssueDisposition::Appended => "appended",
                };
                metrics_service::record_issue_write(disposition);
                let status = if model_used {
                    TerminalStatus::IssueCreatedAi
                } else {
                    TerminalStatus::IssueCreated
                };
                (
                    TriageOutcome {
                        status,
                        reason: None,
                        issue_ref: Some(materialized.issue_ref),
                        deduplicated: materialized.disposition == IssueDisposition::Appended,
                    },
                    details,
                )
            }
            Err(e) => {
                error!(project_id, job_id, error = %e, "Issue materialization failed");
                (
                    TriageOutcome::failed(&format!("issue_creation_failed: {}", e)),
                    details,
                )
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Trace bookkeeping
// ---------------------------------------------------------------------------

/// An empty monitored set admits everything; otherwise the value must be
/// present and match case-insensitively.
fn monitored(set: &[String], value: Option<&str>) -> bool {
    if set.is_empty() {
        return true;
    }
    match value {
        Some(v) => set.iter().any(|entry| entry.eq_ignore_ascii_case(v)),
        None => false,
    }
}

/// Strip ANSI escape sequences and carriage returns from a raw job trace.
/// The pattern is compiled once for the life of the process.
fn sanitize_trace(raw: &str) -> String {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    let ansi = ANSI.get_or_init(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").unwrap());
    ansi.replace_all(raw, "").replace('\r', "")
}

/// Last `max` lines of the text.
fn tail_lines(text: &str, max: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= max {
        return text.to_string();
    }
    lines[lines.len() - max..].join("\n")
}

/// First and last `edge` lines, with an elision marker between.
fn display_excerpt(text: &str, edge: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= edge * 2 {
        return text.to_string();
    }
    let mut out = lines[..edge].join("\n");
    out.push_str("\n[...]\n");
    out.push_str(&lines[lines.len() - edge..].join("\n"));
    out
}

/// Whether a success-path log shows enough to justify a model call:
/// a configured phrase, or warning-tagged lines past the threshold.
fn suspicion_signal(policy: &SuspicionPolicy, tail: &str) -> Option<String> {
    let lower = tail.to_lowercase();
    for phrase in &policy.phrases {
        if lower.contains(&phrase.to_lowercase()) {
            return Some(format!("phrase:{}", phrase));
        }
    }
    let warnings = tail
        .lines()
        .filter(|line| {
            let line = line.to_lowercase();
            line.contains("warning") || line.contains("[warn]") || line.contains("warn:")
        })
        .count();
    if warnings > policy.warning_threshold {
        return Some(format!("warning_lines:{}", warnings));
    }
    None
}
