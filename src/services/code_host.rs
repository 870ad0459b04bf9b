//! Code host API client.
//!
//! Everything triage needs from the source-control platform sits behind the
//! [`CodeHost`] trait: job listing, trace fetch, file content at a commit,
//! and the issue-tracker writes. The GitLab implementation carries the
//! shared retry policy; callers above it never retry.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

use crate::error::{AppError, Result};
use crate::retry::RetryPolicy;

/// A job as returned by the pipeline listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub id: i64,
    pub name: String,
    pub stage: Option<String>,
    pub status: String,
}

/// An issue as returned by search or creation.
#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub iid: i64,
    pub title: Option<String>,
    pub web_url: Option<String>,
}

/// Operations triage performs against the code host.
#[async_trait]
pub trait CodeHost: Send + Sync {
    /// List all jobs of a pipeline, walking pagination to the end.
    async fn list_pipeline_jobs(&self, project_id: i64, pipeline_id: i64) -> Result<Vec<Job>>;

    /// Fetch the raw log text of a job.
    async fn job_trace(&self, project_id: i64, job_id: i64) -> Result<String>;

    /// Fetch file content at an exact commit. `None` means the file does
    /// not exist at that commit, which is not an error.
    async fn file_at_commit(
        &self,
        project_id: i64,
        path: &str,
        commit: &str,
    ) -> Result<Option<String>>;

    /// Search issues of a project for a literal text.
    async fn search_issues(&self, project_id: i64, text: &str) -> Result<Vec<Issue>>;

    async fn create_issue(
        &self,
        project_id: i64,
        title: &str,
        description: &str,
        labels: &[String],
    ) -> Result<Issue>;

    async fn create_issue_note(&self, project_id: i64, issue_iid: i64, body: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// GitLab implementation
// ---------------------------------------------------------------------------

const TOKEN_HEADER: &str = "PRIVATE-TOKEN";
const PER_PAGE: usize = 100;

/// GitLab REST v4 client.
pub struct GitLabClient {
    client: Client,
    base_url: String,
    token: String,
    retry: RetryPolicy,
}

impl GitLabClient {
    /// `base_url` is the API root, e.g. `https://gitlab.example.com/api/v4`.
    pub fn new(base_url: &str, token: &str, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        info!(url = %base_url, "Code host client initialized");

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            retry,
        })
    }

    /// Map a non-success response to the matching error class, reading the
    /// body into the message for the logs.
    async fn expect_success(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::RateLimited(format!("{}: {}", what, body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                status: status.as_u16(),
                message: format!("{} failed: {} - {}", what, status, body),
            });
        }
        Ok(response)
    }
}

/// GitLab returns repository file content as base64 with embedded newlines.
fn decode_file_content(encoded: &str) -> Result<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| AppError::Internal(format!("Invalid base64 file content: {}", e)))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[derive(Debug, Deserialize)]
struct RepositoryFile {
    content: String,
}

#[async_trait]
impl CodeHost for GitLabClient {
    async fn list_pipeline_jobs(&self, project_id: i64, pipeline_id: i64) -> Result<Vec<Job>> {
        let mut jobs = Vec::new();
        let mut page = 1usize;
        loop {
            let url = format!(
                "{}/projects/{}/pipelines/{}/jobs?per_page={}&page={}",
                self.base_url, project_id, pipeline_id, PER_PAGE, page
            );
            let batch: Vec<Job> = self
                .retry
                .run("list_pipeline_jobs", || async {
                    let response = self
                        .client
                        .get(&url)
                        .header(TOKEN_HEADER, &self.token)
                        .send()
                        .await?;
                    let response = Self::expect_success(response, "pipeline job listing").await?;
                    response.json().await.map_err(AppError::from)
                })
                .await?;

            let batch_len = batch.len();
            jobs.extend(batch);
            if batch_len < PER_PAGE {
                return Ok(jobs);
            }
            page += 1;
        }
    }

    async fn job_trace(&self, project_id: i64, job_id: i64) -> Result<String> {
        let url = format!(
            "{}/projects/{}/jobs/{}/trace",
            self.base_url, project_id, job_id
        );
        self.retry
            .run("job_trace", || async {
                let response = self
                    .client
                    .get(&url)
                    .header(TOKEN_HEADER, &self.token)
                    .send()
                    .await?;
                let response = Self::expect_success(response, "job trace fetch").await?;
                response.text().await.map_err(AppError::from)
            })
            .await
    }

    async fn file_at_commit(
        &self,
        project_id: i64,
        path: &str,
        commit: &str,
    ) -> Result<Option<String>> {
        let url = format!(
            "{}/projects/{}/repository/files/{}?ref={}",
            self.base_url,
            project_id,
            urlencoding::encode(path),
            urlencoding::encode(commit)
        );
        let file: Option<RepositoryFile> = self
            .retry
            .run("file_at_commit", || async {
                let response = self
                    .client
                    .get(&url)
                    .header(TOKEN_HEADER, &self.token)
                    .send()
                    .await?;
                if response.status() == StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                let response = Self::expect_success(response, "file fetch").await?;
                response.json().await.map(Some).map_err(AppError::from)
            })
            .await?;

        match file {
            Some(file) => Ok(Some(decode_file_content(&file.content)?)),
            None => Ok(None),
        }
    }

    async fn search_issues(&self, project_id: i64, text: &str) -> Result<Vec<Issue>> {
        let url = format!(
            "{}/projects/{}/issues?search={}&in=description&state=all&per_page=20",
            self.base_url,
            project_id,
            urlencoding::encode(text)
        );
        self.retry
            .run("search_issues", || async {
                let response = self
                    .client
                    .get(&url)
                    .header(TOKEN_HEADER, &self.token)
                    .send()
                    .await?;
                let response = Self::expect_success(response, "issue search").await?;
                response.json().await.map_err(AppError::from)
            })
            .await
    }

    async fn create_issue(
        &self,
        project_id: i64,
        title: &str,
        description: &str,
        labels: &[String],
    ) -> Result<Issue> {
        let url = format!("{}/projects/{}/issues", self.base_url, project_id);
        let body = serde_json::json!({
            "title": title,
            "description": description,
            "labels": labels.join(","),
        });
        let issue: Issue = self
            .retry
            .run("create_issue", || async {
                let response = self
                    .client
                    .post(&url)
                    .header(TOKEN_HEADER, &self.token)
                    .json(&body)
                    .send()
                    .await?;
                let response = Self::expect_success(response, "issue creation").await?;
                response.json().await.map_err(AppError::from)
            })
            .await?;

        info!(project_id, issue_iid = issue.iid, "Created issue");
        Ok(issue)
    }

    async fn create_issue_note(&self, project_id: i64, issue_iid: i64, body: &str) -> Result<()> {
        let url = format!(
            "{}/projects/{}/issues/{}/notes",
            self.base_url, project_id, issue_iid
        );
        let payload = serde_json::json!({ "body": body });
        self.retry
            .run("create_issue_note", || async {
                let response = self
                    .client
                    .post(&url)
                    .header(TOKEN_HEADER, &self.token)
                    .json(&payload)
                    .send()
                    .await?;
                Self::expect_success(response, "issue note creation").await?;
                Ok(())
            })
            .await
    }
}
