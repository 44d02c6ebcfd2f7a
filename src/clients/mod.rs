//! Outbound collaborators.
//!
//! The workflows only see these traits; `github`, `job_runner` and `anthropic`
//! hold the HTTP implementations used in production.

pub mod anthropic;
pub mod github;
pub mod job_runner;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::AppResult;
use crate::models::{Account, RepoRef, Subscription};

pub use anthropic::AnthropicCompleter;
pub use github::{GithubApp, InstallationClient, TokenSource};
pub use job_runner::HttpJobRunner;

// =============================================================================
// VCS platform
// =============================================================================

/// A pull request as returned by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestHandle {
    pub number: u64,
    pub html_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewPullRequest {
    pub title: String,
    /// Branch with the changes
    pub head: String,
    /// Branch to merge into
    pub base: String,
    pub body: String,
}

/// An inline comment left as part of a review
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewComment {
    pub path: String,
    pub line: Option<u64>,
    pub body: String,
}

/// Installation-scoped access to a VCS platform
#[async_trait]
pub trait VcsClient: Send + Sync {
    /// Head commit of a branch, `None` when the branch does not exist
    async fn branch_sha(&self, repo: &RepoRef, branch: &str) -> AppResult<Option<String>>;

    async fn create_branch(&self, repo: &RepoRef, branch: &str, from_sha: &str) -> AppResult<()>;

    async fn find_open_pull_request(
        &self,
        repo: &RepoRef,
        head: &str,
    ) -> AppResult<Option<PullRequestHandle>>;

    async fn create_pull_request(
        &self,
        repo: &RepoRef,
        pull_request: &NewPullRequest,
    ) -> AppResult<PullRequestHandle>;

    async fn request_reviewers(
        &self,
        repo: &RepoRef,
        pull_number: u64,
        reviewers: &[String],
    ) -> AppResult<()>;

    /// Comments on an issue or pull request
    async fn post_comment(&self, repo: &RepoRef, number: u64, body: &str) -> AppResult<()>;

    /// Removing a label that is not present succeeds
    async fn remove_label(&self, repo: &RepoRef, number: u64, label: &str) -> AppResult<()>;

    async fn close_issue(&self, repo: &RepoRef, number: u64) -> AppResult<()>;

    /// Creates the label unless it already exists
    async fn ensure_label(
        &self,
        repo: &RepoRef,
        name: &str,
        color: &str,
        description: &str,
    ) -> AppResult<()>;

    async fn review_comments(
        &self,
        repo: &RepoRef,
        pull_number: u64,
        review_id: u64,
    ) -> AppResult<Vec<ReviewComment>>;

    /// Clone URL carrying credentials that are valid right now
    async fn clone_url(&self, repo: &RepoRef) -> AppResult<String>;
}

/// Hands out installation-scoped clients
#[async_trait]
pub trait VcsProvider: Send + Sync {
    async fn for_installation(&self, installation_id: i64) -> AppResult<Arc<dyn VcsClient>>;
}

/// Billing provider that knows about paid plans
#[async_trait]
pub trait SubscriptionProvider: Send + Sync {
    /// Active paid plan for the account, if any
    async fn subscription_for(&self, account: &Account) -> AppResult<Option<Subscription>>;
}

// =============================================================================
// Job runner
// =============================================================================

/// One execution of the coding agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRequest {
    pub prompt: String,
    #[serde(rename = "repository_url")]
    pub clone_url: String,
    pub branch: String,
    #[serde(rename = "files")]
    pub file_hints: Vec<String>,
}

/// Submits a job and blocks until it finishes. One attempt per call; any
/// error means the job infrastructure failed.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Returns the combined log output of the job
    async fn run(&self, request: &JobRequest) -> AppResult<String>;
}

// =============================================================================
// LLM
// =============================================================================

/// Single-turn text completion. Callers must tolerate errors and empty output.
#[async_trait]
pub trait TextCompleter: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> AppResult<String>;
}
