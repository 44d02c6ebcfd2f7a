//! Typed webhook events.
//!
//! GitHub payloads are decoded into private wire structs and converted into the
//! small set of events the workflows act on. Anything else is ignored at the
//! boundary.

use serde::Deserialize;

use crate::error::{AppError, AppResult};

/// A repository the app is installed on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parses `owner/name`
    pub fn from_full_name(full_name: &str) -> Option<Self> {
        let (owner, name) = full_name.split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self::new(owner, name))
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// The GitHub account (user or organization) that owns the installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: i64,
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueLabeledEvent {
    pub installation_id: i64,
    pub account: Account,
    pub repo: RepoRef,
    pub default_branch: String,
    pub issue_number: u64,
    pub title: String,
    pub body: String,
    pub label: String,
    /// Login of the user who applied the label
    pub sender: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Commented,
    Other,
}

impl ReviewState {
    fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "approved" => ReviewState::Approved,
            "changes_requested" => ReviewState::ChangesRequested,
            "commented" => ReviewState::Commented,
            _ => ReviewState::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewSubmittedEvent {
    pub installation_id: i64,
    pub account: Account,
    pub repo: RepoRef,
    pub pull_number: u64,
    pub head_branch: String,
    pub review_id: u64,
    pub state: ReviewState,
    pub body: String,
    pub reviewer: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestClosedEvent {
    pub installation_id: i64,
    pub repo: RepoRef,
    pub pull_number: u64,
    pub head_branch: String,
    pub merged: bool,
}

/// App installed, or repositories added to an installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationEvent {
    pub installation_id: i64,
    pub repositories: Vec<RepoRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    IssueLabeled(IssueLabeledEvent),
    ReviewSubmitted(ReviewSubmittedEvent),
    PullRequestClosed(PullRequestClosedEvent),
    Installation(InstallationEvent),
}

impl WebhookEvent {
    pub fn installation_id(&self) -> i64 {
        match self {
            WebhookEvent::IssueLabeled(e) => e.installation_id,
            WebhookEvent::ReviewSubmitted(e) => e.installation_id,
            WebhookEvent::PullRequestClosed(e) => e.installation_id,
            WebhookEvent::Installation(e) => e.installation_id,
        }
    }

    /// Decodes a delivery. Returns `Ok(None)` for events and actions the app
    /// does not handle.
    pub fn parse(event_name: &str, body: &[u8]) -> AppResult<Option<Self>> {
        let event = match event_name {
            "issues" => {
                let payload: IssuesPayload = decode(event_name, body)?;
                if payload.action != "labeled" || payload.issue.pull_request.is_some() {
                    return Ok(None);
                }
                let Some(label) = payload.label else {
                    return Ok(None);
                };
                let repo = payload.repository;
                WebhookEvent::IssueLabeled(IssueLabeledEvent {
                    installation_id: installation_id(payload.installation)?,
                    account: repo.owner.clone().into_account()?,
                    default_branch: repo.default_branch.clone().unwrap_or_else(|| "main".to_string()),
                    repo: repo.into_ref(),
                    issue_number: payload.issue.number,
                    title: payload.issue.title,
                    body: payload.issue.body.unwrap_or_default(),
                    label: label.name,
                    sender: payload.sender.login,
                })
            }
            "pull_request_review" => {
                let payload: ReviewPayload = decode(event_name, body)?;
                if payload.action != "submitted" {
                    return Ok(None);
                }
                let repo = payload.repository;
                WebhookEvent::ReviewSubmitted(ReviewSubmittedEvent {
                    installation_id: installation_id(payload.installation)?,
                    account: repo.owner.clone().into_account()?,
                    repo: repo.into_ref(),
                    pull_number: payload.pull_request.number,
                    head_branch: payload.pull_request.head.branch,
                    review_id: payload.review.id,
                    state: ReviewState::parse(&payload.review.state),
                    body: payload.review.body.unwrap_or_default(),
                    reviewer: payload.review.user.login,
                })
            }
            "pull_request" => {
                let payload: PullRequestPayload = decode(event_name, body)?;
                if payload.action != "closed" {
                    return Ok(None);
                }
                WebhookEvent::PullRequestClosed(PullRequestClosedEvent {
                    installation_id: installation_id(payload.installation)?,
                    repo: payload.repository.into_ref(),
                    pull_number: payload.pull_request.number,
                    head_branch: payload.pull_request.head.branch,
                    merged: payload.pull_request.merged.unwrap_or(false),
                })
            }
            "installation" | "installation_repositories" => {
                let payload: InstallationPayload = decode(event_name, body)?;
                let repositories = match (event_name, payload.action.as_str()) {
                    ("installation", "created") => payload.repositories,
                    ("installation_repositories", "added") => payload.repositories_added,
                    _ => return Ok(None),
                };
                WebhookEvent::Installation(InstallationEvent {
                    installation_id: payload.installation.id,
                    repositories: repositories
                        .iter()
                        .filter_map(|r| RepoRef::from_full_name(&r.full_name))
                        .collect(),
                })
            }
            _ => return Ok(None),
        };

        Ok(Some(event))
    }
}

fn decode<T: for<'de> Deserialize<'de>>(event_name: &str, body: &[u8]) -> AppResult<T> {
    serde_json::from_slice(body)
        .map_err(|e| AppError::Validation(format!("Invalid {} payload: {}", event_name, e)))
}

fn installation_id(installation: Option<WireInstallation>) -> AppResult<i64> {
    installation
        .map(|i| i.id)
        .ok_or_else(|| AppError::Validation("Payload has no installation".to_string()))
}

// =============================================================================
// Wire format
// =============================================================================

#[derive(Deserialize)]
struct IssuesPayload {
    action: String,
    label: Option<WireLabel>,
    issue: WireIssue,
    repository: WireRepository,
    installation: Option<WireInstallation>,
    sender: WireUser,
}

#[derive(Deserialize)]
struct ReviewPayload {
    action: String,
    review: WireReview,
    pull_request: WirePullRequest,
    repository: WireRepository,
    installation: Option<WireInstallation>,
}

#[derive(Deserialize)]
struct PullRequestPayload {
    action: String,
    pull_request: WirePullRequest,
    repository: WireRepository,
    installation: Option<WireInstallation>,
}

#[derive(Deserialize)]
struct InstallationPayload {
    action: String,
    installation: WireInstallation,
    #[serde(default)]
    repositories: Vec<WireRepositorySummary>,
    #[serde(default)]
    repositories_added: Vec<WireRepositorySummary>,
}

#[derive(Deserialize)]
struct WireLabel {
    name: String,
}

#[derive(Deserialize)]
struct WireIssue {
    number: u64,
    title: String,
    body: Option<String>,
    pull_request: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct WireReview {
    id: u64,
    state: String,
    body: Option<String>,
    user: WireUser,
}

#[derive(Deserialize)]
struct WirePullRequest {
    number: u64,
    head: WireRef,
    merged: Option<bool>,
}

#[derive(Deserialize)]
struct WireRef {
    #[serde(rename = "ref")]
    branch: String,
}

#[derive(Deserialize)]
struct WireRepository {
    name: String,
    owner: WireUser,
    default_branch: Option<String>,
}

impl WireRepository {
    fn into_ref(self) -> RepoRef {
        RepoRef::new(self.owner.login, self.name)
    }
}

#[derive(Deserialize)]
struct WireRepositorySummary {
    full_name: String,
}

#[derive(Deserialize, Clone)]
struct WireUser {
    login: String,
    #[serde(default)]
    id: i64,
}

impl WireUser {
    fn into_account(self) -> AppResult<Account> {
        if self.login.trim().is_empty() {
            return Err(AppError::Validation("Account login is empty".to_string()));
        }
        Ok(Account {
            id: self.id,
            login: self.login,
        })
    }
}

#[derive(Deserialize)]
struct WireInstallation {
    id: i64,
}
