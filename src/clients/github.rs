//! GitHub REST client.
//!
//! [`GithubApp`] authenticates as the app (RS256 JWT) to mint installation
//! tokens and to read marketplace plans. [`InstallationClient`] implements
//! [`VcsClient`] and asks its [`TokenSource`] for a token on every request, so
//! runs that outlive one installation token keep working.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use super::{
    NewPullRequest, PullRequestHandle, ReviewComment, SubscriptionProvider, VcsClient,
    VcsProvider,
};
use crate::config::GithubConfig;
use crate::error::{AppError, AppResult};
use crate::models::entitlement::first_day_of_next_month;
use crate::models::{Account, RepoRef, Subscription};

/// Installation tokens live for an hour; refresh a little early
const TOKEN_REFRESH_MARGIN_SECS: i64 = 300;

// =============================================================================
// Tokens
// =============================================================================

/// Supplies a bearer token that is valid at the time of the call
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> AppResult<String>;
}

/// A token minted elsewhere and used as is
#[async_trait]
impl TokenSource for String {
    async fn token(&self) -> AppResult<String> {
        Ok(self.clone())
    }
}

/// Installation token minted on demand from the app credentials
struct InstallationToken {
    auth: Arc<AppAuth>,
    installation_id: i64,
}

#[async_trait]
impl TokenSource for InstallationToken {
    async fn token(&self) -> AppResult<String> {
        self.auth.installation_token(self.installation_id).await
    }
}

// =============================================================================
// App-level client
// =============================================================================

pub struct GithubApp {
    http: reqwest::Client,
    api_url: String,
    web_host: String,
    auth: Arc<AppAuth>,
}

/// App credentials and the per-installation token cache
struct AppAuth {
    http: reqwest::Client,
    api_url: String,
    app_id: u64,
    key: EncodingKey,
    tokens: Mutex<HashMap<i64, CachedToken>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

impl GithubApp {
    pub fn new(config: &GithubConfig) -> AppResult<Self> {
        let key = EncodingKey::from_rsa_pem(config.private_key.as_bytes())
            .map_err(|e| AppError::Internal(format!("Invalid GitHub App private key: {}", e)))?;
        let http = build_http_client()?;
        let api_url = config.api_url.trim_end_matches('/').to_string();

        Ok(Self {
            http: http.clone(),
            api_url: api_url.clone(),
            web_host: web_host(&config.api_url),
            auth: Arc::new(AppAuth {
                http,
                api_url,
                app_id: config.app_id,
                key,
                tokens: Mutex::new(HashMap::new()),
            }),
        })
    }
}

impl AppAuth {
    /// Signs a short-lived JWT identifying the app
    fn app_jwt(&self) -> AppResult<String> {
        let now = Utc::now().timestamp();
        // GitHub rejects tokens issued "in the future"; backdate for clock drift
        let claims = AppClaims {
            iat: now - 60,
            exp: now + 9 * 60,
            iss: self.app_id.to_string(),
        };
        encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|e| AppError::Internal(format!("Failed to sign app JWT: {}", e)))
    }

    async fn installation_token(&self, installation_id: i64) -> AppResult<String> {
        if let Some(cached) = self.cached_token(installation_id) {
            return Ok(cached);
        }

        #[derive(Deserialize)]
        struct AccessToken {
            token: String,
            expires_at: DateTime<Utc>,
        }

        let installation = installation_id.to_string();
        let url = api_endpoint(
            &self.api_url,
            &["app", "installations", &installation, "access_tokens"],
        )?;
        let response = self
            .http
            .post(url)
            .bearer_auth(self.app_jwt()?)
            .send()
            .await?;
        let access: AccessToken = expect_success("create installation token", response)
            .await?
            .json()
            .await?;

        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.insert(
                installation_id,
                CachedToken {
                    token: access.token.clone(),
                    expires_at: access.expires_at,
                },
            );
        }

        log::debug!("Minted access token for installation {}", installation_id);
        Ok(access.token)
    }

    fn cached_token(&self, installation_id: i64) -> Option<String> {
        let tokens = self.tokens.lock().ok()?;
        let cached = tokens.get(&installation_id)?;
        let fresh_until = cached.expires_at - chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);
        (Utc::now() < fresh_until).then(|| cached.token.clone())
    }
}

#[async_trait]
impl VcsProvider for GithubApp {
    async fn for_installation(&self, installation_id: i64) -> AppResult<Arc<dyn VcsClient>> {
        // Fail early when the app cannot act for this installation
        self.auth.installation_token(installation_id).await?;
        Ok(Arc::new(InstallationClient {
            http: self.http.clone(),
            api_url: self.api_url.clone(),
            web_host: self.web_host.clone(),
            tokens: Arc::new(InstallationToken {
                auth: self.auth.clone(),
                installation_id,
            }),
        }))
    }
}

#[async_trait]
impl SubscriptionProvider for GithubApp {
    async fn subscription_for(&self, account: &Account) -> AppResult<Option<Subscription>> {
        #[derive(Deserialize)]
        struct Listing {
            marketplace_purchase: Option<Purchase>,
        }
        #[derive(Deserialize)]
        struct Purchase {
            next_billing_date: Option<DateTime<Utc>>,
            plan: Plan,
        }
        #[derive(Deserialize)]
        struct Plan {
            name: String,
            monthly_price_in_cents: u32,
        }

        let account_id = account.id.to_string();
        let url = api_endpoint(&self.api_url, &["marketplace_listing", "accounts", &account_id])?;
        let response = self
            .http
            .get(url)
            .bearer_auth(self.auth.app_jwt()?)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let listing: Listing = expect_success("get marketplace plan", response)
            .await?
            .json()
            .await?;
        let Some(purchase) = listing.marketplace_purchase else {
            return Ok(None);
        };
        if purchase.plan.monthly_price_in_cents == 0 {
            return Ok(None);
        }

        let renewal_date: NaiveDate = purchase
            .next_billing_date
            .map(|d| d.date_naive())
            .unwrap_or_else(|| first_day_of_next_month(Utc::now().date_naive()));

        Ok(Some(Subscription {
            plan_name: purchase.plan.name,
            monthly_price_in_cents: purchase.plan.monthly_price_in_cents,
            renewal_date,
        }))
    }
}

// =============================================================================
// Installation-scoped client
// =============================================================================

pub struct InstallationClient {
    http: reqwest::Client,
    api_url: String,
    web_host: String,
    tokens: Arc<dyn TokenSource>,
}

impl InstallationClient {
    /// Builds a client for an already minted installation token
    pub fn new(api_url: &str, token: impl Into<String>) -> AppResult<Self> {
        let token: String = token.into();
        Ok(Self {
            http: build_http_client()?,
            api_url: api_url.trim_end_matches('/').to_string(),
            web_host: web_host(api_url),
            tokens: Arc::new(token),
        })
    }

    fn repo_endpoint(&self, repo: &RepoRef, rest: &[&str]) -> AppResult<Url> {
        let mut segments = vec!["repos", repo.owner.as_str(), repo.name.as_str()];
        segments.extend_from_slice(rest);
        api_endpoint(&self.api_url, &segments)
    }

    /// Attaches a token that is current at the time of the request
    async fn authorized(&self, request: reqwest::RequestBuilder) -> AppResult<reqwest::RequestBuilder> {
        Ok(request.bearer_auth(self.tokens.token().await?))
    }

    async fn send(&self, what: &str, request: reqwest::RequestBuilder) -> AppResult<reqwest::Response> {
        let response = self.authorized(request).await?.send().await?;
        expect_success(what, response).await
    }
}

#[derive(Deserialize)]
struct WirePullRequest {
    number: u64,
    html_url: String,
}

impl From<WirePullRequest> for PullRequestHandle {
    fn from(pr: WirePullRequest) -> Self {
        Self {
            number: pr.number,
            html_url: pr.html_url,
        }
    }
}

#[async_trait]
impl VcsClient for InstallationClient {
    async fn branch_sha(&self, repo: &RepoRef, branch: &str) -> AppResult<Option<String>> {
        #[derive(Deserialize)]
        struct GitRef {
            object: GitObject,
        }
        #[derive(Deserialize)]
        struct GitObject {
            sha: String,
        }

        let mut rest = vec!["git", "ref", "heads"];
        rest.extend(branch.split('/'));
        let url = self.repo_endpoint(repo, &rest)?;
        let response = self.authorized(self.http.get(url)).await?.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let git_ref: GitRef = expect_success("get branch", response).await?.json().await?;
        Ok(Some(git_ref.object.sha))
    }

    async fn create_branch(&self, repo: &RepoRef, branch: &str, from_sha: &str) -> AppResult<()> {
        let url = self.repo_endpoint(repo, &["git", "refs"])?;
        let payload = json!({ "ref": format!("refs/heads/{}", branch), "sha": from_sha });
        self.send("create branch", self.http.post(url).json(&payload))
            .await?;
        Ok(())
    }

    async fn find_open_pull_request(
        &self,
        repo: &RepoRef,
        head: &str,
    ) -> AppResult<Option<PullRequestHandle>> {
        let mut url = self.repo_endpoint(repo, &["pulls"])?;
        url.query_pairs_mut()
            .append_pair("head", &format!("{}:{}", repo.owner, head))
            .append_pair("state", "open");
        let pulls: Vec<WirePullRequest> = self
            .send("list pull requests", self.http.get(url))
            .await?
            .json()
            .await?;
        Ok(pulls.into_iter().next().map(PullRequestHandle::from))
    }

    async fn create_pull_request(
        &self,
        repo: &RepoRef,
        pull_request: &NewPullRequest,
    ) -> AppResult<PullRequestHandle> {
        let url = self.repo_endpoint(repo, &["pulls"])?;
        let created: WirePullRequest = self
            .send("create pull request", self.http.post(url).json(pull_request))
            .await?
            .json()
            .await?;
        Ok(created.into())
    }

    async fn request_reviewers(
        &self,
        repo: &RepoRef,
        pull_number: u64,
        reviewers: &[String],
    ) -> AppResult<()> {
        if reviewers.is_empty() {
            return Ok(());
        }
        let number = pull_number.to_string();
        let url = self.repo_endpoint(repo, &["pulls", &number, "requested_reviewers"])?;
        self.send(
            "request reviewers",
            self.http.post(url).json(&json!({ "reviewers": reviewers })),
        )
        .await?;
        Ok(())
    }

    async fn post_comment(&self, repo: &RepoRef, number: u64, body: &str) -> AppResult<()> {
        let number = number.to_string();
        let url = self.repo_endpoint(repo, &["issues", &number, "comments"])?;
        self.send("post comment", self.http.post(url).json(&json!({ "body": body })))
            .await?;
        Ok(())
    }

    async fn remove_label(&self, repo: &RepoRef, number: u64, label: &str) -> AppResult<()> {
        let number = number.to_string();
        let url = self.repo_endpoint(repo, &["issues", &number, "labels", label])?;
        let response = self.authorized(self.http.delete(url)).await?.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        expect_success("remove label", response).await?;
        Ok(())
    }

    async fn close_issue(&self, repo: &RepoRef, number: u64) -> AppResult<()> {
        let number = number.to_string();
        let url = self.repo_endpoint(repo, &["issues", &number])?;
        self.send(
            "close issue",
            self.http
                .patch(url)
                .json(&json!({ "state": "closed", "state_reason": "completed" })),
        )
        .await?;
        Ok(())
    }

    async fn ensure_label(
        &self,
        repo: &RepoRef,
        name: &str,
        color: &str,
        description: &str,
    ) -> AppResult<()> {
        let url = self.repo_endpoint(repo, &["labels"])?;
        let request = self
            .http
            .post(url)
            .json(&json!({ "name": name, "color": color, "description": description }));
        let response = self.authorized(request).await?.send().await?;
        // 422 means the label already exists
        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            return Ok(());
        }
        expect_success("create label", response).await?;
        Ok(())
    }

    async fn review_comments(
        &self,
        repo: &RepoRef,
        pull_number: u64,
        review_id: u64,
    ) -> AppResult<Vec<ReviewComment>> {
        #[derive(Deserialize)]
        struct WireComment {
            path: String,
            line: Option<u64>,
            body: String,
        }

        let number = pull_number.to_string();
        let review = review_id.to_string();
        let url = self.repo_endpoint(repo, &["pulls", &number, "reviews", &review, "comments"])?;
        let comments: Vec<WireComment> = self
            .send("list review comments", self.http.get(url))
            .await?
            .json()
            .await?;

        Ok(comments
            .into_iter()
            .map(|c| ReviewComment {
                path: c.path,
                line: c.line,
                body: c.body,
            })
            .collect())
    }

    async fn clone_url(&self, repo: &RepoRef) -> AppResult<String> {
        Ok(format!(
            "https://x-access-token:{}@{}/{}/{}.git",
            self.tokens.token().await?,
            self.web_host,
            repo.owner,
            repo.name
        ))
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn build_http_client() -> AppResult<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static("patchwright"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
    headers.insert("x-github-api-version", HeaderValue::from_static("2022-11-28"));

    Ok(reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(30))
        .build()?)
}

/// Appends percent-encoded path segments to the API base
fn api_endpoint(api_url: &str, segments: &[&str]) -> AppResult<Url> {
    let mut url = Url::parse(api_url)
        .map_err(|e| AppError::Internal(format!("Invalid GitHub API URL: {}", e)))?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| AppError::Internal("GitHub API URL cannot be a base".to_string()))?;
        path.pop_if_empty().extend(segments);
    }
    Ok(url)
}

/// `api.github.com` clones from `github.com`; GHES serves both on one host
fn web_host(api_url: &str) -> String {
    Url::parse(api_url)
        .ok()
        .and_then(|u| {
            u.host_str()
                .map(|h| h.strip_prefix("api.").unwrap_or(h).to_string())
        })
        .unwrap_or_else(|| "github.com".to_string())
}

async fn expect_success(what: &str, response: reqwest::Response) -> AppResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(300).collect();
    Err(AppError::Upstream(format!(
        "GitHub {} failed: HTTP {}: {}",
        what,
        status.as_u16(),
        body
    )))
}
