//! In-memory collaborators
//!
//! Stand-ins for GitHub, the job service, the LLM and the stores so the
//! workflows can be driven end to end without a network.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use patchwright::clients::{
    JobRequest, JobRunner, NewPullRequest, PullRequestHandle, ReviewComment,
    SubscriptionProvider, TextCompleter, VcsClient, VcsProvider,
};
use patchwright::config::WorkflowConfig;
use patchwright::error::{AppError, AppResult};
use patchwright::models::usage::sanitize_cost;
use patchwright::models::{
    Account, InstallationUsage, PullRequestUsage, RepoRef, Session, Subscription,
};
use patchwright::services::{
    AccountStore, EntitlementResolver, PgAccountStore, PgUsageStore, UsageStore,
};
use patchwright::state::AppState;
use patchwright::workflows::WorkflowContext;
use sqlx::PgPool;

// =============================================================================
// Usage store
// =============================================================================

#[derive(Default)]
pub struct MemoryUsageStore {
    records: Mutex<HashMap<(i64, String), InstallationUsage>>,
}

impl MemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a cycle, `None` if it was never touched
    pub fn record(&self, installation_id: i64, cycle_key: &str) -> Option<InstallationUsage> {
        self.records
            .lock()
            .unwrap()
            .get(&(installation_id, cycle_key.to_string()))
            .cloned()
    }

    /// Seeds `count` pull requests into a cycle
    pub fn seed_pull_requests(&self, installation_id: i64, cycle_key: &str, count: usize) {
        let mut records = self.records.lock().unwrap();
        let record = records
            .entry((installation_id, cycle_key.to_string()))
            .or_insert_with(|| empty_usage(installation_id, cycle_key));
        for _ in 0..count {
            let number = record.pull_requests.len() as i64 + 1000;
            record.pull_requests.push(PullRequestUsage {
                repository: "seed/repo".to_string(),
                number,
                created_at: Utc::now(),
                cost: 0.0,
                sessions: vec![],
            });
        }
    }
}

fn empty_usage(installation_id: i64, cycle_key: &str) -> InstallationUsage {
    InstallationUsage {
        installation_id,
        cycle_key: cycle_key.to_string(),
        created_at: Utc::now(),
        pull_requests: vec![],
    }
}

#[async_trait]
impl UsageStore for MemoryUsageStore {
    async fn get_or_create(
        &self,
        installation_id: i64,
        cycle_key: &str,
    ) -> AppResult<InstallationUsage> {
        let mut records = self.records.lock().unwrap();
        Ok(records
            .entry((installation_id, cycle_key.to_string()))
            .or_insert_with(|| empty_usage(installation_id, cycle_key))
            .clone())
    }

    async fn append_pull_request(
        &self,
        installation_id: i64,
        cycle_key: &str,
        repository: &str,
        number: i64,
        initial_cost: f64,
    ) -> AppResult<()> {
        let cost = sanitize_cost(initial_cost);
        let session = Session {
            timestamp: Utc::now(),
            cost,
        };
        let mut records = self.records.lock().unwrap();
        let record = records
            .entry((installation_id, cycle_key.to_string()))
            .or_insert_with(|| empty_usage(installation_id, cycle_key));

        match record
            .pull_requests
            .iter_mut()
            .find(|pr| pr.number == number && pr.repository == repository)
        {
            Some(existing) => {
                existing.cost += cost;
                existing.sessions.push(session);
            }
            None => record.pull_requests.push(PullRequestUsage {
                repository: repository.to_string(),
                number,
                created_at: Utc::now(),
                cost,
                sessions: vec![session],
            }),
        }
        Ok(())
    }

    async fn append_session(
        &self,
        installation_id: i64,
        cycle_key: &str,
        repository: &str,
        number: i64,
        cost: f64,
    ) -> AppResult<bool> {
        let cost = sanitize_cost(cost);
        let mut records = self.records.lock().unwrap();
        let Some(record) = records.get_mut(&(installation_id, cycle_key.to_string())) else {
            return Ok(false);
        };
        let Some(pr) = record
            .pull_requests
            .iter_mut()
            .find(|pr| pr.number == number && pr.repository == repository)
        else {
            return Ok(false);
        };
        pr.cost += cost;
        pr.sessions.push(Session {
            timestamp: Utc::now(),
            cost,
        });
        Ok(true)
    }
}

// =============================================================================
// Account store and billing
// =============================================================================

#[derive(Default)]
pub struct MemoryAccountStore {
    enterprise: Mutex<HashSet<String>>,
    cohort: Mutex<Vec<String>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_enterprise(&self, login: &str) {
        self.enterprise
            .lock()
            .unwrap()
            .insert(login.to_ascii_lowercase());
    }

    /// Fills the cohort with `count` placeholder members
    pub fn fill_cohort(&self, count: usize) {
        let mut cohort = self.cohort.lock().unwrap();
        for i in 0..count {
            cohort.push(format!("member-{}", i));
        }
    }

    pub fn is_member(&self, login: &str) -> bool {
        self.cohort
            .lock()
            .unwrap()
            .contains(&login.to_ascii_lowercase())
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn is_enterprise(&self, login: &str) -> AppResult<bool> {
        Ok(self
            .enterprise
            .lock()
            .unwrap()
            .contains(&login.to_ascii_lowercase()))
    }

    async fn register_promotion(&self, login: &str, capacity: i64) -> AppResult<bool> {
        let login = login.to_ascii_lowercase();
        let mut cohort = self.cohort.lock().unwrap();
        if cohort.contains(&login) {
            return Ok(true);
        }
        if cohort.len() as i64 >= capacity {
            return Ok(false);
        }
        cohort.push(login);
        Ok(true)
    }

    async fn promotion_count(&self) -> AppResult<i64> {
        Ok(self.cohort.lock().unwrap().len() as i64)
    }
}

#[derive(Default)]
pub struct FakeSubscriptions {
    plan: Mutex<Option<Subscription>>,
    failing: Mutex<bool>,
    lookups: AtomicUsize,
}

impl FakeSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_plan(&self, plan: Subscription) {
        *self.plan.lock().unwrap() = Some(plan);
    }

    /// Makes every lookup error out
    pub fn fail(&self) {
        *self.failing.lock().unwrap() = true;
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubscriptionProvider for FakeSubscriptions {
    async fn subscription_for(&self, _account: &Account) -> AppResult<Option<Subscription>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if *self.failing.lock().unwrap() {
            return Err(AppError::Upstream("marketplace unavailable".to_string()));
        }
        Ok(self.plan.lock().unwrap().clone())
    }
}

// =============================================================================
// VCS platform
// =============================================================================

#[derive(Default)]
struct VcsState {
    branches: HashMap<String, String>,
    created_branches: Vec<(String, String)>,
    comments: Vec<(u64, String)>,
    removed_labels: Vec<(u64, String)>,
    pull_requests: Vec<NewPullRequest>,
    open_pull_request: Option<PullRequestHandle>,
    reviewers: Vec<(u64, Vec<String>)>,
    closed_issues: Vec<u64>,
    labels: Vec<(RepoRef, String)>,
    review_comments: Vec<ReviewComment>,
    failing_label_repos: HashSet<String>,
    fail_review_comments: bool,
    fail_create_pull_request: bool,
    commits: usize,
    token_rotations: usize,
}

/// Records every call; branches are a name to head-sha map
pub struct FakeVcs {
    state: Mutex<VcsState>,
}

impl Default for FakeVcs {
    fn default() -> Self {
        let mut state = VcsState::default();
        state
            .branches
            .insert("main".to_string(), "sha-main".to_string());
        Self {
            state: Mutex::new(state),
        }
    }
}

impl FakeVcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_branch(self, branch: &str, sha: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .branches
            .insert(branch.to_string(), sha.to_string());
        self
    }

    /// Simulates a push to `branch`
    pub fn advance_branch(&self, branch: &str) {
        let mut state = self.state.lock().unwrap();
        state.commits += 1;
        let sha = format!("sha-commit-{}", state.commits);
        state.branches.insert(branch.to_string(), sha);
    }

    /// Replaces the installation token, as when the old one expires
    pub fn rotate_token(&self) {
        self.state.lock().unwrap().token_rotations += 1;
    }

    pub fn set_open_pull_request(&self, number: u64) {
        self.state.lock().unwrap().open_pull_request = Some(PullRequestHandle {
            number,
            html_url: format!("https://github.com/octo/api/pull/{}", number),
        });
    }

    pub fn set_review_comments(&self, comments: Vec<ReviewComment>) {
        self.state.lock().unwrap().review_comments = comments;
    }

    pub fn fail_review_comments(&self) {
        self.state.lock().unwrap().fail_review_comments = true;
    }

    pub fn fail_create_pull_request(&self) {
        self.state.lock().unwrap().fail_create_pull_request = true;
    }

    pub fn fail_labels_in(&self, repo: &RepoRef) {
        self.state
            .lock()
            .unwrap()
            .failing_label_repos
            .insert(repo.full_name());
    }

    pub fn head(&self, branch: &str) -> Option<String> {
        self.state.lock().unwrap().branches.get(branch).cloned()
    }

    pub fn created_branches(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().created_branches.clone()
    }

    pub fn comments(&self) -> Vec<(u64, String)> {
        self.state.lock().unwrap().comments.clone()
    }

    pub fn comments_on(&self, number: u64) -> Vec<String> {
        self.comments()
            .into_iter()
            .filter(|(n, _)| *n == number)
            .map(|(_, body)| body)
            .collect()
    }

    pub fn removed_labels(&self) -> Vec<(u64, String)> {
        self.state.lock().unwrap().removed_labels.clone()
    }

    pub fn pull_requests(&self) -> Vec<NewPullRequest> {
        self.state.lock().unwrap().pull_requests.clone()
    }

    pub fn reviewers(&self) -> Vec<(u64, Vec<String>)> {
        self.state.lock().unwrap().reviewers.clone()
    }

    pub fn closed_issues(&self) -> Vec<u64> {
        self.state.lock().unwrap().closed_issues.clone()
    }

    pub fn labels(&self) -> Vec<(RepoRef, String)> {
        self.state.lock().unwrap().labels.clone()
    }
}

#[async_trait]
impl VcsClient for FakeVcs {
    async fn branch_sha(&self, _repo: &RepoRef, branch: &str) -> AppResult<Option<String>> {
        Ok(self.state.lock().unwrap().branches.get(branch).cloned())
    }

    async fn create_branch(&self, _repo: &RepoRef, branch: &str, from_sha: &str) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .branches
            .insert(branch.to_string(), from_sha.to_string());
        state
            .created_branches
            .push((branch.to_string(), from_sha.to_string()));
        Ok(())
    }

    async fn find_open_pull_request(
        &self,
        _repo: &RepoRef,
        _head: &str,
    ) -> AppResult<Option<PullRequestHandle>> {
        Ok(self.state.lock().unwrap().open_pull_request.clone())
    }

    async fn create_pull_request(
        &self,
        _repo: &RepoRef,
        pull_request: &NewPullRequest,
    ) -> AppResult<PullRequestHandle> {
        let mut state = self.state.lock().unwrap();
        if state.fail_create_pull_request {
            return Err(AppError::Upstream("GitHub create pull request failed".to_string()));
        }
        state.pull_requests.push(pull_request.clone());
        let number = 100 + state.pull_requests.len() as u64;
        Ok(PullRequestHandle {
            number,
            html_url: format!("https://github.com/octo/api/pull/{}", number),
        })
    }

    async fn request_reviewers(
        &self,
        _repo: &RepoRef,
        pull_number: u64,
        reviewers: &[String],
    ) -> AppResult<()> {
        self.state
            .lock()
            .unwrap()
            .reviewers
            .push((pull_number, reviewers.to_vec()));
        Ok(())
    }

    async fn post_comment(&self, _repo: &RepoRef, number: u64, body: &str) -> AppResult<()> {
        self.state
            .lock()
            .unwrap()
            .comments
            .push((number, body.to_string()));
        Ok(())
    }

    async fn remove_label(&self, _repo: &RepoRef, number: u64, label: &str) -> AppResult<()> {
        self.state
            .lock()
            .unwrap()
            .removed_labels
            .push((number, label.to_string()));
        Ok(())
    }

    async fn close_issue(&self, _repo: &RepoRef, number: u64) -> AppResult<()> {
        self.state.lock().unwrap().closed_issues.push(number);
        Ok(())
    }

    async fn ensure_label(
        &self,
        repo: &RepoRef,
        name: &str,
        _color: &str,
        _description: &str,
    ) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.failing_label_repos.contains(&repo.full_name()) {
            return Err(AppError::Upstream("GitHub create label failed".to_string()));
        }
        state.labels.push((repo.clone(), name.to_string()));
        Ok(())
    }

    async fn review_comments(
        &self,
        _repo: &RepoRef,
        _pull_number: u64,
        _review_id: u64,
    ) -> AppResult<Vec<ReviewComment>> {
        let state = self.state.lock().unwrap();
        if state.fail_review_comments {
            return Err(AppError::Upstream("GitHub list review comments failed".to_string()));
        }
        Ok(state.review_comments.clone())
    }

    async fn clone_url(&self, repo: &RepoRef) -> AppResult<String> {
        let token = match self.state.lock().unwrap().token_rotations {
            0 => "test-token".to_string(),
            n => format!("test-token-{}", n),
        };
        Ok(format!(
            "https://x-access-token:{}@github.com/{}/{}.git",
            token, repo.owner, repo.name
        ))
    }
}

/// Hands out the same fake client for every installation
pub struct FakeVcsProvider {
    pub client: Arc<FakeVcs>,
    pub fail: bool,
}

#[async_trait]
impl VcsProvider for FakeVcsProvider {
    async fn for_installation(&self, installation_id: i64) -> AppResult<Arc<dyn VcsClient>> {
        if self.fail {
            return Err(AppError::Upstream(format!(
                "no token for installation {}",
                installation_id
            )));
        }
        Ok(self.client.clone())
    }
}

// =============================================================================
// Job runner
// =============================================================================

/// What the next job submission does
#[derive(Debug, Clone)]
pub enum JobStep {
    /// Pushes a commit to the job's branch and returns the log
    Commit(String),
    /// Returns the log without touching the branch
    NoCommit(String),
    /// Like `NoCommit`, but the installation token expires while the job runs
    NoCommitTokenExpired(String),
    /// The job infrastructure fails
    Fail(String),
}

pub struct FakeJobRunner {
    vcs: Arc<FakeVcs>,
    steps: Mutex<VecDeque<JobStep>>,
    requests: Mutex<Vec<JobRequest>>,
}

impl FakeJobRunner {
    pub fn new(vcs: Arc<FakeVcs>) -> Self {
        Self {
            vcs,
            steps: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, step: JobStep) {
        self.steps.lock().unwrap().push_back(step);
    }

    pub fn requests(&self) -> Vec<JobRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl JobRunner for FakeJobRunner {
    async fn run(&self, request: &JobRequest) -> AppResult<String> {
        self.requests.lock().unwrap().push(request.clone());
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| JobStep::NoCommit(String::new()));
        match step {
            JobStep::Commit(log) => {
                self.vcs.advance_branch(&request.branch);
                Ok(log)
            }
            JobStep::NoCommit(log) => Ok(log),
            JobStep::NoCommitTokenExpired(log) => {
                self.vcs.rotate_token();
                Ok(log)
            }
            JobStep::Fail(message) => Err(AppError::Job(message)),
        }
    }
}

// =============================================================================
// LLM
// =============================================================================

type Responder = Box<dyn Fn(&str, &str) -> AppResult<String> + Send + Sync>;

/// Answers each prompt through a closure and counts calls
pub struct FakeLlm {
    responder: Responder,
    prompts: Mutex<Vec<(String, String)>>,
}

impl FakeLlm {
    pub fn new(responder: impl Fn(&str, &str) -> AppResult<String> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Same reply to every prompt
    pub fn replying(reply: &str) -> Self {
        let reply = reply.to_string();
        Self::new(move |_, _| Ok(reply.clone()))
    }

    /// Every call errors out
    pub fn failing() -> Self {
        Self::new(|_, _| Err(AppError::Upstream("LLM returned HTTP 529".to_string())))
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextCompleter for FakeLlm {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> AppResult<String> {
        self.prompts
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), user_prompt.to_string()));
        (self.responder)(system_prompt, user_prompt)
    }
}

// =============================================================================
// Wiring
// =============================================================================

/// A workflow context whose collaborators can be inspected afterwards
pub struct Harness {
    pub vcs: Arc<FakeVcs>,
    pub jobs: Arc<FakeJobRunner>,
    pub llm: Arc<FakeLlm>,
    pub usage: Arc<MemoryUsageStore>,
    pub accounts: Arc<MemoryAccountStore>,
    pub subscriptions: Arc<FakeSubscriptions>,
    pub settings: WorkflowConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_llm(FakeLlm::failing())
    }

    pub fn with_llm(llm: FakeLlm) -> Self {
        let vcs = Arc::new(FakeVcs::new());
        Self {
            jobs: Arc::new(FakeJobRunner::new(vcs.clone())),
            vcs,
            llm: Arc::new(llm),
            usage: Arc::new(MemoryUsageStore::new()),
            accounts: Arc::new(MemoryAccountStore::new()),
            subscriptions: Arc::new(FakeSubscriptions::new()),
            settings: WorkflowConfig::default(),
        }
    }

    pub fn resolver(&self) -> EntitlementResolver {
        EntitlementResolver::new(self.accounts.clone(), self.subscriptions.clone())
    }

    pub fn context(&self) -> WorkflowContext {
        WorkflowContext {
            vcs: self.vcs.clone(),
            jobs: self.jobs.clone(),
            llm: self.llm.clone(),
            usage: self.usage.clone(),
            entitlements: Arc::new(self.resolver()),
            settings: self.settings.clone(),
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Server state over a real database with fake outbound collaborators
pub fn app_state(pool: PgPool, webhook_secret: Option<&str>) -> (AppState, Arc<FakeVcs>) {
    let vcs = Arc::new(FakeVcs::new());
    let entitlements = EntitlementResolver::new(
        Arc::new(PgAccountStore::new(pool.clone())),
        Arc::new(FakeSubscriptions::new()),
    );
    let state = AppState {
        pool: pool.clone(),
        webhook_secret: webhook_secret.map(str::to_string),
        workflow: WorkflowConfig::default(),
        vcs: Arc::new(FakeVcsProvider {
            client: vcs.clone(),
            fail: false,
        }),
        jobs: Arc::new(FakeJobRunner::new(vcs.clone())),
        llm: Arc::new(FakeLlm::failing()),
        usage: Arc::new(PgUsageStore::new(pool)),
        entitlements: Arc::new(entitlements),
    };
    (state, vcs)
}
