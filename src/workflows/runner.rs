//! Change detection and retry.
//!
//! A run records the branch head, submits the job and compares the head
//! afterwards. If the branch did not move, the job is submitted once more
//! with extra file hints derived from the first log. A job that fails is
//! never retried; the error goes back to the caller.

use crate::clients::JobRequest;
use crate::error::{AppError, AppResult};
use crate::models::RepoRef;
use crate::services::assist::{merge_hints, suggest_missing_files};
use crate::services::CostExtractor;

use super::WorkflowContext;

/// Job submissions per triggering event
pub const MAX_ATTEMPTS: usize = 2;

/// What to run and where
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub repo: RepoRef,
    pub branch: String,
    pub prompt: String,
    pub file_hints: Vec<String>,
}

/// One completed job submission
#[derive(Debug, Clone)]
pub struct Attempt {
    pub log: String,
    pub cost: f64,
    pub file_hints: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Whether the branch head moved past its starting commit
    pub changed: bool,
    pub attempts: Vec<Attempt>,
}

impl RunOutcome {
    pub fn total_cost(&self) -> f64 {
        self.attempts.iter().map(|a| a.cost).sum()
    }

    /// Log of the most recent attempt
    pub fn last_log(&self) -> &str {
        self.attempts.last().map(|a| a.log.as_str()).unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Start,
    RanOnce,
    Retrying,
    Done,
}

pub async fn run_until_changed(ctx: &WorkflowContext, spec: &JobSpec) -> AppResult<RunOutcome> {
    let repo_name = spec.repo.full_name();
    let before = ctx
        .vcs
        .branch_sha(&spec.repo, &spec.branch)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Branch {} not found in {}", spec.branch, repo_name))
        })?;

    let costs = CostExtractor::new(ctx.llm.clone());
    let mut attempts: Vec<Attempt> = Vec::with_capacity(MAX_ATTEMPTS);
    let mut hints = spec.file_hints.clone();
    let mut state = RunState::Start;
    let mut changed = false;

    while state != RunState::Done {
        let request = JobRequest {
            prompt: spec.prompt.clone(),
            clone_url: ctx.vcs.clone_url(&spec.repo).await?,
            branch: spec.branch.clone(),
            file_hints: hints.clone(),
        };

        log::info!(
            "Running job {}/{} on {}:{} (state {:?})",
            attempts.len() + 1,
            MAX_ATTEMPTS,
            repo_name,
            spec.branch,
            state
        );
        let log_text = ctx.jobs.run(&request).await?;
        let cost = costs.extract_cost(&log_text).await;

        let after = ctx.vcs.branch_sha(&spec.repo, &spec.branch).await?;
        changed = after.as_deref().is_some_and(|sha| sha != before);
        attempts.push(Attempt {
            log: log_text,
            cost,
            file_hints: hints.clone(),
        });

        state = match (state, changed) {
            (_, true) => RunState::Done,
            (RunState::Start, false) => RunState::RanOnce,
            (_, false) => RunState::Done,
        };

        if state == RunState::RanOnce {
            log::info!(
                "Branch {} unchanged after first run, retrying with file hints",
                spec.branch
            );
            let first_log = attempts.last().map(|a| a.log.as_str()).unwrap_or("");
            let extra = suggest_missing_files(ctx.llm.as_ref(), &spec.prompt, first_log).await;
            hints = merge_hints(&hints, extra);
            state = RunState::Retrying;
        }
    }

    if !changed {
        log::warn!(
            "Branch {} unchanged after {} attempts",
            spec.branch,
            attempts.len()
        );
    }

    Ok(RunOutcome { changed, attempts })
}
