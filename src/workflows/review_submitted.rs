//! Changes requested on an app-authored pull request: run again on its branch.
//!
//! Review runs need an entitlement but do not consume quota, which is counted
//! in pull requests. Every attempt is billed as a session of the PR.

use crate::error::AppResult;
use crate::models::{ReviewState, ReviewSubmittedEvent};

use super::failure::report_failure;
use super::runner::{run_until_changed, JobSpec, RunOutcome};
use super::{lifecycle, messages, WorkflowContext};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewOutcome {
    /// Not a change request, or not a branch the app created
    Ignored,
    NotEntitled,
    NoChanges,
    Addressed,
    Failed,
}

pub async fn handle(ctx: &WorkflowContext, event: &ReviewSubmittedEvent) -> ReviewOutcome {
    if event.state != ReviewState::ChangesRequested {
        return ReviewOutcome::Ignored;
    }
    if lifecycle::parse_issue_branch(&ctx.settings.branch_prefix, &event.head_branch).is_none() {
        log::debug!(
            "Ignoring review on {}: branch {} was not created by the app",
            event.repo.full_name(),
            event.head_branch
        );
        return ReviewOutcome::Ignored;
    }

    match run(ctx, event).await {
        Ok(outcome) => outcome,
        Err(e) => {
            report_failure(ctx.vcs.as_ref(), &event.repo, event.pull_number, None, &e).await;
            ReviewOutcome::Failed
        }
    }
}

async fn run(ctx: &WorkflowContext, event: &ReviewSubmittedEvent) -> AppResult<ReviewOutcome> {
    let vcs = ctx.vcs.as_ref();
    let repo = &event.repo;
    let number = event.pull_number;

    let entitlement = ctx.entitlements.resolve(&event.account).await?;
    let Some(cycle_key) = entitlement.cycle_key() else {
        if let Err(e) = vcs
            .post_comment(repo, number, &messages::review_not_entitled(&event.account.login))
            .await
        {
            log::warn!("Could not post denial on {}#{}: {}", repo.full_name(), number, e);
        }
        return Ok(ReviewOutcome::NotEntitled);
    };

    let comments = match vcs.review_comments(repo, number, event.review_id).await {
        Ok(comments) => comments,
        Err(e) => {
            log::warn!("Could not load review comments, using review body only: {}", e);
            Vec::new()
        }
    };

    let spec = JobSpec {
        repo: repo.clone(),
        branch: event.head_branch.clone(),
        prompt: messages::review_prompt(&event.body, &comments),
        file_hints: messages::review_file_hints(&comments),
    };
    let outcome = run_until_changed(ctx, &spec).await?;
    record_sessions(ctx, event, &cycle_key, &outcome).await;

    if !outcome.changed {
        if let Err(e) = vcs
            .post_comment(repo, number, &messages::review_no_changes())
            .await
        {
            log::warn!("Could not post no-change notice on {}#{}: {}", repo.full_name(), number, e);
        }
        return Ok(ReviewOutcome::NoChanges);
    }

    if let Err(e) = vcs
        .request_reviewers(repo, number, &[event.reviewer.clone()])
        .await
    {
        log::warn!("Could not re-request review from {}: {}", event.reviewer, e);
    }
    if let Err(e) = vcs
        .post_comment(repo, number, &messages::review_addressed(&event.reviewer))
        .await
    {
        log::warn!("Could not comment on {}#{}: {}", repo.full_name(), number, e);
    }

    Ok(ReviewOutcome::Addressed)
}

async fn record_sessions(
    ctx: &WorkflowContext,
    event: &ReviewSubmittedEvent,
    cycle_key: &str,
    outcome: &RunOutcome,
) {
    let repository = event.repo.full_name();
    for attempt in &outcome.attempts {
        match ctx
            .usage
            .append_session(
                event.installation_id,
                cycle_key,
                &repository,
                event.pull_number as i64,
                attempt.cost,
            )
            .await
        {
            Ok(true) => {}
            Ok(false) => log::warn!(
                "{}#{} is not recorded in cycle {}, review session of ${:.4} dropped",
                repository,
                event.pull_number,
                cycle_key,
                attempt.cost
            ),
            Err(e) => log::error!(
                "Failed to record review session for {}#{}: {}",
                repository,
                event.pull_number,
                e
            ),
        }
    }
}
