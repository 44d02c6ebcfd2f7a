//! Issue labeled with the trigger label: gate, run, open a pull request.

use crate::clients::{NewPullRequest, PullRequestHandle};
use crate::error::AppResult;
use crate::models::IssueLabeledEvent;
use crate::services::assist::describe_changes;
use crate::services::{admit_pull_request, Admission};

use super::failure::report_failure;
use super::runner::{run_until_changed, JobSpec, RunOutcome};
use super::{lifecycle, messages, WorkflowContext};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueOutcome {
    /// Not the trigger label
    Ignored,
    NotEntitled,
    QuotaExceeded,
    /// Two attempts, no commits; the label stays
    NoChanges,
    Opened(u64),
    /// A pull request for the branch was already open
    Updated(u64),
    Failed,
}

pub async fn handle(ctx: &WorkflowContext, event: &IssueLabeledEvent) -> IssueOutcome {
    if !event.label.eq_ignore_ascii_case(&ctx.settings.trigger_label) {
        return IssueOutcome::Ignored;
    }

    match run(ctx, event).await {
        Ok(outcome) => outcome,
        Err(e) => {
            report_failure(
                ctx.vcs.as_ref(),
                &event.repo,
                event.issue_number,
                Some(&event.label),
                &e,
            )
            .await;
            IssueOutcome::Failed
        }
    }
}

async fn run(ctx: &WorkflowContext, event: &IssueLabeledEvent) -> AppResult<IssueOutcome> {
    let vcs = ctx.vcs.as_ref();
    let repo = &event.repo;
    let number = event.issue_number;

    let entitlement = ctx.entitlements.resolve(&event.account).await?;
    let cycle_key = match admit_pull_request(ctx.usage.as_ref(), event.installation_id, &entitlement)
        .await?
    {
        Admission::Admitted { cycle_key, .. } => cycle_key,
        Admission::NotEntitled => {
            deny(ctx, event, &messages::not_entitled(&event.account.login, &event.label)).await;
            return Ok(IssueOutcome::NotEntitled);
        }
        Admission::QuotaExceeded {
            cycle_key,
            used,
            limit,
        } => {
            deny(
                ctx,
                event,
                &messages::quota_exceeded(used, limit, &cycle_key, &event.label),
            )
            .await;
            return Ok(IssueOutcome::QuotaExceeded);
        }
    };

    let branch = lifecycle::ensure_branch(
        vcs,
        repo,
        &event.default_branch,
        &ctx.settings.branch_prefix,
        number,
    )
    .await?;

    if let Err(e) = vcs
        .post_comment(repo, number, &messages::working_on_issue(&branch))
        .await
    {
        log::warn!("Could not post progress comment on {}#{}: {}", repo.full_name(), number, e);
    }

    let spec = JobSpec {
        repo: repo.clone(),
        branch: branch.clone(),
        prompt: messages::issue_prompt(&event.title, &event.body),
        file_hints: Vec::new(),
    };
    let outcome = run_until_changed(ctx, &spec).await?;

    if !outcome.changed {
        log::info!(
            "No changes for {}#{} (unrecorded cost ${:.4})",
            repo.full_name(),
            number,
            outcome.total_cost()
        );
        if let Err(e) = vcs
            .post_comment(repo, number, &messages::issue_no_changes(&event.label))
            .await
        {
            log::warn!("Could not post no-change notice on {}#{}: {}", repo.full_name(), number, e);
        }
        return Ok(IssueOutcome::NoChanges);
    }

    let result = match vcs.find_open_pull_request(repo, &branch).await? {
        Some(existing) => {
            record_sessions(ctx, event, &cycle_key, &existing, &outcome, 0).await;
            notify(ctx, event, &messages::pull_request_updated(&existing.html_url)).await;
            IssueOutcome::Updated(existing.number)
        }
        None => {
            let description =
                describe_changes(ctx.llm.as_ref(), &event.title, &event.body, outcome.last_log())
                    .await;
            let created = vcs
                .create_pull_request(
                    repo,
                    &NewPullRequest {
                        title: messages::pull_request_title(number, &event.title),
                        head: branch.clone(),
                        base: event.default_branch.clone(),
                        body: messages::pull_request_body(number, &description),
                    },
                )
                .await?;
            log::info!("Opened {}#{} for issue #{}", repo.full_name(), created.number, number);

            if let Err(e) = vcs
                .request_reviewers(repo, created.number, &[event.sender.clone()])
                .await
            {
                log::warn!("Could not request review from {}: {}", event.sender, e);
            }

            record_new_pull_request(ctx, event, &cycle_key, &created, &outcome).await;
            notify(ctx, event, &messages::pull_request_opened(&created.html_url)).await;
            IssueOutcome::Opened(created.number)
        }
    };

    if let Err(e) = vcs.remove_label(repo, number, &event.label).await {
        log::warn!("Could not remove label from {}#{}: {}", repo.full_name(), number, e);
    }

    Ok(result)
}

async fn deny(ctx: &WorkflowContext, event: &IssueLabeledEvent, notice: &str) {
    let vcs = ctx.vcs.as_ref();
    if let Err(e) = vcs.post_comment(&event.repo, event.issue_number, notice).await {
        log::warn!("Could not post denial on {}#{}: {}", event.repo.full_name(), event.issue_number, e);
    }
    if let Err(e) = vcs
        .remove_label(&event.repo, event.issue_number, &event.label)
        .await
    {
        log::warn!("Could not remove label after denial: {}", e);
    }
}

async fn notify(ctx: &WorkflowContext, event: &IssueLabeledEvent, body: &str) {
    if let Err(e) = ctx
        .vcs
        .post_comment(&event.repo, event.issue_number, body)
        .await
    {
        log::warn!("Could not comment on {}#{}: {}", event.repo.full_name(), event.issue_number, e);
    }
}

/// First attempt opens the usage entry; later attempts become sessions
async fn record_new_pull_request(
    ctx: &WorkflowContext,
    event: &IssueLabeledEvent,
    cycle_key: &str,
    pull_request: &PullRequestHandle,
    outcome: &RunOutcome,
) {
    let first_cost = outcome.attempts.first().map(|a| a.cost).unwrap_or(0.0);
    if let Err(e) = ctx
        .usage
        .append_pull_request(
            event.installation_id,
            cycle_key,
            &event.repo.full_name(),
            pull_request.number as i64,
            first_cost,
        )
        .await
    {
        log::error!(
            "Failed to record usage for {}#{}: {}",
            event.repo.full_name(),
            pull_request.number,
            e
        );
        return;
    }
    record_sessions(ctx, event, cycle_key, pull_request, outcome, 1).await;
}

async fn record_sessions(
    ctx: &WorkflowContext,
    event: &IssueLabeledEvent,
    cycle_key: &str,
    pull_request: &PullRequestHandle,
    outcome: &RunOutcome,
    skip: usize,
) {
    let repository = event.repo.full_name();
    for attempt in outcome.attempts.iter().skip(skip) {
        match ctx
            .usage
            .append_session(
                event.installation_id,
                cycle_key,
                &repository,
                pull_request.number as i64,
                attempt.cost,
            )
            .await
        {
            Ok(true) => {}
            Ok(false) => log::warn!(
                "{}#{} is not recorded in cycle {}, session dropped",
                repository,
                pull_request.number,
                cycle_key
            ),
            Err(e) => log::error!("Failed to record session for {}#{}: {}", repository, pull_request.number, e),
        }
    }
}
