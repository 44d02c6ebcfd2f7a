//! Webhook-driven workflows.
//!
//! Each delivery is handled on its own task with a [`WorkflowContext`] scoped
//! to the event's installation. Nothing here holds a lock across a job run.

pub mod failure;
pub mod installation;
pub mod issue_labeled;
pub mod lifecycle;
pub mod messages;
pub mod pull_request_closed;
pub mod review_submitted;
pub mod runner;

use std::sync::Arc;

use crate::clients::{JobRunner, TextCompleter, VcsClient};
use crate::config::WorkflowConfig;
use crate::models::WebhookEvent;
use crate::services::{EntitlementResolver, UsageStore};

pub use issue_labeled::IssueOutcome;
pub use review_submitted::ReviewOutcome;
pub use runner::{run_until_changed, Attempt, JobSpec, RunOutcome};

/// Collaborators available to one workflow run
#[derive(Clone)]
pub struct WorkflowContext {
    pub vcs: Arc<dyn VcsClient>,
    pub jobs: Arc<dyn JobRunner>,
    pub llm: Arc<dyn TextCompleter>,
    pub usage: Arc<dyn UsageStore>,
    pub entitlements: Arc<EntitlementResolver>,
    pub settings: WorkflowConfig,
}

/// Routes an event to its workflow. Never returns an error: failures are
/// reported to users or logged inside each workflow.
pub async fn dispatch(ctx: &WorkflowContext, event: WebhookEvent) {
    match event {
        WebhookEvent::IssueLabeled(event) => {
            let outcome = issue_labeled::handle(ctx, &event).await;
            log::info!(
                "Issue {}#{} finished: {:?}",
                event.repo.full_name(),
                event.issue_number,
                outcome
            );
        }
        WebhookEvent::ReviewSubmitted(event) => {
            let outcome = review_submitted::handle(ctx, &event).await;
            log::info!(
                "Review on {}#{} finished: {:?}",
                event.repo.full_name(),
                event.pull_number,
                outcome
            );
        }
        WebhookEvent::PullRequestClosed(event) => {
            pull_request_closed::handle(ctx, &event).await;
        }
        WebhookEvent::Installation(event) => {
            installation::handle(ctx, &event).await;
        }
    }
}
