use crate::models::PullRequestClosedEvent;

use super::{lifecycle, WorkflowContext};

/// Closes the originating issue once an app branch is merged.
/// Returns the closed issue number.
pub async fn handle(ctx: &WorkflowContext, event: &PullRequestClosedEvent) -> Option<u64> {
    if !event.merged {
        log::debug!(
            "{}#{} closed without merge",
            event.repo.full_name(),
            event.pull_number
        );
        return None;
    }

    match lifecycle::close_linked_issue(
        ctx.vcs.as_ref(),
        &event.repo,
        &ctx.settings.branch_prefix,
        &event.head_branch,
    )
    .await
    {
        Ok(closed) => closed,
        Err(e) => {
            log::error!(
                "Failed to close issue linked to {}#{}: {}",
                event.repo.full_name(),
                event.pull_number,
                e
            );
            None
        }
    }
}
