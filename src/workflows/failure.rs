use crate::clients::VcsClient;
use crate::error::AppError;
use crate::models::RepoRef;

use super::messages;

/// Tells the user a run failed and optionally removes the trigger label.
///
/// Errors raised while reporting are logged and swallowed.
pub async fn report_failure(
    vcs: &dyn VcsClient,
    repo: &RepoRef,
    number: u64,
    trigger_label: Option<&str>,
    error: &AppError,
) {
    log::error!("Workflow for {}#{} failed: {}", repo.full_name(), number, error);

    if let Err(e) = vcs
        .post_comment(repo, number, &messages::failure_notice())
        .await
    {
        log::error!(
            "Could not post failure notice on {}#{}: {}",
            repo.full_name(),
            number,
            e
        );
    }

    if let Some(label) = trigger_label {
        if let Err(e) = vcs.remove_label(repo, number, label).await {
            log::error!(
                "Could not remove label {} from {}#{}: {}",
                label,
                repo.full_name(),
                number,
                e
            );
        }
    }
}
