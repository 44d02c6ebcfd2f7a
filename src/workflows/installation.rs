use crate::models::InstallationEvent;

use super::WorkflowContext;

const TRIGGER_LABEL_COLOR: &str = "7057ff";
const TRIGGER_LABEL_DESCRIPTION: &str = "Ask the AI agent to open a pull request for this issue";

/// Creates the trigger label in every newly added repository.
/// Returns how many repositories were prepared.
pub async fn handle(ctx: &WorkflowContext, event: &InstallationEvent) -> usize {
    let mut prepared = 0;
    for repo in &event.repositories {
        match ctx
            .vcs
            .ensure_label(
                repo,
                &ctx.settings.trigger_label,
                TRIGGER_LABEL_COLOR,
                TRIGGER_LABEL_DESCRIPTION,
            )
            .await
        {
            Ok(()) => prepared += 1,
            Err(e) => log::warn!(
                "Could not create label {} in {}: {}",
                ctx.settings.trigger_label,
                repo.full_name(),
                e
            ),
        }
    }

    log::info!(
        "Installation {}: prepared {}/{} repositories",
        event.installation_id,
        prepared,
        event.repositories.len()
    );
    prepared
}
