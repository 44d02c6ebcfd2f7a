//! Branch and issue bookkeeping around pull requests.
//!
//! Branches created for issues are named `<prefix>/issue-<number>`; closing a
//! merged pull request recovers the issue number from that name.

use crate::clients::VcsClient;
use crate::error::{AppError, AppResult};
use crate::models::RepoRef;

pub fn issue_branch(prefix: &str, issue_number: u64) -> String {
    format!("{}/issue-{}", prefix, issue_number)
}

/// Issue number encoded in a branch name, if it follows the convention
pub fn parse_issue_branch(prefix: &str, branch: &str) -> Option<u64> {
    let digits = branch
        .strip_prefix(prefix)?
        .strip_prefix("/issue-")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Returns the issue branch, creating it from the default branch if needed
pub async fn ensure_branch(
    vcs: &dyn VcsClient,
    repo: &RepoRef,
    default_branch: &str,
    prefix: &str,
    issue_number: u64,
) -> AppResult<String> {
    let branch = issue_branch(prefix, issue_number);
    if vcs.branch_sha(repo, &branch).await?.is_some() {
        log::info!("Reusing branch {} in {}", branch, repo.full_name());
        return Ok(branch);
    }

    let base_sha = vcs.branch_sha(repo, default_branch).await?.ok_or_else(|| {
        AppError::NotFound(format!(
            "Default branch {} not found in {}",
            default_branch,
            repo.full_name()
        ))
    })?;
    vcs.create_branch(repo, &branch, &base_sha).await?;
    log::info!("Created branch {} from {} ({})", branch, default_branch, base_sha);
    Ok(branch)
}

/// Closes the issue a merged branch was created for.
/// Branches outside the convention are left alone.
pub async fn close_linked_issue(
    vcs: &dyn VcsClient,
    repo: &RepoRef,
    prefix: &str,
    branch: &str,
) -> AppResult<Option<u64>> {
    let Some(issue_number) = parse_issue_branch(prefix, branch) else {
        log::warn!(
            "Branch {} in {} does not name an issue, nothing to close",
            branch,
            repo.full_name()
        );
        return Ok(None);
    };

    vcs.close_issue(repo, issue_number).await?;
    log::info!("Closed issue {}#{}", repo.full_name(), issue_number);
    Ok(Some(issue_number))
}
