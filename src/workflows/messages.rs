//! Comment bodies and job prompts.

use crate::clients::ReviewComment;

pub fn not_entitled(account: &str, label: &str) -> String {
    format!(
        "This app is not active for **{}**: there is no subscription and the free \
         promotion is full. I removed the `{}` label.",
        account, label
    )
}

pub fn quota_exceeded(used: u32, limit: u32, cycle_key: &str, label: &str) -> String {
    let renewal = if cycle_key.contains('-') {
        format!(" Your allowance renews on {}.", cycle_key)
    } else {
        String::new()
    };
    format!(
        "This account has used {} of {} pull requests for the current period.{} \
         I removed the `{}` label.",
        used, limit, renewal, label
    )
}

pub fn review_not_entitled(account: &str) -> String {
    format!(
        "I can't act on this review: the app is not active for **{}**.",
        account
    )
}

pub fn working_on_issue(branch: &str) -> String {
    format!("Working on this issue in branch `{}`.", branch)
}

pub fn pull_request_opened(url: &str) -> String {
    format!("Opened a pull request: {}", url)
}

pub fn pull_request_updated(url: &str) -> String {
    format!("Pushed new changes to the existing pull request: {}", url)
}

/// No-change notice for issues. The trigger label stays on the issue.
pub fn issue_no_changes(label: &str) -> String {
    format!(
        "I ran the agent twice but it did not commit any changes, so no pull request \
         was opened. The `{}` label is left in place; remove and re-add it to try again, \
         ideally after adding more detail to the issue.",
        label
    )
}

pub fn review_no_changes() -> String {
    "I could not determine which changes this review asks for; the agent made no \
     commits after two attempts."
        .to_string()
}

pub fn review_addressed(reviewer: &str) -> String {
    format!(
        "Pushed changes addressing the review. @{} please take another look.",
        reviewer
    )
}

pub fn failure_notice() -> String {
    "Sorry, something went wrong while running the agent and no changes were made. \
     The error has been logged."
        .to_string()
}

pub fn pull_request_title(issue_number: u64, issue_title: &str) -> String {
    format!("Fix #{}: {}", issue_number, issue_title)
}

pub fn pull_request_body(issue_number: u64, description: &str) -> String {
    format!("{}\n\nCloses #{}", description.trim(), issue_number)
}

pub fn issue_prompt(title: &str, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        title.trim().to_string()
    } else {
        format!("{}\n\n{}", title.trim(), body)
    }
}

pub fn review_prompt(review_body: &str, comments: &[ReviewComment]) -> String {
    let mut prompt = String::from("Address the following pull request review feedback.\n");
    if !review_body.trim().is_empty() {
        prompt.push_str("\nReview:\n");
        prompt.push_str(review_body.trim());
        prompt.push('\n');
    }
    for comment in comments {
        match comment.line {
            Some(line) => prompt.push_str(&format!("\n{}:{}: {}", comment.path, line, comment.body)),
            None => prompt.push_str(&format!("\n{}: {}", comment.path, comment.body)),
        }
    }
    prompt
}

/// Files mentioned by inline review comments, in order
pub fn review_file_hints(comments: &[ReviewComment]) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    for comment in comments {
        if !files.contains(&comment.path) {
            files.push(comment.path.clone());
        }
    }
    files
}
