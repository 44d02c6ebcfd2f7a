//! LLM-backed helpers. Each one has a non-LLM default.

use super::cost::tail;
use crate::clients::TextCompleter;

/// Upper bound on file hints passed to a retry
pub const MAX_FILE_HINTS: usize = 10;

const LOG_TAIL_CHARS: usize = 8_000;

const FILE_HINTS_SYSTEM_PROMPT: &str = "An AI coding agent was asked to change a repository \
but made no commits. Given the task and the agent's log, list repository file paths the agent \
probably needed to open or edit. Reply with one relative path per line and nothing else.";

const DESCRIPTION_SYSTEM_PROMPT: &str = "Write a concise pull request description in Markdown \
for changes made by an AI coding agent. Summarize what changed and why in at most 10 lines. \
Do not add a title.";

/// Suggests paths the first attempt may have been missing. Empty on failure.
pub async fn suggest_missing_files(
    llm: &dyn TextCompleter,
    prompt: &str,
    log_text: &str,
) -> Vec<String> {
    let user_prompt = format!(
        "Task:\n{}\n\nAgent log (tail):\n{}",
        prompt,
        tail(log_text, LOG_TAIL_CHARS)
    );

    match llm.complete(FILE_HINTS_SYSTEM_PROMPT, &user_prompt).await {
        Ok(reply) => parse_file_hints(&reply),
        Err(e) => {
            log::warn!("File hint derivation failed: {}", e);
            Vec::new()
        }
    }
}

/// Pulls plausible relative paths out of a free-form reply
pub fn parse_file_hints(reply: &str) -> Vec<String> {
    let mut hints: Vec<String> = Vec::new();
    for line in reply.lines() {
        let candidate = line
            .trim()
            .trim_start_matches(['-', '*', '•'])
            .trim()
            .trim_matches('`')
            .trim_start_matches("./");

        let looks_like_path = !candidate.is_empty()
            && !candidate.contains(char::is_whitespace)
            && !candidate.starts_with('/')
            && !candidate.contains("..")
            && (candidate.contains('.') || candidate.contains('/'));

        if looks_like_path && !hints.iter().any(|h| h == candidate) {
            hints.push(candidate.to_string());
        }
        if hints.len() == MAX_FILE_HINTS {
            break;
        }
    }
    hints
}

/// Merges hint lists keeping first-seen order
pub fn merge_hints(existing: &[String], extra: Vec<String>) -> Vec<String> {
    let mut merged = existing.to_vec();
    for hint in extra {
        if !merged.contains(&hint) {
            merged.push(hint);
        }
    }
    merged
}

/// PR body summary; falls back to a fixed text when the LLM is unavailable
pub async fn describe_changes(
    llm: &dyn TextCompleter,
    task_title: &str,
    task_body: &str,
    log_text: &str,
) -> String {
    let user_prompt = format!(
        "Task: {}\n\n{}\n\nAgent log (tail):\n{}",
        task_title,
        task_body,
        tail(log_text, LOG_TAIL_CHARS)
    );

    match llm.complete(DESCRIPTION_SYSTEM_PROMPT, &user_prompt).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => default_description(task_title),
        Err(e) => {
            log::warn!("PR description generation failed: {}", e);
            default_description(task_title)
        }
    }
}

fn default_description(task_title: &str) -> String {
    format!("Automated changes for: {}", task_title)
}
