//! Cost extraction from job logs.
//!
//! The agent prints lines like `Cost: $0.01 message, $0.07 session.` after
//! every step. The last session figure is the authoritative total; when no
//! such line exists the LLM is asked to read the log instead.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::clients::TextCompleter;
use crate::models::usage::sanitize_cost;

static COST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Cost: \$(\d+(?:\.\d+)?) message, \$(\d+(?:\.\d+)?) session")
        .expect("cost marker pattern is valid")
});

/// Characters of log tail sent to the LLM fallback
const FALLBACK_LOG_TAIL: usize = 6_000;

const FALLBACK_SYSTEM_PROMPT: &str = "You read logs from an AI coding agent. \
Reply with only the total session cost in US dollars as a plain number, \
for example 0.42. Reply 0 if the log does not state a cost.";

/// Session cost from the last cost marker in the log
pub fn parse_cost_marker(log_text: &str) -> Option<f64> {
    COST_MARKER
        .captures_iter(log_text)
        .last()
        .and_then(|caps| caps.get(2))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Parses a bare number such as `0.42` or `$0.42`
fn parse_reply(reply: &str) -> Option<f64> {
    let token = reply.split_whitespace().next()?;
    token
        .trim_start_matches('$')
        .trim_end_matches(['.', ','])
        .parse::<f64>()
        .ok()
}

/// Last `max_chars` characters of `text`
pub(crate) fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

pub struct CostExtractor {
    llm: Arc<dyn TextCompleter>,
}

impl CostExtractor {
    pub fn new(llm: Arc<dyn TextCompleter>) -> Self {
        Self { llm }
    }

    /// Never fails: any uncertainty yields 0
    pub async fn extract_cost(&self, log_text: &str) -> f64 {
        if let Some(cost) = parse_cost_marker(log_text) {
            return sanitize_cost(cost);
        }
        if log_text.trim().is_empty() {
            return 0.0;
        }

        match self
            .llm
            .complete(FALLBACK_SYSTEM_PROMPT, tail(log_text, FALLBACK_LOG_TAIL))
            .await
        {
            Ok(reply) => match parse_reply(&reply) {
                Some(cost) => sanitize_cost(cost),
                None => {
                    log::warn!("Unparseable cost reply from LLM: {:?}", reply);
                    0.0
                }
            },
            Err(e) => {
                log::warn!("Cost extraction fallback failed: {}", e);
                0.0
            }
        }
    }
}
