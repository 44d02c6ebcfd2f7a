//! Anthropic Messages API client used for the small helper prompts.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::json;

use super::TextCompleter;
use crate::config::LlmConfig;
use crate::error::{AppError, AppResult};

const MAX_TOKENS: u32 = 1024;

pub struct AnthropicCompleter {
    client: reqwest::Client,
    messages_url: String,
    model: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicCompleter {
    pub fn new(config: &LlmConfig) -> AppResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(AppError::Validation("ANTHROPIC_API_KEY is empty".to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(config.api_key.trim())
                .map_err(|e| AppError::Validation(format!("invalid API key header: {}", e)))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(60))
            .build()?;

        let base = config.api_url.trim_end_matches('/');
        let messages_url = if base.ends_with("/messages") {
            base.to_string()
        } else {
            format!("{}/messages", base)
        };

        Ok(Self {
            client,
            messages_url,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl TextCompleter for AnthropicCompleter {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> AppResult<String> {
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "system": system_prompt,
            "messages": [{ "role": "user", "content": user_prompt }],
        });

        let response = self.client.post(&self.messages_url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "LLM returned HTTP {}: {}",
                status.as_u16(),
                text.chars().take(300).collect::<String>()
            )));
        }

        let parsed: MessagesResponse = response.json().await?;
        let text = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(text.trim().to_string())
    }
}
