//! HTTP adapter for the managed job service that runs the coding agent.
//!
//! The service accepts one job per request, holds the connection until the
//! job finishes and answers with the combined log output.

use async_trait::async_trait;
use serde::Deserialize;

use super::{JobRequest, JobRunner};
use crate::config::JobRunnerConfig;
use crate::error::{AppError, AppResult};

pub struct HttpJobRunner {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct JobResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    logs: String,
    #[serde(default)]
    error: Option<String>,
}

impl HttpJobRunner {
    pub fn new(config: &JobRunnerConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            token: config.token.clone(),
        })
    }
}

#[async_trait]
impl JobRunner for HttpJobRunner {
    async fn run(&self, request: &JobRequest) -> AppResult<String> {
        log::info!(
            "Submitting job for branch {} ({} file hints)",
            request.branch,
            request.file_hints.len()
        );

        let mut builder = self.client.post(&self.url).json(request);
        if let Some(ref token) = self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Job("job timed out".to_string())
            } else {
                AppError::Job(format!("job submission failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Job(format!(
                "job service returned HTTP {}: {}",
                status.as_u16(),
                body.chars().take(300).collect::<String>()
            )));
        }

        let result: JobResponse = response
            .json()
            .await
            .map_err(|e| AppError::Job(format!("unreadable job response: {}", e)))?;

        match result.status.as_deref() {
            Some("failed") | Some("error") => Err(AppError::Job(
                result
                    .error
                    .unwrap_or_else(|| "job reported failure".to_string()),
            )),
            _ => {
                log::info!("Job finished ({} bytes of logs)", result.logs.len());
                Ok(result.logs)
            }
        }
    }
}
