//! Unit tests for configuration parsing
//!
//! Tests environment variable parsing and default values.
//!
//! Note: These tests modify global environment variables and must run serially.

use std::io::Write;
use std::time::Duration;

use serial_test::serial;

use patchwright::config::{ConfigError, GithubConfig, JobRunnerConfig, WorkflowConfig};

fn clear_github_env() {
    std::env::remove_var("GITHUB_APP_ID");
    std::env::remove_var("GITHUB_PRIVATE_KEY");
    std::env::remove_var("GITHUB_PRIVATE_KEY_PATH");
    std::env::remove_var("GITHUB_API_URL");
    std::env::remove_var("GITHUB_WEBHOOK_SECRET");
}

// =============================================================================
// Workflow Config Tests
// =============================================================================

#[test]
#[serial]
fn test_workflow_config_defaults() {
    std::env::remove_var("TRIGGER_LABEL");
    std::env::remove_var("BRANCH_PREFIX");

    let config = WorkflowConfig::from_env();

    assert_eq!(config.trigger_label, "ai-fix");
    assert_eq!(config.branch_prefix, "ai-fix");
}

#[test]
#[serial]
fn test_workflow_config_custom_values() {
    std::env::set_var("TRIGGER_LABEL", "agent");
    std::env::set_var("BRANCH_PREFIX", "bots/agent/");

    let config = WorkflowConfig::from_env();

    assert_eq!(config.trigger_label, "agent");
    assert_eq!(config.branch_prefix, "bots/agent");

    std::env::remove_var("TRIGGER_LABEL");
    std::env::remove_var("BRANCH_PREFIX");
}

#[test]
#[serial]
fn test_workflow_config_blank_values_use_defaults() {
    std::env::set_var("TRIGGER_LABEL", "   ");
    std::env::set_var("BRANCH_PREFIX", "");

    let config = WorkflowConfig::from_env();

    assert_eq!(config.trigger_label, "ai-fix");
    assert_eq!(config.branch_prefix, "ai-fix");

    std::env::remove_var("TRIGGER_LABEL");
    std::env::remove_var("BRANCH_PREFIX");
}

// =============================================================================
// GitHub Config Tests
// =============================================================================

#[test]
#[serial]
fn test_github_config_unescapes_inline_key() {
    clear_github_env();
    std::env::set_var("GITHUB_APP_ID", "12345");
    std::env::set_var("GITHUB_PRIVATE_KEY", "-----BEGIN KEY-----\\nabc\\n-----END KEY-----");
    std::env::set_var("GITHUB_WEBHOOK_SECRET", "s3cret");

    let config = GithubConfig::from_env().unwrap();

    assert_eq!(config.app_id, 12345);
    assert_eq!(config.private_key, "-----BEGIN KEY-----\nabc\n-----END KEY-----");
    assert_eq!(config.api_url, "https://api.github.com");
    assert_eq!(config.webhook_secret.as_deref(), Some("s3cret"));

    clear_github_env();
}

#[test]
#[serial]
fn test_github_config_reads_key_file() {
    clear_github_env();
    let mut key_file = tempfile::NamedTempFile::new().unwrap();
    write!(key_file, "-----BEGIN KEY-----\nfrom-file\n-----END KEY-----\n").unwrap();
    std::env::set_var("GITHUB_APP_ID", "7");
    std::env::set_var("GITHUB_PRIVATE_KEY_PATH", key_file.path());

    let config = GithubConfig::from_env().unwrap();

    assert!(config.private_key.contains("from-file"));
    assert_eq!(config.webhook_secret, None);

    clear_github_env();
}

#[test]
#[serial]
fn test_github_config_requires_app_id() {
    clear_github_env();
    std::env::set_var("GITHUB_PRIVATE_KEY", "key");

    let result = GithubConfig::from_env();

    assert!(matches!(result, Err(ConfigError::MissingVar("GITHUB_APP_ID"))));

    clear_github_env();
}

#[test]
#[serial]
fn test_github_config_rejects_non_numeric_app_id() {
    clear_github_env();
    std::env::set_var("GITHUB_APP_ID", "my-app");
    std::env::set_var("GITHUB_PRIVATE_KEY", "key");

    let result = GithubConfig::from_env();

    assert!(matches!(result, Err(ConfigError::InvalidAppId)));

    clear_github_env();
}

#[test]
#[serial]
fn test_github_config_missing_key_file_is_reported() {
    clear_github_env();
    std::env::set_var("GITHUB_APP_ID", "7");
    std::env::set_var("GITHUB_PRIVATE_KEY_PATH", "/nonexistent/key.pem");

    let result = GithubConfig::from_env();

    assert!(matches!(result, Err(ConfigError::UnreadablePrivateKey(_))));

    clear_github_env();
}

#[test]
#[serial]
fn test_github_config_debug_redacts_secrets() {
    clear_github_env();
    std::env::set_var("GITHUB_APP_ID", "7");
    std::env::set_var("GITHUB_PRIVATE_KEY", "super-secret-key");
    std::env::set_var("GITHUB_WEBHOOK_SECRET", "hook-secret");

    let config = GithubConfig::from_env().unwrap();
    let debug = format!("{:?}", config);

    assert!(!debug.contains("super-secret-key"));
    assert!(!debug.contains("hook-secret"));

    clear_github_env();
}

// =============================================================================
// Job Runner Config Tests
// =============================================================================

#[test]
#[serial]
fn test_job_runner_config_defaults() {
    std::env::set_var("JOB_RUNNER_URL", "http://runner.internal/jobs");
    std::env::remove_var("JOB_RUNNER_TOKEN");
    std::env::remove_var("JOB_RUNNER_TIMEOUT_SECS");

    let config = JobRunnerConfig::from_env().unwrap();

    assert_eq!(config.url, "http://runner.internal/jobs");
    assert_eq!(config.token, None);
    assert_eq!(config.timeout, Duration::from_secs(3600));

    std::env::remove_var("JOB_RUNNER_URL");
}

#[test]
#[serial]
fn test_job_runner_config_invalid_timeout_uses_default() {
    std::env::set_var("JOB_RUNNER_URL", "http://runner.internal/jobs");
    std::env::set_var("JOB_RUNNER_TIMEOUT_SECS", "soon");

    let config = JobRunnerConfig::from_env().unwrap();

    assert_eq!(config.timeout, Duration::from_secs(3600));

    std::env::remove_var("JOB_RUNNER_URL");
    std::env::remove_var("JOB_RUNNER_TIMEOUT_SECS");
}

#[test]
#[serial]
fn test_job_runner_config_requires_url() {
    std::env::remove_var("JOB_RUNNER_URL");

    assert!(matches!(
        JobRunnerConfig::from_env(),
        Err(ConfigError::MissingVar("JOB_RUNNER_URL"))
    ));
}
