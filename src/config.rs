use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database: DatabaseConfig,
    pub github: GithubConfig,
    pub job_runner: JobRunnerConfig,
    pub llm: LlmConfig,
    pub workflow: WorkflowConfig,
}

/// Database connection pool configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

/// GitHub App credentials
#[derive(Clone)]
pub struct GithubConfig {
    pub app_id: u64,
    /// RS256 private key in PEM format
    pub private_key: String,
    /// REST API base, `https://api.github.com` or `https://<host>/api/v3`
    pub api_url: String,
    /// Shared secret for `X-Hub-Signature-256`. Verification is skipped when unset.
    pub webhook_secret: Option<String>,
}

impl std::fmt::Debug for GithubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubConfig")
            .field("app_id", &self.app_id)
            .field("private_key", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Managed job service that runs the coding agent
#[derive(Debug, Clone)]
pub struct JobRunnerConfig {
    pub url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

/// Hosted LLM used for cost fallback, file hints and PR descriptions
#[derive(Clone)]
pub struct LlmConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .finish()
    }
}

/// Knobs of the issue/review workflows
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Issue label that starts a job
    pub trigger_label: String,
    /// Prefix of branches created for issues (`<prefix>/issue-<n>`)
    pub branch_prefix: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            trigger_label: "ai-fix".to_string(),
            branch_prefix: "ai-fix".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            database: DatabaseConfig::from_env()?,
            github: GithubConfig::from_env()?,
            job_runner: JobRunnerConfig::from_env()?,
            llm: LlmConfig::from_env()?,
            workflow: WorkflowConfig::from_env(),
        })
    }
}

impl DatabaseConfig {
    /// Load database configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingVar("DATABASE_URL"))?;

        Ok(Self {
            url,
            max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10),
            min_connections: parse_or("DATABASE_MIN_CONNECTIONS", 1),
            acquire_timeout: Duration::from_secs(parse_or("DATABASE_ACQUIRE_TIMEOUT_SECS", 5)),
            idle_timeout: Duration::from_secs(parse_or("DATABASE_IDLE_TIMEOUT_SECS", 600)),
            max_lifetime: Duration::from_secs(parse_or("DATABASE_MAX_LIFETIME_SECS", 1800)),
        })
    }
}

impl GithubConfig {
    /// Load GitHub App configuration from environment variables.
    ///
    /// The private key comes from `GITHUB_PRIVATE_KEY` (escaped `\n` allowed)
    /// or, failing that, from the file named by `GITHUB_PRIVATE_KEY_PATH`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let app_id = env::var("GITHUB_APP_ID")
            .map_err(|_| ConfigError::MissingVar("GITHUB_APP_ID"))?
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidAppId)?;

        let private_key = match env::var("GITHUB_PRIVATE_KEY") {
            Ok(key) if !key.trim().is_empty() => key.replace("\\n", "\n"),
            _ => {
                let path = env::var("GITHUB_PRIVATE_KEY_PATH")
                    .map_err(|_| ConfigError::MissingVar("GITHUB_PRIVATE_KEY"))?;
                std::fs::read_to_string(&path)
                    .map_err(|e| ConfigError::UnreadablePrivateKey(format!("{path}: {e}")))?
            }
        };

        Ok(Self {
            app_id,
            private_key,
            api_url: env::var("GITHUB_API_URL")
                .unwrap_or_else(|_| "https://api.github.com".to_string()),
            webhook_secret: env::var("GITHUB_WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
        })
    }
}

impl JobRunnerConfig {
    /// Load job service configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env::var("JOB_RUNNER_URL").map_err(|_| ConfigError::MissingVar("JOB_RUNNER_URL"))?,
            token: env::var("JOB_RUNNER_TOKEN").ok().filter(|s| !s.is_empty()),
            timeout: Duration::from_secs(parse_or("JOB_RUNNER_TIMEOUT_SECS", 3600)),
        })
    }
}

impl LlmConfig {
    /// Load LLM configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_url: env::var("ANTHROPIC_API_URL")
                .unwrap_or_else(|_| "https://api.anthropic.com/v1".to_string()),
            api_key: env::var("ANTHROPIC_API_KEY")
                .map_err(|_| ConfigError::MissingVar("ANTHROPIC_API_KEY"))?,
            model: env::var("LLM_MODEL").unwrap_or_else(|_| "claude-3-5-haiku-latest".to_string()),
        })
    }
}

impl WorkflowConfig {
    /// Load workflow settings, falling back to defaults for blank values
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            trigger_label: non_blank("TRIGGER_LABEL").unwrap_or(defaults.trigger_label),
            branch_prefix: non_blank("BRANCH_PREFIX")
                .map(|p| p.trim_end_matches('/').to_string())
                .unwrap_or(defaults.branch_prefix),
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn non_blank(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidAppId,
    MissingVar(&'static str),
    UnreadablePrivateKey(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "PORT must be a valid number"),
            ConfigError::InvalidAppId => write!(f, "GITHUB_APP_ID must be a valid number"),
            ConfigError::MissingVar(name) => {
                write!(f, "{} environment variable is required", name)
            }
            ConfigError::UnreadablePrivateKey(detail) => {
                write!(f, "could not read GitHub private key ({})", detail)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
