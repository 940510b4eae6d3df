//! Configuration types for the lookup tool.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Remote service endpoints and client identity.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Non-secret credential settings.
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Retry, backoff and throttling policy.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Where result files are written.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Remote service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Base URL of the identity (sign-in) API.
    #[serde(default = "default_auth_base")]
    pub auth_base: String,

    /// Base URL of the application serving the GraphQL API.
    #[serde(default = "default_app_base")]
    pub app_base: String,

    /// `__clerk_api_version` query parameter sent on sign-in calls.
    #[serde(default = "default_clerk_api_version")]
    pub clerk_api_version: String,

    /// `_clerk_js_version` query parameter sent on sign-in calls.
    #[serde(default = "default_clerk_js_version")]
    pub clerk_js_version: String,

    /// User-Agent presented on every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            auth_base: default_auth_base(),
            app_base: default_app_base(),
            clerk_api_version: default_clerk_api_version(),
            clerk_js_version: default_clerk_js_version(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout(),
        }
    }
}

impl ServiceConfig {
    /// Parsed application base URL.
    pub fn app_url(&self) -> anyhow::Result<Url> {
        parse_base_url("app_base", &self.app_base)
    }

    /// Parsed identity API base URL.
    pub fn auth_url(&self) -> anyhow::Result<Url> {
        parse_base_url("auth_base", &self.auth_base)
    }

    /// Request timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Application base without a trailing slash, for building request URLs.
    pub fn app_base_trimmed(&self) -> &str {
        self.app_base.trim_end_matches('/')
    }

    /// Identity base without a trailing slash, for building request URLs.
    pub fn auth_base_trimmed(&self) -> &str {
        self.auth_base.trim_end_matches('/')
    }
}

fn default_auth_base() -> String {
    "https://clerk.spur.us".to_string()
}

fn default_app_base() -> String {
    "https://app.spur.us".to_string()
}

fn default_clerk_api_version() -> String {
    "2025-04-10".to_string()
}

fn default_clerk_js_version() -> String {
    "5.74.0".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36"
        .to_string()
}

fn default_timeout() -> u64 {
    30_000
}

/// Credential settings. The password never lives in the config file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CredentialsConfig {
    /// Account email (supports ${ENV_VAR} syntax).
    #[serde(default)]
    pub email: Option<String>,
}

impl CredentialsConfig {
    /// Configured email, if set to something other than blank.
    pub fn email(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }
}

/// Retry and throttling policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Query attempts per key.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Authentication attempts per (re-)authentication.
    #[serde(default = "default_max_auth_attempts")]
    pub max_auth_attempts: u32,

    /// First backoff delay in seconds, doubled on each transient failure.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_seconds: u64,

    /// Fixed pause after an HTTP 429.
    #[serde(default = "default_rate_limit_cooldown")]
    pub rate_limit_cooldown_seconds: u64,

    /// Pause after every key in a batch.
    #[serde(default = "default_inter_query_delay")]
    pub inter_query_delay_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            max_auth_attempts: default_max_auth_attempts(),
            initial_backoff_seconds: default_initial_backoff(),
            rate_limit_cooldown_seconds: default_rate_limit_cooldown(),
            inter_query_delay_seconds: default_inter_query_delay(),
        }
    }
}

fn default_max_attempts() -> u32 {
    4
}

fn default_max_auth_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    2
}

fn default_rate_limit_cooldown() -> u64 {
    60
}

fn default_inter_query_delay() -> u64 {
    2
}

/// Output settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Directory result files are written into. Created on demand.
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let expanded = expand_env_vars(content);
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }

        if self.retry.max_auth_attempts == 0 {
            anyhow::bail!("retry.max_auth_attempts must be at least 1");
        }

        if self.service.timeout_ms == 0 {
            anyhow::bail!("service.timeout_ms must be greater than 0");
        }

        self.service.auth_url()?;
        self.service.app_url()?;

        Ok(())
    }

    /// Generate example configuration YAML.
    pub fn example() -> String {
        r#"# Spur lookup configuration

service:
  auth_base: "https://clerk.spur.us"
  app_base: "https://app.spur.us"
  clerk_api_version: "2025-04-10"
  clerk_js_version: "5.74.0"
  timeout_ms: 30000

# The password is read from SPUR_PASSWORD or prompted for, never from here
credentials:
  email: "${SPUR_EMAIL}"

retry:
  max_attempts: 4                  # Query attempts per IP
  max_auth_attempts: 3             # Sign-in attempts per (re-)authentication
  initial_backoff_seconds: 2       # Doubled after each transient failure
  rate_limit_cooldown_seconds: 60  # Pause after HTTP 429
  inter_query_delay_seconds: 2     # Pause after every IP

output:
  directory: "output"
"#
        .to_string()
    }
}

fn parse_base_url(field: &str, value: &str) -> anyhow::Result<Url> {
    let url = Url::parse(value)
        .map_err(|e| anyhow::anyhow!("service.{} is not a valid URL ({}): {}", field, value, e))?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        anyhow::bail!("service.{} must be an http(s) URL with a host: {}", field, value);
    }

    Ok(url)
}

/// Expand environment variables in the format ${VAR_NAME}.
fn expand_env_vars(content: &str) -> String {
    let re = match regex::Regex::new(r"\$\{([^}]+)\}") {
        Ok(re) => re,
        Err(_) => return content.to_string(),
    };

    re.replace_all(content, |caps: &regex::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_default()
    })
    .into_owned()
}
