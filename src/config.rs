use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = ".issue-notifier.toml";

pub const GITHUB_TOKEN_VAR: &str = "GITHUB_TOKEN";
pub const TELEGRAM_BOT_TOKEN_VAR: &str = "TELEGRAM_BOT_TOKEN";
pub const TELEGRAM_CHAT_ID_VAR: &str = "TELEGRAM_CHAT_ID";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Missing required secret: set the {0} environment variable")]
    MissingSecret(&'static str),
}

/// Top-level configuration loaded from .issue-notifier.toml.
/// Every field has a default, so the tool runs with no file at all as long
/// as the secrets are in the environment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub poll: PollConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// GitHub API token. If None, falls back to GITHUB_TOKEN env var.
    pub token: Option<String>,
    pub api_url: String,
    /// Page size for the issue listing; only the first page is read.
    pub per_page: u32,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: "https://api.github.com".to_string(),
            per_page: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token from BotFather. If None, falls back to TELEGRAM_BOT_TOKEN.
    pub bot_token: Option<String>,
    /// Destination chat. If None, falls back to TELEGRAM_CHAT_ID.
    pub chat_id: Option<String>,
    pub api_url: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            api_url: "https://api.telegram.org".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub repos_file: PathBuf,
    pub state_file: PathBuf,
    /// Sleep between cycles
    pub interval_secs: u64,
    /// Minimum spacing between GitHub requests
    pub request_delay_secs: u64,
    /// Record the current newest issue of a never-seen repository instead of
    /// notifying its whole backlog.
    pub baseline_new_repos: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            repos_file: PathBuf::from("github_repo_links.txt"),
            state_file: PathBuf::from("last_known_issues.json"),
            interval_secs: 60,
            request_delay_secs: 1,
            baseline_new_repos: false,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_secs(self.request_delay_secs)
    }
}

/// Credentials needed before polling can start.
#[derive(Clone)]
pub struct Secrets {
    pub github_token: String,
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("github_token", &"***")
            .field("telegram_bot_token", &"***")
            .field("telegram_chat_id", &self.telegram_chat_id)
            .finish()
    }
}

impl Config {
    /// Load configuration from `path`, or from .issue-notifier.toml in the
    /// current directory. Returns default config if the file doesn't exist.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Resolve all three secrets from the process environment.
    pub fn secrets(&self) -> Result<Secrets, ConfigError> {
        self.secrets_with(|name| std::env::var(name).ok())
    }

    /// Resolve secrets: config file values take precedence, `env` supplies
    /// the rest. Blank values count as missing.
    pub fn secrets_with<F>(&self, env: F) -> Result<Secrets, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let resolve = |configured: &Option<String>, var: &'static str| {
            configured
                .clone()
                .or_else(|| env(var))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::MissingSecret(var))
        };

        Ok(Secrets {
            github_token: resolve(&self.github.token, GITHUB_TOKEN_VAR)?,
            telegram_bot_token: resolve(&self.telegram.bot_token, TELEGRAM_BOT_TOKEN_VAR)?,
            telegram_chat_id: resolve(&self.telegram.chat_id, TELEGRAM_CHAT_ID_VAR)?,
        })
    }
}
