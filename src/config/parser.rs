use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::ConfigError;
use crate::cli::Cli;

/// Looked up in order in the working directory when no path is given.
const DEFAULT_CONFIG_FILES: [&str; 2] = ["config.yaml", "config.json"];

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub meetup: MeetupConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Flat keys of the older `config.json` layout, folded into their
    /// sections when the file is read.
    #[serde(flatten)]
    legacy: LegacyKeys,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
struct LegacyKeys {
    #[serde(alias = "APIKey", default, skip_serializing_if = "Option::is_none")]
    apikey: Option<String>,
    #[serde(alias = "Token", default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MeetupConfig {
    #[serde(alias = "apikey", default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_events_page_size")]
    pub events_page_size: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl Default for MeetupConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            events_page_size: default_events_page_size(),
            request_timeout: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(alias = "token", default)]
    pub bot_token: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(alias = "url", default = "default_database_file")]
    pub filename: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            filename: default_database_file(),
        }
    }
}

impl DatabaseConfig {
    pub fn sqlite_path(&self) -> String {
        self.filename
            .strip_prefix("sqlite://")
            .unwrap_or(&self.filename)
            .to_string()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(alias = "console", default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LimitsConfig {
    /// Milliseconds to wait before each outbound Discord message.
    #[serde(default)]
    pub discord_send_delay: u64,
}

impl Config {
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        Self::load_with(cli, |key| std::env::var(key).ok())
    }

    /// Resolves the config from file, then environment, then flags. `env` is
    /// the environment lookup so callers can supply their own.
    pub fn load_with<F>(cli: &Cli, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let explicit_path = cli
            .config
            .clone()
            .or_else(|| env("CONFIG_PATH").map(PathBuf::from));

        let mut config = match explicit_path.or_else(|| default_config_path(Path::new("."))) {
            Some(path) => Self::read_file(&path)?,
            None => {
                info!(
                    "no config file found ({}), using environment and flags only",
                    DEFAULT_CONFIG_FILES.join(", ")
                );
                Config::default()
            }
        };

        config.apply_env_overrides(&env);
        config.apply_cli_overrides(cli);
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::read_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Config::default());
        }
        let mut config: Config = serde_yaml::from_str(&content)?;
        config.absorb_legacy_keys();
        Ok(config)
    }

    /// Section values win over the flat legacy keys.
    fn absorb_legacy_keys(&mut self) {
        if let Some(api_key) = self.legacy.apikey.take() {
            if self.meetup.api_key.is_empty() {
                self.meetup.api_key = api_key;
            }
        }
        if let Some(token) = self.legacy.token.take() {
            if self.auth.bot_token.is_empty() {
                self.auth.bot_token = token;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.meetup.api_key.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "meetup.api_key cannot be empty".to_string(),
            ));
        }

        if self.auth.bot_token.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "auth.bot_token cannot be empty".to_string(),
            ));
        }

        if url::Url::parse(&self.meetup.base_url).is_err() {
            return Err(ConfigError::InvalidConfig(format!(
                "meetup.base_url is not a valid url: {}",
                self.meetup.base_url
            )));
        }

        if self.meetup.events_page_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "meetup.events_page_size must be at least 1".to_string(),
            ));
        }

        if self.database.sqlite_path().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "database.filename cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides<F>(&mut self, env: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = env("MEETUP_API_KEY").or_else(|| env("APIKey")) {
            self.meetup.api_key = value;
        }
        if let Some(value) = env("MEETUP_BASE_URL") {
            self.meetup.base_url = value;
        }
        if let Some(value) = env("DISCORD_BOT_TOKEN").or_else(|| env("Token")) {
            self.auth.bot_token = value;
        }
        if let Some(value) = env("DATABASE_FILE") {
            self.database.filename = value;
        }
        if let Some(value) = env("LOG_LEVEL") {
            self.logging.level = value;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &Cli) {
        if let Some(value) = &cli.api_key {
            self.meetup.api_key = value.clone();
        }
        if let Some(value) = &cli.token {
            self.auth.bot_token = value.clone();
        }
        if let Some(value) = &cli.database {
            self.database.filename = value.clone();
        }
        if let Some(value) = &cli.log_level {
            self.logging.level = value.clone();
        }
    }
}

fn default_config_path(dir: &Path) -> Option<PathBuf> {
    DEFAULT_CONFIG_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
}

fn default_base_url() -> String {
    "https://api.meetup.com".to_string()
}

fn default_events_page_size() -> u32 {
    25
}

fn default_request_timeout() -> u64 {
    30
}

fn default_database_file() -> String {
    "settings.db".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
