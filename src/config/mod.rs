//! Configuration management.
//!
//! Settings come from an optional TOML file, overridden by `SCHOLAR_HARVEST_*`
//! environment variables (nested keys joined with `__`, e.g.
//! `SCHOLAR_HARVEST_RATE_LIMIT__PAUSE_SECONDS=5`).
//!
//! ```toml
//! [http]
//! timeout_seconds = 30
//! user_agent = "scholar-harvest/0.1.0"
//!
//! [retry]
//! max_attempts = 3
//! initial_delay_ms = 1000
//! max_delay_ms = 30000
//! backoff_multiplier = 2.0
//! max_total_seconds = 120
//!
//! [rate_limit]
//! pause_seconds = 60
//!
//! [store]
//! save_every = 1
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sources::SourceError;
use crate::utils::{HttpClient, RetryConfig};

/// File name looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "scholar-harvest.toml";

const ENV_PREFIX: &str = "SCHOLAR_HARVEST";

/// Application settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub http: HttpSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    #[serde(default)]
    pub store: StoreSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Transport retry for connection failures and 5xx responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_max_total_seconds")]
    pub max_total_seconds: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_total_seconds: default_max_total_seconds(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_total_seconds() -> u64 {
    120
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Pause after a provider signals a rate limit
    #[serde(default = "default_pause_seconds")]
    pub pause_seconds: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            pause_seconds: default_pause_seconds(),
        }
    }
}

fn default_pause_seconds() -> u64 {
    60
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Save the results file every N changes; 0 saves once per page only
    #[serde(default = "default_save_every")]
    pub save_every: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            save_every: default_save_every(),
        }
    }
}

fn default_save_every() -> usize {
    1
}

impl Settings {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry.max_attempts.max(1),
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            backoff_multiplier: self.retry.backoff_multiplier,
            max_total_time: Duration::from_secs(self.retry.max_total_seconds),
        }
    }

    pub fn rate_limit_pause(&self) -> Duration {
        Duration::from_secs(self.rate_limit.pause_seconds)
    }

    /// HTTP transport configured from these settings
    pub fn http_client(&self) -> Result<HttpClient, SourceError> {
        Ok(HttpClient::with_user_agent(
            &self.http.user_agent,
            Duration::from_secs(self.http.timeout_seconds),
        )?
        .with_retry(self.retry_config()))
    }

    /// Reject values that would make the retry loop misbehave
    pub fn validate(&self) -> Result<(), ConfigFileError> {
        let multiplier = self.retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConfigFileError::Invalid(format!(
                "retry.backoff_multiplier must be at least 1.0, got {}",
                multiplier
            )));
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return Err(ConfigFileError::Invalid(format!(
                "retry.max_delay_ms ({}) is below retry.initial_delay_ms ({})",
                self.retry.max_delay_ms, self.retry.initial_delay_ms
            )));
        }
        Ok(())
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigFileError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// Load settings from `path` (if given) and the environment
pub fn load_config(path: Option<&Path>) -> Result<Settings, ConfigFileError> {
    load_config_with_env(path, None)
}

/// [`load_config`] with an explicit environment map instead of the process environment
pub fn load_config_with_env(
    path: Option<&Path>,
    env: Option<config::Map<String, String>>,
) -> Result<Settings, ConfigFileError> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(
            config::File::from(path)
                .format(config::FileFormat::Toml)
                .required(true),
        );
    }
    let settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        )
        .build()?;

    let settings: Settings = settings.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

/// Find a settings file: `./scholar-harvest.toml`, then the user config directory
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|dir| dir.join("scholar-harvest").join("config.toml"))
        .filter(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.rate_limit.pause_seconds, 60);
        assert_eq!(settings.store.save_every, 1);
        assert_eq!(settings.retry_config().max_attempts, 3);
        assert!(settings.http.user_agent.starts_with("scholar-harvest/"));
    }

    #[test]
    fn test_load_without_sources_gives_defaults() {
        let settings = load_config_with_env(None, Some(config::Map::new())).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_load_file_with_env_override() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[rate_limit]
pause_seconds = 5

[retry]
max_attempts = 7
"#,
        )
        .unwrap();

        let mut env = config::Map::new();
        env.insert(
            "SCHOLAR_HARVEST_STORE__SAVE_EVERY".to_string(),
            "10".to_string(),
        );
        env.insert(
            "SCHOLAR_HARVEST_RATE_LIMIT__PAUSE_SECONDS".to_string(),
            "2".to_string(),
        );

        let settings = load_config_with_env(Some(&path), Some(env)).unwrap();
        assert_eq!(settings.rate_limit_pause(), Duration::from_secs(2));
        assert_eq!(settings.retry.max_attempts, 7);
        assert_eq!(settings.retry.initial_delay_ms, 1000);
        assert_eq!(settings.store.save_every, 10);
    }

    #[test]
    fn test_negative_backoff_multiplier_is_rejected() {
        let mut env = config::Map::new();
        env.insert(
            "SCHOLAR_HARVEST_RETRY__BACKOFF_MULTIPLIER".to_string(),
            "-2.0".to_string(),
        );
        let result = load_config_with_env(None, Some(env));
        assert!(matches!(result, Err(ConfigFileError::Invalid(ref msg)) if msg.contains("backoff_multiplier")));

        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[retry]\nbackoff_multiplier = 0.5\n").unwrap();
        assert!(matches!(
            load_config_with_env(Some(&path), Some(config::Map::new())),
            Err(ConfigFileError::Invalid(_))
        ));
    }

    #[test]
    fn test_max_delay_below_initial_delay_is_rejected() {
        let mut settings = Settings::default();
        settings.retry.initial_delay_ms = 5000;
        settings.retry.max_delay_ms = 100;
        assert!(matches!(settings.validate(), Err(ConfigFileError::Invalid(_))));
    }

    #[test]
    fn test_http_client_uses_retry_settings() {
        let mut settings = Settings::default();
        settings.retry.max_attempts = 5;
        let client = settings.http_client().unwrap();
        assert_eq!(client.retry_config(), settings.retry_config());
        assert_eq!(client.retry_config().max_attempts, 5);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempdir().unwrap();
        let result = load_config_with_env(Some(&dir.path().join("nope.toml")), Some(config::Map::new()));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[rate_limit\npause_seconds = ").unwrap();
        assert!(load_config_with_env(Some(&path), Some(config::Map::new())).is_err());
    }

    #[test]
    fn test_toml_rendering_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let rendered = Settings::default().to_toml().unwrap();
        assert!(rendered.contains("[rate_limit]"));
        std::fs::write(&path, rendered).unwrap();

        let settings = load_config_with_env(Some(&path), Some(config::Map::new())).unwrap();
        assert_eq!(settings, Settings::default());
    }
}
