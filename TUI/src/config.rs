//! Application configuration and command line.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use tracing::Level;

use crate::exchange::ExchangeOrdering;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_FOCUS_DELAY_MS: u64 = 150;

#[derive(Debug, Clone)]
pub struct Config {
    /// Origin of the chat backend, without a trailing slash
    pub base_url: String,

    pub chat_path: String,

    pub health_path: String,

    /// Per-request timeout; an exchange that exceeds it settles as a network error
    pub request_timeout_ms: u64,

    /// Delay between opening the panel and focusing the input
    pub focus_delay_ms: u64,

    /// Main loop tick rate in milliseconds (target 60 FPS = ~16ms)
    pub tick_rate_ms: u64,

    /// Lines to scroll per key press
    pub scroll_step: usize,

    pub ordering: ExchangeOrdering,

    pub log_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_path: "/chat".to_string(),
            health_path: "/health".to_string(),
            request_timeout_ms: DEFAULT_TIMEOUT_MS,
            focus_delay_ms: DEFAULT_FOCUS_DELAY_MS,
            tick_rate_ms: 16,
            scroll_step: 3,
            ordering: ExchangeOrdering::Concurrent,
            log_file: PathBuf::from("chatpanel.log"),
        }
    }
}

impl Config {
    pub fn chat_url(&self) -> String {
        join_url(&self.base_url, &self.chat_path)
    }

    pub fn health_url(&self) -> String {
        join_url(&self.base_url, &self.health_path)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }

    pub fn focus_delay(&self) -> Duration {
        Duration::from_millis(self.focus_delay_ms)
    }

    pub fn tick_rate(&self) -> Duration {
        Duration::from_millis(self.tick_rate_ms.max(1))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("backend url is empty")]
    EmptyBaseUrl,
    #[error("backend url must start with http:// or https://, got `{0}`")]
    InvalidBaseUrl(String),
}

pub fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ConfigError::EmptyBaseUrl);
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ConfigError::InvalidBaseUrl(trimmed.to_string()));
    }
    Ok(trimmed.to_string())
}

fn join_url(base: &str, path: &str) -> String {
    let path = path.trim();
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

#[derive(Debug, Parser)]
#[command(author, version, about = "Terminal chat panel for a single /chat backend", long_about = None)]
pub struct Cli {
    /// Backend origin that serves /chat and /health
    #[clap(long, env = "CHATPANEL_URL", default_value = DEFAULT_BASE_URL)]
    pub url: String,

    #[clap(long, env = "CHATPANEL_TIMEOUT_MS", default_value_t = DEFAULT_TIMEOUT_MS)]
    pub timeout_ms: u64,

    #[clap(long, default_value_t = DEFAULT_FOCUS_DELAY_MS)]
    pub focus_delay_ms: u64,

    /// Keep one exchange in flight at a time so replies render in submission order
    #[clap(long)]
    pub serialize: bool,

    #[clap(long, env = "CHATPANEL_LOG", default_value = "chatpanel.log")]
    pub log_file: PathBuf,

    #[clap(long, default_value_t = Level::INFO)]
    pub level: Level,
}

impl Cli {
    pub fn config(&self) -> Result<Config, ConfigError> {
        let ordering = if self.serialize {
            ExchangeOrdering::Serialized
        } else {
            ExchangeOrdering::Concurrent
        };

        Ok(Config {
            base_url: normalize_base_url(&self.url)?,
            request_timeout_ms: self.timeout_ms,
            focus_delay_ms: self.focus_delay_ms,
            ordering,
            log_file: self.log_file.clone(),
            ..Config::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url_trims() {
        assert_eq!(
            normalize_base_url("  http://localhost:5000/ "),
            Ok("http://localhost:5000".to_string())
        );
    }

    #[test]
    fn test_normalize_base_url_rejects_bad_input() {
        assert_eq!(normalize_base_url("   "), Err(ConfigError::EmptyBaseUrl));
        assert!(matches!(
            normalize_base_url("localhost:5000"),
            Err(ConfigError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn test_endpoint_urls() {
        let config = Config {
            base_url: "https://bot.example.com".to_string(),
            ..Config::default()
        };
        assert_eq!(config.chat_url(), "https://bot.example.com/chat");
        assert_eq!(config.health_url(), "https://bot.example.com/health");
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["chatpanel"]);
        let config = cli.config().unwrap();

        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.request_timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.ordering, ExchangeOrdering::Concurrent);
    }

    #[test]
    fn test_cli_serialize_flag() {
        let cli = Cli::parse_from(["chatpanel", "--serialize", "--url", "http://10.0.0.2:8080/"]);
        let config = cli.config().unwrap();

        assert_eq!(config.ordering, ExchangeOrdering::Serialized);
        assert_eq!(config.base_url, "http://10.0.0.2:8080");
    }
}
