//! Process configuration.
//!
//! Everything is read once at startup into [`Config`] and handed to the
//! components that need it.  Every option is both a command-line flag and an
//! environment variable; flags win.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::sink::Credentials;
use crate::source::rss_feed_url;

/// Default health-listener port when neither `PORT` nor
/// `RENDER_INTERNAL_PORT` is set.
pub const DEFAULT_PORT: u16 = 10000;

/// Default Nitter instance when neither `SOURCE_INSTANCE` nor
/// `NITTER_INSTANCE` is set.
pub const DEFAULT_INSTANCE: &str = "https://nitter.net";

/// Relay new posts of one Nitter account to a Telegram chat.
#[derive(Debug, Clone, Parser)]
#[command(name = "nitter-relay")]
#[command(version, about)]
pub struct Config {
    /// Telegram bot token; delivery is disabled without it
    #[arg(long, env = "TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Telegram chat id to deliver to
    #[arg(long, env = "CHAT_ID")]
    pub chat_id: Option<String>,

    /// Account to mirror
    #[arg(long, env = "TARGET_USERNAME", default_value = "cz_binance")]
    pub target_username: String,

    /// Nitter instance base URL [default: https://nitter.net]
    #[arg(long, env = "SOURCE_INSTANCE")]
    pub source_instance: Option<String>,

    /// Seconds between poll cycles
    #[arg(long, env = "POLL_INTERVAL", default_value_t = 15,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval: u64,

    /// Health listener port [default: 10000]
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Path of the delivery state file
    #[arg(long, env = "STATE_FILE", default_value = "state_nitter.json")]
    pub state_file: PathBuf,

    /// Telegram Bot API base URL
    #[arg(long, env = "TELEGRAM_API_BASE", default_value = "https://api.telegram.org")]
    pub telegram_api_base: String,

    /// Timeout in seconds for every outbound request
    #[arg(long, env = "HTTP_TIMEOUT", default_value_t = 20,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub http_timeout: u64,

    /// Run a single poll cycle and exit (no health listener)
    #[arg(long)]
    pub once: bool,
}

impl Config {
    /// Parse flags and environment, then apply the legacy variable names.
    pub fn load() -> Self {
        let mut config = Self::parse();
        config.apply_aliases(|key| std::env::var(key).ok());
        config
    }

    /// Fill unset options from older variable names
    /// (`TELEGRAM_TOKEN`, `TELEGRAM_CHAT_ID`, `NITTER_INSTANCE`,
    /// `RENDER_INTERNAL_PORT`).
    pub fn apply_aliases(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.token.is_none() {
            self.token = lookup("TELEGRAM_TOKEN");
        }
        if self.chat_id.is_none() {
            self.chat_id = lookup("TELEGRAM_CHAT_ID");
        }
        if self.source_instance.is_none() {
            self.source_instance = lookup("NITTER_INSTANCE");
        }
        if self.port.is_none() {
            self.port = lookup("RENDER_INTERNAL_PORT").and_then(|v| v.trim().parse().ok());
        }
    }

    pub fn source_instance(&self) -> &str {
        self.source_instance.as_deref().unwrap_or(DEFAULT_INSTANCE)
    }

    pub fn feed_url(&self) -> String {
        rss_feed_url(self.source_instance(), &self.target_username)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout)
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// Both token and chat id, or nothing.
    pub fn credentials(&self) -> Option<Credentials> {
        let token = self.token.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let chat_id = self.chat_id.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        Some(Credentials {
            token: token.to_string(),
            chat_id: chat_id.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
