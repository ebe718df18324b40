use dotenvy::dotenv;
use std::env;
use std::time::Duration;

use crate::error::{Result, SyncError};
use crate::feed::{HttpPollFeed, WsPushFeed};
use crate::http::ApiClient;
use crate::sync::{ReconnectPolicy, SyncOptions, DEFAULT_POLL_INTERVAL};
use crate::types::Scope;

/// Synchronizer configuration loaded from environment variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub base_url: String,
    pub scope: Scope,
    pub poll_interval: Duration,
    pub push: bool,
    pub cookie: Option<String>,
    pub reconnect: bool,
    pub reconnect_max: Duration,
}

impl SyncConfig {
    /// Defaults for everything except the site URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            scope: Scope::Global,
            poll_interval: DEFAULT_POLL_INTERVAL,
            push: true,
            cookie: None,
            reconnect: false,
            reconnect_max: Duration::from_secs(60),
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset and empty values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let base_url = get("GRUMBLR_BASE_URL")
            .ok_or_else(|| SyncError::Config("GRUMBLR_BASE_URL must be set".into()))?;
        let mut config = Self::new(base_url);

        if let Some(scope) = get("GRUMBLR_SCOPE") {
            config.scope = scope.parse()?;
        }
        if let Some(secs) = get("GRUMBLR_POLL_INTERVAL_SECS") {
            config.poll_interval = Duration::from_secs(parse_secs("GRUMBLR_POLL_INTERVAL_SECS", &secs)?);
        }
        if let Some(push) = get("GRUMBLR_PUSH") {
            config.push = parse_bool("GRUMBLR_PUSH", &push)?;
        }
        config.cookie = get("GRUMBLR_COOKIE");
        if let Some(reconnect) = get("GRUMBLR_RECONNECT") {
            config.reconnect = parse_bool("GRUMBLR_RECONNECT", &reconnect)?;
        }
        if let Some(secs) = get("GRUMBLR_RECONNECT_MAX_SECS") {
            config.reconnect_max = Duration::from_secs(parse_secs("GRUMBLR_RECONNECT_MAX_SECS", &secs)?);
        }

        Ok(config)
    }

    pub fn api_client(&self) -> Result<ApiClient> {
        let client = ApiClient::new(&self.base_url)?;
        Ok(match &self.cookie {
            Some(cookie) => client.with_cookies(cookie.as_str()),
            None => client,
        })
    }

    pub fn poll_feed(&self) -> Result<HttpPollFeed> {
        Ok(HttpPollFeed::new(self.api_client()?, self.scope.clone()))
    }

    /// `None` when push is turned off or the scope cannot use it.
    pub fn push_feed(&self) -> Result<Option<WsPushFeed>> {
        if !self.push || !self.scope.supports_push() {
            return Ok(None);
        }
        WsPushFeed::from_client(&self.api_client()?).map(Some)
    }

    pub fn sync_options(&self) -> SyncOptions {
        let reconnect = if self.reconnect {
            ReconnectPolicy::exponential(self.reconnect_max)
        } else {
            ReconnectPolicy::disabled()
        };
        SyncOptions {
            poll_interval: self.poll_interval,
            reconnect,
        }
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(SyncError::Config(format!(
            "{} must be a positive number of seconds, got '{}'",
            key, value
        ))),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SyncError::Config(format!(
            "{} must be true or false, got '{}'",
            key, value
        ))),
    }
}
