//! Client configuration from environment variables.

use std::time::Duration;

use aeiouly_shared::{
    origin_for_host, ws_url, API_V1_PREFIX, NOTIFICATIONS_WS_PATH, ONLINE_WS_PATH,
};

use crate::ws::{ReconnectConfig, DEFAULT_LOG_CAPACITY};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name}: invalid value {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
    #[error("cannot derive a websocket URL from {0:?}; expected an http(s) origin")]
    BaseUrl(String),
}

/// Settings for the realtime client and the auth REST client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// API origin; its scheme picks `ws` or `wss`
    pub base_url: String,
    pub api_prefix: String,
    pub ws_path: String,
    pub reconnect: ReconnectConfig,
    pub log_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_prefix: API_V1_PREFIX.to_string(),
            ws_path: NOTIFICATIONS_WS_PATH.to_string(),
            reconnect: ReconnectConfig::default(),
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Read configuration from the process environment.
    ///
    /// Environment variables:
    /// - `AEIOULY_BASE_URL` (default: "http://localhost:8000"); a bare host gets
    ///   `http` when local, `https` otherwise
    /// - `AEIOULY_API_PREFIX` (default: "/api/v1")
    /// - `AEIOULY_WS_PATH` (default: "/notifications/ws"); `notifications` and
    ///   `online` are accepted as shorthands
    /// - `AEIOULY_RECONNECT_DELAY_MS` (default: 3000)
    /// - `AEIOULY_RECONNECT_MAX_ATTEMPTS` (default: 0, unlimited)
    /// - `AEIOULY_RECONNECT_BACKOFF` (default: 1.0, fixed delay)
    /// - `AEIOULY_RECONNECT_MAX_DELAY_MS` (default: 30000, only used with backoff)
    /// - `AEIOULY_LOG_CAPACITY` (default: 500)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let base_url = var("AEIOULY_BASE_URL")
            .map(|v| origin_for_host(&v))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let api_prefix = var("AEIOULY_API_PREFIX").unwrap_or_else(|| API_V1_PREFIX.to_string());
        let ws_path = match var("AEIOULY_WS_PATH").as_deref().map(str::trim) {
            None | Some("notifications") => NOTIFICATIONS_WS_PATH.to_string(),
            Some("online") => ONLINE_WS_PATH.to_string(),
            Some(path) => path.to_string(),
        };

        let delay_ms: u64 = parse(&var, "AEIOULY_RECONNECT_DELAY_MS", 3000)?;
        let max_attempts: u32 = parse(&var, "AEIOULY_RECONNECT_MAX_ATTEMPTS", 0)?;
        let backoff: f64 = parse(&var, "AEIOULY_RECONNECT_BACKOFF", 1.0)?;
        let max_delay_ms: u64 = parse(&var, "AEIOULY_RECONNECT_MAX_DELAY_MS", 30_000)?;
        let log_capacity: usize = parse(&var, "AEIOULY_LOG_CAPACITY", DEFAULT_LOG_CAPACITY)?;

        if !backoff.is_finite() || backoff < 1.0 {
            return Err(ConfigError::Invalid {
                name: "AEIOULY_RECONNECT_BACKOFF",
                value: backoff.to_string(),
                reason: "must be a number >= 1.0".to_string(),
            });
        }
        if log_capacity == 0 {
            return Err(ConfigError::Invalid {
                name: "AEIOULY_LOG_CAPACITY",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let initial_delay = Duration::from_millis(delay_ms);
        let reconnect = if backoff > 1.0 {
            ReconnectConfig {
                max_attempts,
                initial_delay,
                max_delay: Duration::from_millis(max_delay_ms).max(initial_delay),
                backoff_multiplier: backoff,
                jitter: ReconnectConfig::hardened().jitter,
            }
        } else {
            ReconnectConfig {
                max_attempts,
                ..ReconnectConfig::fixed(initial_delay)
            }
        };

        let config = Self {
            base_url,
            api_prefix,
            ws_path,
            reconnect,
            log_capacity,
        };
        config.ws_url()?;
        Ok(config)
    }

    /// Realtime endpoint, `ws`/`wss` mirroring the base URL's scheme
    pub fn ws_url(&self) -> Result<String, ConfigError> {
        ws_url(&self.base_url, &self.ws_path)
            .ok_or_else(|| ConfigError::BaseUrl(self.base_url.clone()))
    }
}

fn parse<T, F>(var: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = var(name) else {
        return Ok(default);
    };
    let parsed = value.trim().parse::<T>();
    parsed.map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
        value,
    })
}
