//! Redis configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracking_core::limits::{REFERRER_TTL_SECS, SESSION_TTL_SECS};

/// Redis connection and key lifetime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Connection URL, e.g. `redis://localhost:6379/0`
    #[serde(default = "default_url")]
    pub url: String,
    /// Session list lifetime in seconds
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// Nonce to referrer lifetime in seconds
    #[serde(default = "default_referrer_ttl_secs")]
    pub referrer_ttl_secs: u64,
    /// Connect timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Keys fetched per SCAN round when reading a day
    #[serde(default = "default_scan_count")]
    pub scan_count: usize,
}

fn default_url() -> String {
    "redis://127.0.0.1:6379/0".to_string()
}

fn default_session_ttl_secs() -> u64 {
    SESSION_TTL_SECS
}

fn default_referrer_ttl_secs() -> u64 {
    REFERRER_TTL_SECS
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

fn default_scan_count() -> usize {
    500
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            session_ttl_secs: default_session_ttl_secs(),
            referrer_ttl_secs: default_referrer_ttl_secs(),
            connect_timeout_ms: default_connect_timeout_ms(),
            scan_count: default_scan_count(),
        }
    }
}

impl RedisConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
