// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide configuration for the reply/fulfillment engine.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the xianyu-agent engine.
#[derive(Debug, Clone, clap::Parser)]
pub struct EngineConfig {
    /// Path to the SQLite database file.
    #[arg(long, default_value = "./xianyu-agent.db", env = "XIANYU_DATABASE_PATH")]
    pub database_path: PathBuf,

    /// Log level filter, e.g. `info`, `debug`, `xianyu_agent=trace`.
    #[arg(long, default_value = "info", env = "XIANYU_LOG_LEVEL")]
    pub log_level: String,

    /// Base URL for the marketplace's signed HTTPS APIs.
    #[arg(long, default_value = "https://h5api.m.goofish.com", env = "XIANYU_API_BASE_URL")]
    pub api_base_url: String,

    /// Marketplace WebSocket endpoint.
    #[arg(long, default_value = "wss://wss-goofish.im.alicdn.com/", env = "XIANYU_WS_URL")]
    pub ws_url: String,

    /// Heartbeat send interval, seconds.
    #[arg(long, default_value_t = 15, env = "XIANYU_HEARTBEAT_INTERVAL_SECS")]
    pub heartbeat_interval_secs: u64,

    /// Heartbeat ack timeout, seconds. If no ack is seen within this window
    /// (measured as a multiple of the heartbeat interval), force a reconnect.
    #[arg(long, default_value_t = 30, env = "XIANYU_HEARTBEAT_TIMEOUT_SECS")]
    pub heartbeat_timeout_secs: u64,

    /// Minimum age of `current_token` before a call-time refresh is forced.
    #[arg(long, default_value_t = 3600, env = "XIANYU_TOKEN_REFRESH_INTERVAL_SECS")]
    pub token_refresh_interval_secs: u64,

    /// Delay before retrying a failed background token refresh.
    #[arg(long, default_value_t = 300, env = "XIANYU_TOKEN_RETRY_INTERVAL_SECS")]
    pub token_retry_interval_secs: u64,

    /// WebSocket connect timeout, seconds.
    #[arg(long, default_value_t = 10, env = "XIANYU_WS_CONNECT_TIMEOUT_SECS")]
    pub ws_connect_timeout_secs: u64,

    /// Initial reconnect backoff, milliseconds.
    #[arg(long, default_value_t = 1000, env = "XIANYU_RECONNECT_BACKOFF_INITIAL_MS")]
    pub reconnect_backoff_initial_ms: u64,

    /// Reconnect backoff ceiling, milliseconds.
    #[arg(long, default_value_t = 60_000, env = "XIANYU_RECONNECT_BACKOFF_MAX_MS")]
    pub reconnect_backoff_max_ms: u64,

    /// Whether the external reply API (§4.6 step 1) is enabled.
    #[arg(long, default_value_t = false, env = "XIANYU_AUTO_FETCH_ENABLED")]
    pub auto_fetch_enabled: bool,

    /// External reply API URL.
    #[arg(long, env = "XIANYU_AUTO_FETCH_API_URL")]
    pub auto_fetch_api_url: Option<String>,

    /// External reply API timeout, seconds.
    #[arg(long, default_value_t = 10, env = "XIANYU_AUTO_FETCH_TIMEOUT_SECS")]
    pub auto_fetch_timeout_secs: u64,

    /// Max concurrent in-flight external reply API calls.
    #[arg(long, default_value_t = 8, env = "XIANYU_AUTO_FETCH_MAX_CONCURRENT")]
    pub auto_fetch_max_concurrent: usize,

    /// Delay before retrying a failed external reply API call.
    #[arg(long, default_value_t = 2, env = "XIANYU_AUTO_FETCH_RETRY_DELAY_SECS")]
    pub auto_fetch_retry_delay_secs: u64,
}

impl EngineConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn token_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.token_refresh_interval_secs)
    }

    pub fn token_retry_interval(&self) -> Duration {
        Duration::from_secs(self.token_retry_interval_secs)
    }

    pub fn ws_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.ws_connect_timeout_secs)
    }

    pub fn reconnect_backoff_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_initial_ms)
    }

    pub fn reconnect_backoff_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_max_ms)
    }

    #[cfg(test)]
    pub fn test_default() -> Self {
        EngineConfig {
            database_path: PathBuf::from(":memory:"),
            log_level: "info".to_owned(),
            api_base_url: "https://h5api.m.goofish.com".to_owned(),
            ws_url: "wss://wss-goofish.im.alicdn.com/".to_owned(),
            heartbeat_interval_secs: 15,
            heartbeat_timeout_secs: 30,
            token_refresh_interval_secs: 3600,
            token_retry_interval_secs: 300,
            ws_connect_timeout_secs: 10,
            reconnect_backoff_initial_ms: 1000,
            reconnect_backoff_max_ms: 60_000,
            auto_fetch_enabled: false,
            auto_fetch_api_url: None,
            auto_fetch_timeout_secs: 10,
            auto_fetch_max_concurrent: 8,
            auto_fetch_retry_delay_secs: 2,
        }
    }
}
