// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for Tollgate.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Tollgate configuration.
///
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TollgateConfig {
    /// Backend API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Request execution layer: caching, dedup, rate limiting, retry.
    #[serde(default)]
    pub request: RequestConfig,

    /// Entitlement resolution thresholds.
    #[serde(default)]
    pub entitlement: EntitlementConfig,

    /// Real-time push channel settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Local cache database settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    /// Base URL that `/purchases/...` and `/question-sets` are resolved against.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-attempt HTTP timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_base_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_request_timeout_secs() -> u64 {
    15
}

/// Request execution layer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RequestConfig {
    /// Maximum requests per URL inside the sliding 60 second window.
    #[serde(default = "default_max_requests_per_minute")]
    pub max_requests_per_minute: usize,

    /// In-flight requests older than this are not joined by new callers.
    #[serde(default = "default_dedup_timeout_ms")]
    pub dedup_timeout_ms: u64,

    /// Retries after the first attempt for retryable failures.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Base delay for exponential backoff.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Upper bound for a single backoff delay.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Response cache TTL when a caller does not specify one.
    #[serde(default = "default_cache_ttl_ms")]
    pub default_cache_ttl_ms: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: default_max_requests_per_minute(),
            dedup_timeout_ms: default_dedup_timeout_ms(),
            retries: default_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            default_cache_ttl_ms: default_cache_ttl_ms(),
        }
    }
}

fn default_max_requests_per_minute() -> usize {
    60
}

fn default_dedup_timeout_ms() -> u64 {
    10_000
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_cache_ttl_ms() -> u64 {
    5 * 60 * 1_000
}

/// Entitlement resolution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EntitlementConfig {
    /// Cached positive records older than this are re-verified.
    #[serde(default = "default_staleness_threshold_secs")]
    pub staleness_threshold_secs: u64,

    /// Response cache TTL for remote access checks.
    #[serde(default = "default_remote_ttl_secs")]
    pub remote_ttl_secs: u64,

    /// Wall-clock budget for one resolution attempt including retries.
    #[serde(default = "default_resolution_timeout_ms")]
    pub resolution_timeout_ms: u64,

    /// Window in which identical resolution requests are coalesced.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for EntitlementConfig {
    fn default() -> Self {
        Self {
            staleness_threshold_secs: default_staleness_threshold_secs(),
            remote_ttl_secs: default_remote_ttl_secs(),
            resolution_timeout_ms: default_resolution_timeout_ms(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl EntitlementConfig {
    pub fn staleness_threshold(&self) -> Duration {
        Duration::from_secs(self.staleness_threshold_secs)
    }

    pub fn remote_ttl(&self) -> Duration {
        Duration::from_secs(self.remote_ttl_secs)
    }

    pub fn resolution_timeout(&self) -> Duration {
        Duration::from_millis(self.resolution_timeout_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn default_staleness_threshold_secs() -> u64 {
    30 * 60
}

fn default_remote_ttl_secs() -> u64 {
    60
}

fn default_resolution_timeout_ms() -> u64 {
    10_000
}

fn default_debounce_ms() -> u64 {
    5_000
}

/// Real-time push channel configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RealtimeConfig {
    /// Connect to the push channel at all.
    #[serde(default = "default_realtime_enabled")]
    pub enabled: bool,

    /// WebSocket endpoint.
    #[serde(default = "default_realtime_url")]
    pub url: String,

    /// First reconnect delay; doubles on every failed attempt.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Cap for the reconnect delay.
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: default_realtime_enabled(),
            url: default_realtime_url(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_delay_ms: default_max_reconnect_delay_ms(),
        }
    }
}

fn default_realtime_enabled() -> bool {
    true
}

fn default_realtime_url() -> String {
    "ws://localhost:3000/ws".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    1_000
}

fn default_max_reconnect_delay_ms() -> u64 {
    30_000
}

/// Local cache database configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("tollgate").join("tollgate.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("tollgate.db"))
        .to_string_lossy()
        .to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
