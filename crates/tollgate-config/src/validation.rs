// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as URL schemes, non-empty paths, and non-zero windows.

use crate::diagnostic::ConfigError;
use crate::model::TollgateConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &TollgateConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let base_url = config.api.base_url.trim();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        errors.push(ConfigError::Validation {
            message: format!("api.base_url `{base_url}` must start with http:// or https://"),
        });
    }

    if config.api.request_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "api.request_timeout_secs must be at least 1".to_string(),
        });
    }

    if config.request.max_requests_per_minute == 0 {
        errors.push(ConfigError::Validation {
            message: "request.max_requests_per_minute must be at least 1".to_string(),
        });
    }

    if config.request.retry_delay_ms > config.request.max_backoff_ms {
        errors.push(ConfigError::Validation {
            message: format!(
                "request.retry_delay_ms ({}) must not exceed request.max_backoff_ms ({})",
                config.request.retry_delay_ms, config.request.max_backoff_ms
            ),
        });
    }

    if config.entitlement.resolution_timeout_ms == 0 {
        errors.push(ConfigError::Validation {
            message: "entitlement.resolution_timeout_ms must be at least 1".to_string(),
        });
    }

    if config.entitlement.staleness_threshold_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "entitlement.staleness_threshold_secs must be at least 1".to_string(),
        });
    }

    if config.realtime.enabled {
        let url = config.realtime.url.trim();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            errors.push(ConfigError::Validation {
                message: format!("realtime.url `{url}` must start with ws:// or wss://"),
            });
        }
        if config.realtime.reconnect_delay_ms > config.realtime.max_reconnect_delay_ms {
            errors.push(ConfigError::Validation {
                message: "realtime.reconnect_delay_ms must not exceed realtime.max_reconnect_delay_ms"
                    .to_string(),
            });
        }
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    let level = config.logging.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "logging.log_level `{}` is not one of {}",
                config.logging.log_level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&TollgateConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = TollgateConfig::default();
        config.api.base_url = "ftp://example.com".into();
        config.request.max_requests_per_minute = 0;
        config.storage.database_path = "  ".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn realtime_url_only_checked_when_enabled() {
        let mut config = TollgateConfig::default();
        config.realtime.url = "http://not-a-socket".into();
        assert!(validate_config(&config).is_err());
        config.realtime.enabled = false;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut config = TollgateConfig::default();
        config.logging.log_level = "verbose".into();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors[0].to_string().contains("logging.log_level"));
    }
}
