// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;

use tollgate_config::model::EntitlementConfig;

/// Resolver timing knobs.
#[derive(Debug, Clone, Copy)]
pub struct ResolverSettings {
    /// Age after which a positive cache record must be re-verified.
    pub staleness_threshold: Duration,
    /// Upper bound for one resolution, retries included.
    pub resolution_timeout: Duration,
    /// Window in which identical resolutions share one operation.
    pub debounce: Duration,
}

impl ResolverSettings {
    pub fn from_config(config: &EntitlementConfig) -> Self {
        Self {
            staleness_threshold: config.staleness_threshold(),
            resolution_timeout: config.resolution_timeout(),
            debounce: config.debounce(),
        }
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self::from_config(&EntitlementConfig::default())
    }
}
