// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./tollgate.toml` > `~/.config/tollgate/tollgate.toml` >
//! `/etc/tollgate/tollgate.toml` with environment variable overrides via `TOLLGATE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::TollgateConfig;

/// Config sections, used to turn `TOLLGATE_<SECTION>_<KEY>` into `section.key`.
const SECTIONS: &[&str] = &["api", "request", "entitlement", "realtime", "storage", "logging"];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/tollgate/tollgate.toml` (system-wide)
/// 3. `~/.config/tollgate/tollgate.toml` (user XDG config)
/// 4. `./tollgate.toml` (local directory)
/// 5. `TOLLGATE_*` environment variables
pub fn load_config() -> Result<TollgateConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from an inline TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<TollgateConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TollgateConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<TollgateConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TollgateConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for hierarchical config loading.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(TollgateConfig::default()))
        .merge(Toml::file("/etc/tollgate/tollgate.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("tollgate/tollgate.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("tollgate.toml"))
        .merge(env_provider())
}

/// Environment provider mapping only the first underscore after the section name.
///
/// `TOLLGATE_REQUEST_MAX_REQUESTS_PER_MINUTE` must map to
/// `request.max_requests_per_minute`, so `Env::split("_")` cannot be used.
fn env_provider() -> Env {
    Env::prefixed("TOLLGATE_").map(|key| {
        let key_str = key.as_str().to_ascii_lowercase();
        let mapped = SECTIONS
            .iter()
            .find_map(|section| {
                key_str
                    .strip_prefix(*section)
                    .and_then(|rest| rest.strip_prefix('_'))
                    .map(|rest| format!("{section}.{rest}"))
            })
            .unwrap_or(key_str);
        mapped.into()
    })
}
