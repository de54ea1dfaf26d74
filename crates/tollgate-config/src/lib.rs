// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the Tollgate entitlement client.
//!
//! Settings come from compiled defaults, up to three `tollgate.toml` files
//! and `TOLLGATE_*` environment variables. Unknown keys are rejected, and
//! every problem found is reported at once as a miette diagnostic.

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::{Path, PathBuf};

pub use diagnostic::{ConfigError, TomlSource, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::TollgateConfig;

/// Loads the full hierarchy and validates the result.
pub fn load_and_validate() -> Result<TollgateConfig, Vec<ConfigError>> {
    finish(loader::load_config(), hierarchy_sources)
}

/// Loads one explicit file (plus env overrides) and validates the result.
pub fn load_and_validate_path(path: &Path) -> Result<TollgateConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_path(path), || {
        read_source(path.to_path_buf()).into_iter().collect()
    })
}

/// Loads inline TOML and validates the result.
pub fn load_and_validate_str(toml_content: &str) -> Result<TollgateConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_str(toml_content), || {
        vec![TomlSource::inline(toml_content)]
    })
}

/// Sources are only read back when extraction failed and spans are needed.
fn finish(
    loaded: Result<TollgateConfig, figment::Error>,
    sources: impl FnOnce() -> Vec<TomlSource>,
) -> Result<TollgateConfig, Vec<ConfigError>> {
    let config = loaded.map_err(|err| diagnostic::figment_to_config_errors(err, &sources()))?;
    validation::validate_config(&config)?;
    Ok(config)
}

fn read_source(path: PathBuf) -> Option<TomlSource> {
    let content = std::fs::read_to_string(&path).ok()?;
    Some(TomlSource::new(path.display().to_string(), content))
}

/// The files [`loader::build_figment`] reads, named the way figment reports them.
fn hierarchy_sources() -> Vec<TomlSource> {
    let local = std::env::current_dir()
        .map(|dir| dir.join("tollgate.toml"))
        .unwrap_or_else(|_| PathBuf::from("tollgate.toml"));
    let user = dirs::config_dir().map(|dir| dir.join("tollgate/tollgate.toml"));

    [Some(local), user, Some(PathBuf::from("/etc/tollgate/tollgate.toml"))]
        .into_iter()
        .flatten()
        .filter_map(read_source)
        .collect()
}
