// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns figment extraction failures into miette diagnostics.
//!
//! Unknown keys get a "did you mean" hint and, when the offending TOML text
//! is available, a labelled span on the key. Type errors point at the value.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use std::io::IsTerminal;

use figment::error::Kind;
use miette::{Diagnostic, GraphicalReportHandler, GraphicalTheme, NamedSource, SourceSpan};
use thiserror::Error;

/// Jaro-Winkler score a candidate key needs before it is offered as a fix.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// Name under which inline (non-file) TOML is shown in diagnostics.
pub const INLINE_SOURCE: &str = "<inline>";

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown key `{key}` in {}", section_label(.section.as_deref()))]
    #[diagnostic(
        code(tollgate::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        /// Table the key appeared in; `None` for a top-level key.
        section: Option<String>,
        /// Closest valid key, if any is close enough.
        suggestion: Option<String>,
        valid_keys: Vec<String>,
        #[label("not a tollgate setting")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("`{key}` has the wrong type: found {found}")]
    #[diagnostic(code(tollgate::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        key: String,
        found: String,
        expected: String,
        #[label("wrong type here")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(tollgate::config::missing_key),
        help("set `{key}` in tollgate.toml or via a TOLLGATE_* variable")
    )]
    MissingKey { key: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(tollgate::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(tollgate::config::other))]
    Other(String),
}

fn section_label(section: Option<&str>) -> String {
    match section {
        Some(section) => format!("[{section}]"),
        None => "the top level".to_string(),
    }
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &[String]) -> String {
    let valid = valid_keys.join(", ");
    match suggestion {
        Some(s) => format!("did you mean `{s}`? valid keys: {valid}"),
        None => format!("valid keys: {valid}"),
    }
}

/// A TOML document that diagnostics can point into.
#[derive(Debug, Clone)]
pub struct TomlSource {
    pub name: String,
    pub content: String,
}

impl TomlSource {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    pub fn inline(content: impl Into<String>) -> Self {
        Self::new(INLINE_SOURCE, content)
    }

    fn named(&self) -> NamedSource<String> {
        NamedSource::new(&self.name, self.content.clone())
    }

    /// Span of `key` inside the `[section]` table (or the top level).
    ///
    /// Tracks table headers line by line, so a key with the same name in an
    /// earlier table is not picked up.
    pub fn key_span(&self, section: Option<&str>, key: &str) -> Option<SourceSpan> {
        let mut current: Option<&str> = None;
        let mut offset = 0;
        for line in self.content.split_inclusive('\n') {
            let trimmed = line.trim_start();
            let indent = line.len() - trimmed.len();
            if let Some(header) = trimmed.strip_prefix('[') {
                current = header.split(']').next().map(str::trim);
            } else if current == section {
                if let Some(rest) = trimmed.strip_prefix(key) {
                    if rest.trim_start().starts_with('=') {
                        return Some(SourceSpan::new((offset + indent).into(), key.len()));
                    }
                }
            }
            offset += line.len();
        }
        None
    }

    /// Span of the value assigned to `key`, trailing comments excluded.
    pub fn value_span(&self, section: Option<&str>, key: &str) -> Option<SourceSpan> {
        let key_span = self.key_span(section, key)?;
        let line_start = key_span.offset();
        let line_end = self.content[line_start..]
            .find('\n')
            .map_or(self.content.len(), |n| line_start + n);
        let line = &self.content[line_start..line_end];
        let eq = line.find('=')?;
        let raw = &line[eq + 1..];
        let value = raw.split(" #").next().unwrap_or(raw);
        let start = line_start + eq + 1 + (value.len() - value.trim_start().len());
        Some(SourceSpan::new(start.into(), value.trim().len()))
    }
}

/// Best-scoring valid key for a typo, if any clears the threshold.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Picks the source an error came from: the file named in its metadata, or
/// the inline document when the value was not read from a file.
fn source_for<'a>(error: &figment::Error, sources: &'a [TomlSource]) -> Option<&'a TomlSource> {
    let file = error
        .metadata
        .as_ref()
        .and_then(|m| m.source.as_ref())
        .and_then(|source| match source {
            figment::Source::File(path) => Some(path.display().to_string()),
            _ => None,
        });
    match file {
        Some(file) => sources.iter().find(|s| s.name == file),
        None => sources.iter().find(|s| s.name == INLINE_SOURCE),
    }
}

/// Converts every error in a figment failure into a [`ConfigError`].
pub fn figment_to_config_errors(err: figment::Error, sources: &[TomlSource]) -> Vec<ConfigError> {
    err.into_iter()
        .map(|error| {
            let source = source_for(&error, sources);
            let section = error.path.first().cloned();
            match &error.kind {
                Kind::UnknownField(field, expected) => {
                    let span = source.and_then(|s| s.key_span(section.as_deref(), field));
                    ConfigError::UnknownKey {
                        key: field.clone(),
                        section,
                        suggestion: suggest_key(field, expected),
                        valid_keys: expected.iter().map(|k| k.to_string()).collect(),
                        span,
                        src: span.and(source).map(TomlSource::named),
                    }
                }
                Kind::MissingField(field) => ConfigError::MissingKey {
                    key: match &section {
                        Some(section) => format!("{section}.{field}"),
                        None => field.to_string(),
                    },
                },
                Kind::InvalidType(actual, expected) => {
                    let key = error.path.last().cloned().unwrap_or_default();
                    let table = (error.path.len() > 1).then(|| error.path[0].as_str());
                    let span = source.and_then(|s| s.value_span(table, &key));
                    ConfigError::InvalidType {
                        key: error.path.join("."),
                        found: actual.to_string(),
                        expected: expected.clone(),
                        span,
                        src: span.and(source).map(TomlSource::named),
                    }
                }
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

/// Prints every error to stderr, without colour when stderr is not a terminal.
pub fn render_errors(errors: &[ConfigError]) {
    let theme = if std::io::stderr().is_terminal() {
        GraphicalTheme::unicode()
    } else {
        GraphicalTheme::unicode_nocolor()
    };
    let handler = GraphicalReportHandler::new_themed(theme);
    for error in errors {
        let mut out = String::new();
        match handler.render_report(&mut out, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{out}"),
            Err(_) => eprintln!("error: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "[api]\nretries = 1\n\n[request]\nretires = 2 # typo\n";

    #[test]
    fn suggests_closest_key() {
        let valid = &["max_requests_per_minute", "retries", "retry_delay_ms"];
        assert_eq!(suggest_key("retires", valid), Some("retries".to_string()));
        assert_eq!(
            suggest_key(
                "stalenes_threshold_secs",
                &["staleness_threshold_secs", "remote_ttl_secs"]
            ),
            Some("staleness_threshold_secs".to_string())
        );
        assert_eq!(suggest_key("zzzzzz", &["base_url"]), None);
    }

    #[test]
    fn key_span_respects_the_table() {
        let source = TomlSource::inline(DOC);
        let span = source.key_span(Some("request"), "retires").unwrap();
        assert_eq!(&DOC[span.offset()..span.offset() + span.len()], "retires");

        // `retries` exists, but only under [api].
        assert!(source.key_span(Some("request"), "retries").is_none());
        assert!(source.key_span(Some("api"), "retries").is_some());
    }

    #[test]
    fn value_span_skips_comments() {
        let source = TomlSource::inline(DOC);
        let span = source.value_span(Some("request"), "retires").unwrap();
        assert_eq!(&DOC[span.offset()..span.offset() + span.len()], "2");
    }

    #[test]
    fn inline_errors_carry_source_spans() {
        let err = crate::loader::load_config_from_str("[request]\nretires = 4\n").unwrap_err();
        let errors = figment_to_config_errors(err, &[TomlSource::inline("[request]\nretires = 4\n")]);
        match &errors[0] {
            ConfigError::UnknownKey {
                section, span, src, ..
            } => {
                assert_eq!(section.as_deref(), Some("request"));
                assert!(span.is_some());
                assert!(src.is_some());
            }
            other => panic!("expected UnknownKey, got {other:?}"),
        }
    }
}
