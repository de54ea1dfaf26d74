// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Tollgate entitlement subsystem.

use thiserror::Error;

/// The primary error type used across all Tollgate collaborator traits and core operations.
#[derive(Debug, Error)]
pub enum TollgateError {
    /// Configuration errors (invalid TOML, missing required fields, bad URLs).
    #[error("configuration error: {0}")]
    Config(String),

    /// Local persistence errors (database connection, query failure, migrations).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// HTTP transport or status errors surfaced by the request execution layer.
    #[error("http error: {message}")]
    Http {
        message: String,
        status: Option<u16>,
    },

    /// The backend answered but reported a failure (`success: false`) or an unusable payload.
    #[error("remote error: {message}")]
    Remote { message: String },

    /// Real-time channel errors (connection failure, closed channel, frame encoding).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// No active or valid identity was available for an identity-scoped operation.
    #[error("unauthenticated: no active identity")]
    Unauthenticated,

    /// The operation was aborted because its identity scope was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TollgateError {
    /// Wrap any error as a storage failure.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        TollgateError::Storage {
            source: Box::new(err),
        }
    }

    /// Returns true when the error came from cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TollgateError::Cancelled)
    }
}
