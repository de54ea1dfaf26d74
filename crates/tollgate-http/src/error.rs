// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request-layer error type.
//!
//! `RequestError` is `Clone` because one in-flight request can be awaited by
//! many callers at once; each of them receives its own copy of the outcome.

use std::time::Duration;

use thiserror::Error;
use tollgate_core::TollgateError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// Connection, DNS, TLS or timeout failure before a status was received.
    #[error("network error: {0}")]
    Network(String),

    /// Non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    /// The body could not be decoded into the expected shape.
    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("invalid request URL: {0}")]
    InvalidUrl(String),

    /// The caller's cancellation token fired.
    #[error("request cancelled")]
    Cancelled,
}

impl RequestError {
    /// Network failures, 5xx and 429 are worth another attempt. Nothing else is.
    pub fn is_retryable(&self) -> bool {
        match self {
            RequestError::Network(_) => true,
            RequestError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Server-provided delay hint (only set for 429 responses).
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RequestError::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RequestError::Decode(err.to_string())
        } else if err.is_builder() {
            RequestError::InvalidUrl(err.to_string())
        } else {
            RequestError::Network(err.to_string())
        }
    }
}

impl From<RequestError> for TollgateError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Cancelled => TollgateError::Cancelled,
            RequestError::Decode(message) => TollgateError::Remote { message },
            other => TollgateError::Http {
                status: other.status(),
                message: other.to_string(),
            },
        }
    }
}
