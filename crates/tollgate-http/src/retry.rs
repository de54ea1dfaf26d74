// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exponential backoff with a server-hint override.

use std::time::Duration;

/// Delay before retry number `attempt + 1`.
///
/// `base * 2^attempt`, capped at `max`. A `Retry-After` hint replaces the
/// exponential delay and is capped the same way.
pub fn backoff_delay(
    base: Duration,
    attempt: u32,
    max: Duration,
    retry_after: Option<Duration>,
) -> Duration {
    if let Some(hint) = retry_after {
        return hint.min(max);
    }
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(max)
}

/// Parses a `Retry-After` header given in whole seconds.
///
/// HTTP-date values are not used by the backend and are ignored.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
