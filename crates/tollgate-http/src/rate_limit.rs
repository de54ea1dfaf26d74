// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sliding-window rate limiter, one window per URL.

use std::collections::VecDeque;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

/// Admits at most `max_requests` per URL within any `window`-long interval.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    window: Duration,
    max_requests: usize,
    hits: DashMap<String, VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            window,
            max_requests: max_requests.max(1),
            hits: DashMap::new(),
        }
    }

    /// Records a request for `url` if the window has room.
    ///
    /// Returns `Err(wait)` with the time until the oldest hit leaves the window
    /// when the limit is reached; nothing is recorded in that case.
    pub fn try_acquire(&self, url: &str) -> Result<(), Duration> {
        let now = Instant::now();
        let mut hits = self.hits.entry(url.to_string()).or_default();
        while hits
            .front()
            .is_some_and(|oldest| now.duration_since(*oldest) >= self.window)
        {
            hits.pop_front();
        }

        if hits.len() < self.max_requests {
            hits.push_back(now);
            return Ok(());
        }

        let oldest = hits.front().copied().unwrap_or(now);
        Err(self.window.saturating_sub(now.duration_since(oldest)))
    }

    pub fn clear(&self) {
        self.hits.clear();
    }
}
