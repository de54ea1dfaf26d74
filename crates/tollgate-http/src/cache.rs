// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared response cache for the request execution layer.

use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::time::Instant;

use crate::request::RequestKey;

#[derive(Debug, Clone)]
struct CachedResponse {
    value: Value,
    stored_at: Instant,
    ttl: Duration,
}

/// Successful response bodies keyed by [`RequestKey`].
///
/// Expired entries are kept so they can be served as stale data while a URL
/// is rate limited; they are overwritten by the next successful response.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: DashMap<RequestKey, CachedResponse>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached body if it is still within its TTL.
    pub fn get_fresh(&self, key: &RequestKey) -> Option<Value> {
        self.entries
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < entry.ttl)
            .map(|entry| entry.value.clone())
    }

    /// Returns the cached body regardless of age.
    pub fn get_any(&self, key: &RequestKey) -> Option<Value> {
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn insert(&self, key: RequestKey, value: Value, ttl: Duration) {
        self.entries.insert(
            key,
            CachedResponse {
                value,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    pub fn remove(&self, key: &RequestKey) {
        self.entries.remove(key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestSpec;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_but_remain_available_as_stale() {
        let cache = ResponseCache::new();
        let key = RequestSpec::get("http://x/check").key();
        cache.insert(key.clone(), serde_json::json!({"ok": true}), Duration::from_secs(60));

        assert!(cache.get_fresh(&key).is_some());
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.get_fresh(&key).is_none());
        assert_eq!(cache.get_any(&key), Some(serde_json::json!({"ok": true})));

        cache.clear();
        assert!(cache.is_empty());
    }
}
