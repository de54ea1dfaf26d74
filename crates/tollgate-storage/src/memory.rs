// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory cache and credential store, for tests and ephemeral sessions.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;

use tollgate_core::{
    ContentId, CredentialStore, EntitlementCache, EntitlementKey, EntitlementRecord, Identity,
    RedemptionRecord, TollgateError,
};

#[derive(Default)]
struct Namespace {
    records: BTreeMap<ContentId, EntitlementRecord>,
    redemptions: Vec<RedemptionRecord>,
}

/// [`EntitlementCache`] backed by one map per identity.
#[derive(Default)]
pub struct MemoryEntitlementCache {
    namespaces: RwLock<HashMap<Identity, Namespace>>,
}

impl MemoryEntitlementCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntitlementCache for MemoryEntitlementCache {
    async fn get(&self, key: &EntitlementKey) -> Result<Option<EntitlementRecord>, TollgateError> {
        let namespaces = self.namespaces.read().await;
        Ok(namespaces
            .get(&key.identity)
            .and_then(|ns| ns.records.get(&key.content_id))
            .cloned())
    }

    async fn set(&self, key: &EntitlementKey, record: &EntitlementRecord) -> Result<(), TollgateError> {
        let mut namespaces = self.namespaces.write().await;
        namespaces
            .entry(key.identity.clone())
            .or_default()
            .records
            .insert(key.content_id.clone(), record.clone());
        Ok(())
    }

    async fn invalidate(&self, key: &EntitlementKey) -> Result<(), TollgateError> {
        let mut namespaces = self.namespaces.write().await;
        if let Some(ns) = namespaces.get_mut(&key.identity) {
            ns.records.remove(&key.content_id);
        }
        Ok(())
    }

    async fn clear_namespace(&self, identity: &Identity) -> Result<(), TollgateError> {
        self.namespaces.write().await.remove(identity);
        Ok(())
    }

    async fn content_ids(&self, identity: &Identity) -> Result<Vec<ContentId>, TollgateError> {
        let namespaces = self.namespaces.read().await;
        Ok(namespaces
            .get(identity)
            .map(|ns| ns.records.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn redemptions(&self, identity: &Identity) -> Result<Vec<RedemptionRecord>, TollgateError> {
        let namespaces = self.namespaces.read().await;
        Ok(namespaces
            .get(identity)
            .map(|ns| ns.redemptions.clone())
            .unwrap_or_default())
    }

    async fn add_redemption(
        &self,
        identity: &Identity,
        record: &RedemptionRecord,
    ) -> Result<(), TollgateError> {
        let mut namespaces = self.namespaces.write().await;
        let ns = namespaces.entry(identity.clone()).or_default();
        ns.redemptions.retain(|r| r.code != record.code);
        ns.redemptions.push(record.clone());
        Ok(())
    }
}

/// [`CredentialStore`] that forgets everything when dropped.
#[derive(Default)]
pub struct MemoryCredentialStore {
    tokens: RwLock<BTreeMap<Identity, SecretString>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn save(&self, identity: &Identity, credential: &SecretString) -> Result<(), TollgateError> {
        self.tokens.write().await.insert(
            identity.clone(),
            SecretString::from(credential.expose_secret().to_string()),
        );
        Ok(())
    }

    async fn load(&self, identity: &Identity) -> Result<Option<SecretString>, TollgateError> {
        Ok(self
            .tokens
            .read()
            .await
            .get(identity)
            .map(|s| SecretString::from(s.expose_secret().to_string())))
    }

    async fn remove(&self, identity: &Identity) -> Result<(), TollgateError> {
        self.tokens.write().await.remove(identity);
        Ok(())
    }

    async fn identities(&self) -> Result<Vec<Identity>, TollgateError> {
        Ok(self.tokens.read().await.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tollgate_core::AccessType;

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let cache = MemoryEntitlementCache::new();
        let a = EntitlementKey::new(Identity::new("a").unwrap(), ContentId::new("q1"));
        let b = EntitlementKey::new(Identity::new("b").unwrap(), ContentId::new("q1"));
        let record = EntitlementRecord::new(
            ContentId::new("q1"),
            true,
            None,
            AccessType::Purchased,
            Utc::now(),
        );
        cache.set(&a, &record).await.unwrap();
        assert!(cache.get(&b).await.unwrap().is_none());

        cache.clear_namespace(&a.identity).await.unwrap();
        assert!(cache.get(&a).await.unwrap().is_none());
    }
}
