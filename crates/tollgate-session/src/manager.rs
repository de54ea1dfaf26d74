// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Active identity management.
//!
//! Exactly one identity is active per [`SessionManager`]. Switching:
//! 1. Cancels the previous identity's token and stops its resolver
//! 2. Clears its cache namespace and the request layer's pending entries
//! 3. Authenticates the channel for the new identity
//! 4. Builds a fresh resolver and issues a forced resync before returning

use std::sync::{Arc, RwLock};

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tollgate_core::{
    ContentBundle, ContentId, CredentialStore, EntitlementRecord, Identity, PurchaseRecord,
    TollgateError,
};
use tollgate_resolver::{Collaborators, EntitlementResolver, ResolverSettings};

/// The resolver and token of the currently active identity.
#[derive(Clone)]
struct ActiveSession {
    /// Correlates log lines of one sign-in.
    id: Uuid,
    resolver: EntitlementResolver,
    cancel: CancellationToken,
}

pub struct SessionManager {
    deps: Collaborators,
    credentials: Arc<dyn CredentialStore>,
    settings: ResolverSettings,
    /// Parent of every identity generation's token.
    root: CancellationToken,
    active: RwLock<Option<ActiveSession>>,
    /// Serializes switches and logouts.
    switching: Mutex<()>,
}

impl SessionManager {
    pub fn new(
        deps: Collaborators,
        credentials: Arc<dyn CredentialStore>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            deps,
            credentials,
            settings,
            root: CancellationToken::new(),
            active: RwLock::new(None),
            switching: Mutex::new(()),
        }
    }

    fn snapshot(&self) -> Option<ActiveSession> {
        self.active
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn replace(&self, next: Option<ActiveSession>) -> Option<ActiveSession> {
        let mut slot = self
            .active
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *slot, next)
    }

    pub fn active_identity(&self) -> Option<Identity> {
        self.snapshot().map(|s| s.resolver.identity().clone())
    }

    /// Resolver of the active identity.
    pub fn resolver(&self) -> Result<EntitlementResolver, TollgateError> {
        self.snapshot()
            .map(|s| s.resolver)
            .ok_or(TollgateError::Unauthenticated)
    }

    /// Makes `identity` the active identity.
    ///
    /// Without a `credential` the one stored for `identity` is used; an
    /// identity that never signed in is rejected with `Unauthenticated`
    /// before the current session is touched.
    pub async fn switch_identity(
        &self,
        identity: Identity,
        credential: Option<SecretString>,
    ) -> Result<EntitlementResolver, TollgateError> {
        let _switching = self.switching.lock().await;

        let credential = match credential {
            Some(credential) => {
                self.credentials.save(&identity, &credential).await?;
                credential
            }
            None => self
                .credentials
                .load(&identity)
                .await?
                .ok_or(TollgateError::Unauthenticated)?,
        };

        if let Some(current) = self.snapshot() {
            if current.resolver.identity() == &identity && !current.cancel.is_cancelled() {
                debug!(identity = %identity, "identity already active");
                return Ok(current.resolver);
            }
        }

        let previous = self.replace(None);
        if let Some(previous) = previous {
            self.retire(previous).await;
        }

        self.deps.channel.authenticate(&identity, &credential).await?;

        let cancel = self.root.child_token();
        let resolver = EntitlementResolver::new(
            identity.clone(),
            self.deps.clone(),
            self.settings,
            cancel.clone(),
        );
        resolver.start_listener();
        resolver.resync(true).await?;

        let id = Uuid::new_v4();
        self.replace(Some(ActiveSession {
            id,
            resolver: resolver.clone(),
            cancel,
        }));
        info!(identity = %identity, session_id = %id, "identity switched");
        Ok(resolver)
    }

    /// Stops and forgets the active identity, including its stored credential.
    pub async fn logout(&self) -> Result<(), TollgateError> {
        let _switching = self.switching.lock().await;
        let Some(previous) = self.replace(None) else {
            return Ok(());
        };
        let identity = previous.resolver.identity().clone();
        let previous_id = previous.id;
        self.retire(previous).await;

        self.deps.channel.disconnect().await?;
        self.credentials.remove(&identity).await?;
        info!(identity = %identity, session_id = %previous_id, "logged out");
        Ok(())
    }

    async fn retire(&self, session: ActiveSession) {
        let identity = session.resolver.identity().clone();
        session.cancel.cancel();
        session.resolver.shutdown();
        self.deps.remote.clear_pending();
        if let Err(e) = self.deps.cache.clear_namespace(&identity).await {
            warn!(identity = %identity, error = %e, "failed to clear cache namespace");
        }
        debug!(identity = %identity, session_id = %session.id, "identity retired");
    }

    /// Cancels the active identity without clearing anything. Used on process exit.
    pub fn close(&self) {
        self.root.cancel();
        if let Some(session) = self.replace(None) {
            session.resolver.shutdown();
        }
    }

    pub async fn has_access(&self, content_id: &ContentId) -> Result<bool, TollgateError> {
        Ok(self.resolver()?.has_access(content_id).await)
    }

    pub async fn remaining_days(&self, content_id: &ContentId) -> Result<Option<i64>, TollgateError> {
        Ok(self.resolver()?.remaining_days(content_id).await)
    }

    /// Redeems `code` for the active identity and applies it locally.
    pub async fn redeem_code(&self, code: &str) -> Result<EntitlementRecord, TollgateError> {
        let session = self.snapshot().ok_or(TollgateError::Unauthenticated)?;
        let code = code.trim();
        if code.is_empty() {
            return Err(TollgateError::Remote {
                message: "redeem code is empty".to_string(),
            });
        }
        let redemption = self
            .deps
            .remote
            .redeem_code(session.resolver.identity(), code, &session.cancel)
            .await?;
        session.resolver.apply_redemption(redemption).await
    }

    pub async fn record_purchase(
        &self,
        purchase: PurchaseRecord,
    ) -> Result<EntitlementRecord, TollgateError> {
        let resolver = self.resolver()?;
        if purchase.user_id != resolver.identity().as_str() {
            return Err(TollgateError::Internal(format!(
                "purchase belongs to `{}`, not the active identity",
                purchase.user_id
            )));
        }
        resolver.apply_purchase(purchase).await
    }

    /// Reloads the content catalog for the active identity.
    pub async fn refresh_catalog(&self) -> Result<Vec<ContentBundle>, TollgateError> {
        self.resolver()?.refresh_catalog().await
    }

    /// Identities with a stored credential, most recent first.
    pub async fn known_identities(&self) -> Result<Vec<Identity>, TollgateError> {
        self.credentials.identities().await
    }

    /// Whether `identity` can be switched to without a new credential.
    pub async fn has_credential(&self, identity: &Identity) -> Result<bool, TollgateError> {
        Ok(self
            .credentials
            .load(identity)
            .await?
            .is_some_and(|c| !c.expose_secret().is_empty()))
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.root.cancel();
    }
}
