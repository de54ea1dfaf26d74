// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-identity session credential persistence.

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::TollgateError;
use crate::types::Identity;

/// Keeps one session credential per identity so switching back to an
/// account does not require signing in again.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn save(&self, identity: &Identity, credential: &SecretString)
        -> Result<(), TollgateError>;

    async fn load(&self, identity: &Identity) -> Result<Option<SecretString>, TollgateError>;

    async fn remove(&self, identity: &Identity) -> Result<(), TollgateError>;

    /// Identities with a stored credential, most recently saved first.
    async fn identities(&self) -> Result<Vec<Identity>, TollgateError>;
}
