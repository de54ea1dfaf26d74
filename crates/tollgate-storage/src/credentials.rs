// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-identity session credentials kept in the `credentials` table.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{OptionalExtension, params};
use secrecy::{ExposeSecret, SecretString};

use tollgate_core::{CredentialStore, Identity, TollgateError};

use crate::database::{Database, map_tr_err};

/// SQLite-backed [`CredentialStore`].
///
/// Credentials survive identity switches so that switching back to a known
/// account needs no fresh login.
pub struct SqliteCredentialStore {
    db: Database,
}

impl SqliteCredentialStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn save(&self, identity: &Identity, credential: &SecretString) -> Result<(), TollgateError> {
        let id = identity.as_str().to_string();
        let token = credential.expose_secret().to_string();
        let now = Utc::now().to_rfc3339();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO credentials (identity_id, token, updated_at) \
                     VALUES (?1, ?2, ?3)",
                    params![id, token, now],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn load(&self, identity: &Identity) -> Result<Option<SecretString>, TollgateError> {
        let id = identity.as_str().to_string();
        let token: Option<String> = self
            .db
            .connection()
            .call(move |conn| {
                conn.query_row(
                    "SELECT token FROM credentials WHERE identity_id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)?;
        Ok(token.map(SecretString::from))
    }

    async fn remove(&self, identity: &Identity) -> Result<(), TollgateError> {
        let id = identity.as_str().to_string();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute("DELETE FROM credentials WHERE identity_id = ?1", params![id])?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn identities(&self) -> Result<Vec<Identity>, TollgateError> {
        let ids: Vec<String> = self
            .db
            .connection()
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT identity_id FROM credentials ORDER BY updated_at DESC")?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect::<Result<Vec<String>, _>>()
            })
            .await
            .map_err(map_tr_err)?;
        ids.into_iter().map(Identity::new).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_load_remove() {
        let store = SqliteCredentialStore::new(Database::open_in_memory().await.unwrap());
        let alice = Identity::new("alice").unwrap();

        assert!(store.load(&alice).await.unwrap().is_none());
        store.save(&alice, &SecretString::from("t-1")).await.unwrap();
        store.save(&alice, &SecretString::from("t-2")).await.unwrap();
        let loaded = store.load(&alice).await.unwrap().unwrap();
        assert_eq!(loaded.expose_secret(), "t-2");
        assert_eq!(store.identities().await.unwrap(), vec![alice.clone()]);

        store.remove(&alice).await.unwrap();
        assert!(store.load(&alice).await.unwrap().is_none());
        assert!(store.identities().await.unwrap().is_empty());
    }
}
