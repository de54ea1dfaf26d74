// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wires the production collaborators from configuration.

use std::sync::Arc;

use tollgate_config::TollgateConfig;
use tollgate_core::{SystemClock, TollgateError, UpdateChannel};
use tollgate_http::{ExecutorSettings, HttpEntitlementSource, RequestExecutor};
use tollgate_realtime::{OfflineChannel, WsUpdateChannel};
use tollgate_resolver::{Collaborators, ResolverSettings};
use tollgate_session::SessionManager;
use tollgate_storage::{Database, SqliteCredentialStore, SqliteEntitlementCache};
use tracing::{debug, info};

/// Everything one CLI invocation needs, torn down by [`Runtime::shutdown`].
pub struct Runtime {
    pub manager: SessionManager,
    channel: Arc<dyn UpdateChannel>,
    db: Database,
}

impl Runtime {
    pub async fn build(config: &TollgateConfig) -> Result<Self, TollgateError> {
        let db = Database::from_config(&config.storage).await?;
        let cache = Arc::new(SqliteEntitlementCache::new(db.clone()));
        let credentials = Arc::new(SqliteCredentialStore::new(db.clone()));

        let executor =
            RequestExecutor::new(ExecutorSettings::from_config(&config.api, &config.request))?;
        let remote = Arc::new(HttpEntitlementSource::new(
            executor,
            config.api.base_url.clone(),
            config.entitlement.remote_ttl(),
        ));

        let channel: Arc<dyn UpdateChannel> = if config.realtime.enabled {
            info!(url = %config.realtime.url, "realtime channel enabled");
            Arc::new(WsUpdateChannel::from_config(&config.realtime))
        } else {
            debug!("realtime channel disabled");
            Arc::new(OfflineChannel::new())
        };

        let manager = SessionManager::new(
            Collaborators {
                cache,
                remote,
                channel: channel.clone(),
                clock: Arc::new(SystemClock),
            },
            credentials,
            ResolverSettings::from_config(&config.entitlement),
        );

        Ok(Self {
            manager,
            channel,
            db,
        })
    }

    /// Stops background work and checkpoints the database.
    pub async fn shutdown(self) -> Result<(), TollgateError> {
        self.manager.close();
        self.channel.disconnect().await?;
        self.db.close().await
    }
}
