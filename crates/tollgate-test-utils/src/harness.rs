// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for multi-device integration testing.
//!
//! `TestHarness` owns the pieces every device shares (manual clock, mock
//! backend, push hub, temp directory). [`TestHarness::device`] then builds a
//! complete client stack: its own cache, credential store, remote source
//! and hub connection wrapped in a [`SessionManager`].

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use secrecy::SecretString;

use tollgate_core::{Clock, CredentialStore, EntitlementCache, Identity, ManualClock, TollgateError};
use tollgate_resolver::{Collaborators, EntitlementResolver, ResolverSettings};
use tollgate_session::SessionManager;
use tollgate_storage::{
    Database, MemoryCredentialStore, MemoryEntitlementCache, SqliteCredentialStore,
    SqliteEntitlementCache,
};

use crate::backend::MockBackend;
use crate::mock_remote::MockRemoteSource;
use crate::push_hub::{HubChannel, PushHub};

/// Which cache implementation devices are built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Memory,
    Sqlite,
}

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    start: DateTime<Utc>,
    settings: ResolverSettings,
    storage: StorageKind,
    bundles: Vec<(String, bool)>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            start: Utc
                .with_ymd_and_hms(2026, 1, 1, 12, 0, 0)
                .single()
                .unwrap_or_else(Utc::now),
            settings: ResolverSettings::default(),
            storage: StorageKind::Memory,
            bundles: Vec::new(),
        }
    }

    /// Set the manual clock's starting instant.
    pub fn with_start(mut self, start: DateTime<Utc>) -> Self {
        self.start = start;
        self
    }

    pub fn with_settings(mut self, settings: ResolverSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Back every device with its own SQLite database in the temp directory.
    pub fn with_sqlite(mut self) -> Self {
        self.storage = StorageKind::Sqlite;
        self
    }

    /// Add a bundle to the backend catalog.
    pub fn with_bundle(mut self, id: &str, is_paid: bool) -> Self {
        self.bundles.push((id.to_string(), is_paid));
        self
    }

    pub fn build(self) -> Result<TestHarness, TollgateError> {
        let temp_dir = tempfile::TempDir::new().map_err(TollgateError::storage)?;
        let clock = Arc::new(ManualClock::new(self.start));
        let shared: Arc<dyn Clock> = clock.clone();
        let backend = Arc::new(MockBackend::new(shared));
        for (id, is_paid) in &self.bundles {
            backend.add_bundle(id, *is_paid);
        }
        let hub = PushHub::new(backend.clone());

        Ok(TestHarness {
            clock,
            backend,
            hub,
            settings: self.settings,
            storage: self.storage,
            devices: AtomicUsize::new(0),
            _temp_dir: temp_dir,
        })
    }
}

/// Shared environment for one test.
pub struct TestHarness {
    /// Clock used by every device and the backend.
    pub clock: Arc<ManualClock>,
    /// Server-side truth.
    pub backend: Arc<MockBackend>,
    /// Real-time server.
    pub hub: Arc<PushHub>,
    settings: ResolverSettings,
    storage: StorageKind,
    devices: AtomicUsize,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub fn settings(&self) -> ResolverSettings {
        self.settings
    }

    /// Builds one client device.
    pub async fn device(&self) -> Result<Device, TollgateError> {
        let n = self.devices.fetch_add(1, Ordering::SeqCst);
        let (cache, credentials): (Arc<dyn EntitlementCache>, Arc<dyn CredentialStore>) =
            match self.storage {
                StorageKind::Memory => (
                    Arc::new(MemoryEntitlementCache::new()),
                    Arc::new(MemoryCredentialStore::new()),
                ),
                StorageKind::Sqlite => {
                    let path = self._temp_dir.path().join(format!("device-{n}.db"));
                    let db = Database::open(&path.to_string_lossy(), true).await?;
                    (
                        Arc::new(SqliteEntitlementCache::new(db.clone())),
                        Arc::new(SqliteCredentialStore::new(db)),
                    )
                }
            };

        let remote = Arc::new(MockRemoteSource::new(self.backend.clone()));
        let channel = self.hub.channel();
        let clock: Arc<dyn Clock> = self.clock.clone();
        let collaborators = Collaborators {
            cache: cache.clone(),
            remote: remote.clone(),
            channel: channel.clone(),
            clock,
        };
        let manager = SessionManager::new(collaborators.clone(), credentials.clone(), self.settings);

        Ok(Device {
            manager,
            remote,
            channel,
            cache,
            credentials,
            collaborators,
        })
    }

    /// Moves the shared clock forward.
    pub fn advance(&self, by: chrono::Duration) {
        self.clock.advance(by);
    }
}

/// One client: a session manager over its own cache, remote source and connection.
pub struct Device {
    pub manager: SessionManager,
    pub remote: Arc<MockRemoteSource>,
    pub channel: Arc<HubChannel>,
    pub cache: Arc<dyn EntitlementCache>,
    pub credentials: Arc<dyn CredentialStore>,
    collaborators: Collaborators,
}

impl Device {
    /// Signs `user` in with a fresh credential.
    pub async fn sign_in(&self, user: &str) -> Result<EntitlementResolver, TollgateError> {
        let identity = Identity::new(user)?;
        let credential = SecretString::from(format!("token-{user}"));
        self.manager.switch_identity(identity, Some(credential)).await
    }

    /// The device's collaborators, for building a resolver without a session.
    pub fn collaborators(&self) -> Collaborators {
        self.collaborators.clone()
    }
}

/// Polls `check` until it holds, giving background listeners time to run.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
