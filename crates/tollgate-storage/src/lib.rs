// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence layer for Tollgate.
//!
//! Provides the SQLite-backed entitlement cache, redemption history and
//! credential store (WAL mode, embedded migrations, a single background
//! connection via `tokio-rusqlite`), plus in-memory equivalents.

pub mod cache;
pub mod credentials;
pub mod database;
pub mod memory;
pub mod migrations;

pub use cache::SqliteEntitlementCache;
pub use credentials::SqliteCredentialStore;
pub use database::Database;
pub use memory::{MemoryCredentialStore, MemoryEntitlementCache};
