// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits the resolver is parameterized over.
//!
//! Each trait is object-safe so implementations can be swapped at runtime
//! (SQLite vs in-memory cache, HTTP vs mock remote, WebSocket vs in-process hub).

pub mod cache;
pub mod channel;
pub mod credentials;
pub mod remote;

pub use cache::EntitlementCache;
pub use channel::UpdateChannel;
pub use credentials::CredentialStore;
pub use remote::RemoteEntitlementSource;
