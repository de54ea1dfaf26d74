// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Entitlement resolver for Tollgate.
//!
//! One [`EntitlementResolver`] exists per active identity. It reconciles the
//! session's purchase and redemption lists, the local cache, the remote
//! source and real-time pushes into a single `has_access` answer.

pub mod access;
mod coalesce;
mod listener;
pub mod resolver;
pub mod settings;

pub use access::{AccessChange, AccessEvidence, ChangeSource, ResolutionState, determine_access_type};
pub use resolver::{Collaborators, EntitlementResolver};
pub use settings::ResolverSettings;
