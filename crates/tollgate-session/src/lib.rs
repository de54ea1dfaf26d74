// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session and account switching for Tollgate.
//!
//! [`SessionManager`] owns the active identity's resolver and guarantees that
//! nothing from a previous identity survives a switch: its requests are
//! cancelled, its cache namespace is cleared and the channel is
//! re-authenticated before the new identity answers any query.

pub mod manager;

pub use manager::SessionManager;
