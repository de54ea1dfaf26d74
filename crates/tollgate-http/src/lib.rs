// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request execution layer and remote entitlement source for Tollgate.
//!
//! [`RequestExecutor`] is the shared HTTP pipeline every backend call goes
//! through. [`HttpEntitlementSource`] builds the authoritative entitlement
//! checks on top of it.

pub mod cache;
pub mod error;
pub mod executor;
pub mod rate_limit;
pub mod remote;
pub mod request;
pub mod retry;

pub use error::RequestError;
pub use executor::{ExecutorSettings, RequestExecutor};
pub use remote::HttpEntitlementSource;
pub use request::{Fetched, Origin, RequestKey, RequestOptions, RequestSpec};
