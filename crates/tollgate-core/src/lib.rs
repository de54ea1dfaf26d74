// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Tollgate entitlement subsystem.
//!
//! This crate provides the entitlement data model, the error type, the
//! real-time event vocabulary and the collaborator traits (cache, remote
//! source, update channel, credential store) that the resolver is built on.

pub mod clock;
pub mod error;
pub mod events;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::TollgateError;
pub use events::{AccessUpdate, ChannelEvent, ClientEvent, ServerEvent};
pub use types::{
    AccessType, ContentBundle, ContentId, EntitlementKey, EntitlementRecord, Identity,
    PurchaseRecord, PurchaseStatus, RedemptionRecord, RemoteAccess,
};

pub use traits::{CredentialStore, EntitlementCache, RemoteEntitlementSource, UpdateChannel};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tollgate_error_variants_render() {
        let cases: Vec<(TollgateError, &str)> = vec![
            (TollgateError::Config("bad".into()), "configuration error: bad"),
            (TollgateError::Unauthenticated, "unauthenticated: no active identity"),
            (TollgateError::Cancelled, "operation cancelled"),
            (
                TollgateError::Remote {
                    message: "nope".into(),
                },
                "remote error: nope",
            ),
            (
                TollgateError::storage(std::io::Error::other("disk")),
                "storage error: disk",
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.to_string(), expected);
        }
        assert!(TollgateError::Cancelled.is_cancelled());
    }

    #[test]
    fn all_traits_are_object_safe() {
        fn _cache(_: &dyn EntitlementCache) {}
        fn _remote(_: &dyn RemoteEntitlementSource) {}
        fn _channel(_: &dyn UpdateChannel) {}
        fn _credentials(_: &dyn CredentialStore) {}
    }
}
