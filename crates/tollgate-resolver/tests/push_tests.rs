// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Push listener: cache write-through, conflict re-checks, resync on
//! reconnect and subscription lifetime.

use chrono::Duration;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

use tollgate_core::{
    AccessType, AccessUpdate, ClientEvent, Clock, ContentId, Identity, PurchaseRecord,
    PurchaseStatus, ServerEvent, UpdateChannel,
};
use tollgate_resolver::{ChangeSource, EntitlementResolver, ResolutionState};
use tollgate_test_utils::{Device, TestHarness, eventually};

async fn listening(harness: &TestHarness) -> (Device, Identity, EntitlementResolver) {
    let device = harness.device().await.unwrap();
    let user = Identity::new("u1").unwrap();
    device
        .channel
        .authenticate(&user, &SecretString::from("token-u1"))
        .await
        .unwrap();
    let resolver = EntitlementResolver::new(
        user.clone(),
        device.collaborators(),
        harness.settings(),
        CancellationToken::new(),
    );
    resolver.start_listener();
    (device, user, resolver)
}

#[tokio::test]
async fn pushes_are_written_through_the_cache() {
    let harness = TestHarness::builder().build().unwrap();
    let (device, user, resolver) = listening(&harness).await;
    let mut changes = resolver.subscribe();
    let q1 = ContentId::new("q1");

    let expiry = harness.clock.now() + Duration::days(14);
    harness.hub.push(
        &user,
        ServerEvent::PurchaseSuccess {
            content_id: q1.clone(),
            expiry_date: Some(expiry),
        },
    );

    let change = changes.recv().await.unwrap();
    assert_eq!(change.content_id, q1);
    assert!(change.has_access);
    assert_eq!(change.remaining_days, Some(14));
    assert_eq!(change.source, ChangeSource::Push);

    // The pushed record is fresh, so no network check is needed.
    assert!(resolver.has_access(&q1).await);
    assert_eq!(device.remote.check_count(), 0);
    assert_eq!(resolver.resolution_state(&q1), ResolutionState::Resolved);
}

#[tokio::test]
async fn batch_updates_apply_every_entry() {
    let harness = TestHarness::builder().build().unwrap();
    let (_device, user, resolver) = listening(&harness).await;

    harness.hub.push(
        &user,
        ServerEvent::BatchAccessUpdate {
            updates: vec![
                AccessUpdate {
                    content_id: ContentId::new("a"),
                    has_access: true,
                    expiry_date: None,
                    remaining_days: Some(3),
                },
                AccessUpdate {
                    content_id: ContentId::new("b"),
                    has_access: false,
                    expiry_date: None,
                    remaining_days: None,
                },
            ],
        },
    );

    let r = &resolver;
    assert!(eventually(|| async move { r.entitlement(&ContentId::new("b")).await.is_some() }).await);
    let a = resolver.entitlement(&ContentId::new("a")).await.unwrap();
    assert!(a.has_access);
    assert_eq!(a.remaining_days, Some(3));
    assert_eq!(
        resolver.content_of_interest(),
        vec![ContentId::new("a"), ContentId::new("b")]
    );
}

#[tokio::test]
async fn negative_push_against_fresh_access_is_rechecked() {
    let harness = TestHarness::builder().build().unwrap();
    let (device, user, resolver) = listening(&harness).await;
    let q1 = ContentId::new("q1");
    harness.backend.grant(&user, &q1, None);
    assert!(resolver.has_access(&q1).await);

    // Spurious revoke: the backend still grants access.
    harness.hub.push(
        &user,
        ServerEvent::AccessUpdate(AccessUpdate {
            content_id: q1.clone(),
            has_access: false,
            expiry_date: None,
            remaining_days: None,
        }),
    );
    let remote = &device.remote;
    assert!(eventually(|| async move { remote.check_count() == 2 }).await);
    assert!(device.remote.check_calls()[1].force_refresh);
    assert!(resolver.entitlement(&q1).await.unwrap().has_access);

    // Real revoke: the re-check confirms it.
    harness.backend.revoke(&user, &q1);
    harness.hub.push(
        &user,
        ServerEvent::AccessUpdate(AccessUpdate {
            content_id: q1.clone(),
            has_access: false,
            expiry_date: None,
            remaining_days: None,
        }),
    );
    let (r, id) = (&resolver, &q1);
    assert!(
        eventually(|| async move { r.entitlement(id).await.is_some_and(|rec| !rec.has_access) }).await
    );
    assert_eq!(device.remote.check_count(), 3);
}

#[tokio::test]
async fn failed_recheck_keeps_cache_and_marks_unknown() {
    let harness = TestHarness::builder().build().unwrap();
    let (device, user, resolver) = listening(&harness).await;
    let q1 = ContentId::new("q1");
    harness.backend.grant(&user, &q1, None);
    assert!(resolver.has_access(&q1).await);

    device.remote.fail_with("backend down");
    harness.hub.push(
        &user,
        ServerEvent::AccessUpdate(AccessUpdate {
            content_id: q1.clone(),
            has_access: false,
            expiry_date: None,
            remaining_days: None,
        }),
    );

    let (r, id) = (&resolver, &q1);
    assert!(eventually(|| async move { r.resolution_state(id) == ResolutionState::Unknown }).await);
    assert!(resolver.entitlement(&q1).await.unwrap().has_access);
}

#[tokio::test]
async fn reconnect_resyncs_content_of_interest() {
    let harness = TestHarness::builder().build().unwrap();
    let (device, user, resolver) = listening(&harness).await;
    let q1 = ContentId::new("q1");
    resolver.has_access(&q1).await;
    device.channel.clear_emitted();

    device.channel.drop_connection();
    device.channel.restore_connection();

    let (channel, user_ref, id) = (&device.channel, &user, &q1);
    assert!(
        eventually(|| async move {
            channel.emitted().iter().any(|e| {
                matches!(
                    e,
                    ClientEvent::CheckAccessBatch { user_id, content_ids }
                        if user_id == user_ref && content_ids.contains(id)
                )
            })
        })
        .await
    );
    assert!(device.channel.emitted().iter().any(|e| matches!(
        e,
        ClientEvent::SyncAccessRights {
            force_refresh: false,
            ..
        }
    )));
}

#[tokio::test]
async fn listener_subscription_is_released_on_drop() {
    let harness = TestHarness::builder().build().unwrap();
    let (device, _user, resolver) = listening(&harness).await;
    assert_eq!(device.channel.subscriber_count(), 1);
    assert!(resolver.is_listening());

    resolver.start_listener();
    assert_eq!(device.channel.subscriber_count(), 1);

    drop(resolver);
    let channel = &device.channel;
    assert!(eventually(|| async move { channel.subscriber_count() == 0 }).await);
}

#[tokio::test]
async fn stop_listener_releases_subscription() {
    let harness = TestHarness::builder().build().unwrap();
    let (device, _user, resolver) = listening(&harness).await;

    resolver.stop_listener();
    assert!(!resolver.is_listening());
    let channel = &device.channel;
    assert!(eventually(|| async move { channel.subscriber_count() == 0 }).await);
}

#[tokio::test]
async fn mutations_issue_resync_before_returning() {
    let harness = TestHarness::builder().build().unwrap();
    let (device, user, resolver) = listening(&harness).await;
    let mut changes = resolver.subscribe();
    let now = harness.clock.now();
    harness.backend.grant_days(&user, &ContentId::new("q7"), 30);

    let record = resolver
        .apply_purchase(PurchaseRecord {
            id: "p1".to_string(),
            user_id: user.as_str().to_string(),
            content_id: ContentId::new("Q7"),
            purchase_date: now,
            expiry_date: Some(now + Duration::days(30)),
            status: PurchaseStatus::Completed,
            payment_method: None,
        })
        .await
        .unwrap();

    assert!(record.has_access);
    assert_eq!(record.access_type, AccessType::Purchased);
    assert_eq!(record.remaining_days, Some(30));
    assert_eq!(device.channel.sync_count(&user), 1);
    assert!(device.channel.emitted().iter().any(|e| matches!(
        e,
        ClientEvent::SyncAccessRights {
            force_refresh: true,
            ..
        }
    )));
    assert_eq!(changes.recv().await.unwrap().source, ChangeSource::Purchase);
    assert_eq!(resolver.purchases().len(), 1);
}

#[tokio::test]
async fn pushed_day_count_without_expiry_counts_down() {
    let harness = TestHarness::builder().build().unwrap();
    let (_device, user, resolver) = listening(&harness).await;
    let mut changes = resolver.subscribe();
    let q4 = ContentId::new("q4");

    harness.hub.push(
        &user,
        ServerEvent::AccessUpdate(AccessUpdate {
            content_id: q4.clone(),
            has_access: true,
            expiry_date: None,
            remaining_days: Some(3),
        }),
    );
    assert_eq!(changes.recv().await.unwrap().remaining_days, Some(3));

    harness.advance(Duration::days(2));
    let record = resolver.entitlement(&q4).await.unwrap();
    assert!(record.has_access);
    assert_eq!(record.remaining_days, Some(1));

    harness.advance(Duration::days(1));
    let record = resolver.entitlement(&q4).await.unwrap();
    assert!(!record.has_access);
    assert_eq!(record.access_type, AccessType::Expired);
}
