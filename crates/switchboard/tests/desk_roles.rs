// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! All three roles against one served desk, wired the way the consoles
//! wire them: one channel manager per process shared by every subsystem.

use std::sync::Arc;
use std::time::Duration;

use switchboard_channel::ChannelManager;
use switchboard_config::model::{PresenceConfig, RatingConfig};
use switchboard_core::wire::BroadcastBody;
use switchboard_core::{
    Actor, Audience, CustomerId, HandoffStatus, NotificationApi, OperatorId, Party,
    PresenceStatus, Role, SessionId, SessionMode,
};
use switchboard_handoff::{HandoffCoordinator, HandoffEvent};
use switchboard_notify::{BadgeStore, NotificationHub};
use switchboard_presence::{PresenceBoard, PresenceTracker};
use switchboard_rating::RatingPrompter;
use switchboard_storage::MemoryStateStore;
use switchboard_test_utils::{DeskHarness, MockAssistant};
use tokio::sync::watch;

const WAIT: Duration = Duration::from_secs(5);

async fn until_count(rx: &mut watch::Receiver<u32>, n: u32) {
    tokio::time::timeout(WAIT, rx.wait_for(|count| *count >= n))
        .await
        .expect("badge never reached the expected count")
        .unwrap();
}

#[tokio::test]
async fn a_full_shift_across_roles() {
    let harness = DeskHarness::start().await.unwrap();
    let op = harness.login(Actor::operator(OperatorId(3))).await.unwrap();
    let customer = harness.login(Actor::customer(CustomerId(9))).await.unwrap();
    let supervisor = harness.login(Actor::supervisor(1)).await.unwrap();

    // operator process
    let op_store = Arc::new(MemoryStateStore::new());
    let op_channels = ChannelManager::from_config(harness.channel_config(), op.token.clone(), None);
    let presence = Arc::new(PresenceTracker::new(
        OperatorId(3),
        op.client.clone(),
        op_store.clone(),
        &PresenceConfig::default(),
    ));
    presence.attach(&op_channels).unwrap();
    let op_side = HandoffCoordinator::spawn(op.client.clone(), None);
    op_side.attach(&op_channels, Role::Operator).unwrap();
    let badge = Arc::new(
        BadgeStore::open(op.actor, Role::Operator, op_store.clone())
            .await
            .unwrap(),
    );
    let hub = NotificationHub::new(op_channels.clone(), badge, op.client.clone());
    let surface = hub.attach_surface().unwrap();
    assert_eq!(op_channels.lease_count(Role::Operator), 3);
    surface.channel().wait_open(WAIT).await.unwrap();
    presence
        .request_status(PresenceStatus::Online)
        .confirm()
        .await
        .unwrap();

    // supervisor process
    let sup_channels =
        ChannelManager::from_config(harness.channel_config(), supervisor.token.clone(), None);
    let board = PresenceBoard::new(supervisor.client.clone());
    board.attach(&sup_channels).unwrap();
    board.refresh().await.unwrap();
    assert_eq!(board.online_count(), 1);

    // customer process
    let cust_channels =
        ChannelManager::from_config(harness.channel_config(), customer.token.clone(), None);
    let cust_side = HandoffCoordinator::spawn(
        customer.client.clone(),
        Some(Arc::new(MockAssistant::new())),
    );
    cust_side.attach(&cust_channels, Role::Customer).unwrap();
    cust_side.channel().unwrap().wait_open(WAIT).await.unwrap();
    let prompter = Arc::new(RatingPrompter::new(
        customer.client.clone(),
        &RatingConfig::default(),
    ));
    let mut prompts = prompter.subscribe();
    let follower = prompter.follow(cust_side.subscribe());

    // the offer lands on the operator's badge
    let mut unread = hub.badge().subscribe();
    let request = cust_side
        .request_transfer(SessionId(42), Some("refund".into()), None)
        .await
        .unwrap()
        .request()
        .clone();
    until_count(&mut unread, 1).await;

    let mut cust_events = cust_side.subscribe();
    op_side.accept(request.id).await.unwrap();
    tokio::time::timeout(WAIT, async {
        loop {
            if let Ok(HandoffEvent::Changed(update)) = cust_events.recv().await
                && update.request.status.is_live()
            {
                break;
            }
        }
    })
    .await
    .expect("customer never saw the accept");
    assert_eq!(cust_side.mode(SessionId(42)), SessionMode::HumanServed);

    // the customer ends it; a rating is asked for once
    let ended = cust_side.end_by_user(SessionId(42)).await.unwrap();
    assert_eq!(ended.status, HandoffStatus::Completed);
    assert_eq!(ended.ended_by, Some(Party::Customer));
    let prompt = tokio::time::timeout(WAIT, prompts.recv())
        .await
        .expect("no rating prompt")
        .unwrap();
    assert_eq!(prompt.handoff_request_id, Some(request.id));

    // a broadcast to everyone reaches the operator as well
    supervisor
        .client
        .broadcast(BroadcastBody {
            title: "Shift change".into(),
            content: "handover at 18:00".into(),
            audience: Audience::All,
        })
        .await
        .unwrap();
    until_count(&mut unread, 2).await;
    assert!(hub.mark_all_read().await.unwrap() >= 1);
    hub.badge().flush().await;
    assert_eq!(surface.unread(), 0);

    prompter.shutdown();
    follower.await.unwrap();
    presence.shutdown();
    drop(surface);
    cust_side.shutdown().await;
    op_side.shutdown().await;
    harness.shutdown().await;
}

