//! Membership-change propagation with retries

mod common;

use assert_matches::assert_matches;
use common::*;
use minits::common::Operation;
use minits::plan::{MembershipChange, MembershipChangeLog};
use minits::{Error, Status, StatusCode};
use std::sync::Arc;

fn add_node_log() -> MembershipChangeLog {
    MembershipChangeLog::new(MembershipChange::AddNode(node(9)), 3, 42)
}

fn groups() -> Vec<minits::cluster::PartitionGroup> {
    vec![group(0, &[1, 2]), group(1, &[2, 3])]
}

#[tokio::test(start_paused = true)]
async fn test_every_group_receives_the_log() {
    let member = Arc::new(RecordingMember::new(node(1), groups()));
    let clients = Arc::new(ScriptedClients::ok());
    let coordinator = coordinator(
        Arc::new(ScriptedRouter::fixed(Vec::new()).with_groups(groups())),
        member.clone(),
        Arc::new(FakeSchema::default()),
        clients.clone(),
        test_config(),
    );

    coordinator
        .propagate_membership_change_log(&add_node_log())
        .await
        .unwrap();

    assert_eq!(member.local_calls(), 1);
    assert_eq!(clients.calls(), vec![(2, 1)]);
    let forwarded = coordinator
        .metrics()
        .operation(Operation::ForwardChangeMembership);
    assert_eq!(forwarded.calls.get(), 2);
    assert_eq!(forwarded.failures.get(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_retries_until_group_accepts() {
    let member = Arc::new(RecordingMember::new(node(1), groups()).with_local(
        |_, _, attempt| {
            if attempt < 3 {
                Status::new(StatusCode::NoLeader, "electing")
            } else {
                Status::ok()
            }
        },
    ));
    let clients = Arc::new(ScriptedClients::ok());
    let coordinator = coordinator(
        Arc::new(ScriptedRouter::fixed(Vec::new()).with_groups(groups())),
        member.clone(),
        Arc::new(FakeSchema::default()),
        clients.clone(),
        test_config(),
    );

    coordinator
        .propagate_membership_change_log(&add_node_log())
        .await
        .unwrap();

    assert_eq!(member.local_calls(), 4);
    assert_eq!(clients.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_write_timeout() {
    let member = Arc::new(
        RecordingMember::new(node(1), groups())
            .with_local(|_, _, _| Status::new(StatusCode::NoLeader, "electing")),
    );
    let clients = Arc::new(ScriptedClients::ok());
    let coordinator = coordinator(
        Arc::new(ScriptedRouter::fixed(Vec::new()).with_groups(groups())),
        member.clone(),
        Arc::new(FakeSchema::default()),
        clients.clone(),
        test_config(),
    );

    let result = coordinator
        .propagate_membership_change_log(&add_node_log())
        .await;

    let message = assert_matches!(result, Err(Error::ChangeMembership(message)) => message);
    assert!(message.starts_with("Apply"));
    assert!(message.contains("Forward change membership log"));
    assert!(message.contains(&groups()[0].to_string()));
    assert!(!message.contains(&groups()[1].to_string()));

    // 100ms budget, 10ms between attempts
    let attempts = member.local_calls();
    assert!((10..=13).contains(&attempts), "attempts: {}", attempts);
    // The healthy group is not held back by the failing one.
    assert_eq!(clients.calls().len(), 1);

    let forwarded = coordinator
        .metrics()
        .operation(Operation::ForwardChangeMembership);
    assert_eq!(forwarded.failures.get(), 1);
}

#[tokio::test]
async fn test_no_data_groups() {
    let coordinator = coordinator(
        Arc::new(ScriptedRouter::fixed(Vec::new())),
        Arc::new(RecordingMember::new(node(1), Vec::new())),
        Arc::new(FakeSchema::default()),
        Arc::new(ScriptedClients::ok()),
        test_config(),
    );

    assert!(coordinator
        .propagate_membership_change_log(&add_node_log())
        .await
        .is_ok());
}
