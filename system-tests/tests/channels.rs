// system-tests/tests/channels.rs
// ============================================================================
// Module: Channel and Message Scenarios
// Description: Direct-channel interning, membership rules, immutability.
// ============================================================================
//! ## Overview
//! Covers canonical direct-channel interning across argument order, group
//! membership discipline, message membership enforcement, message
//! immutability, and direct-message sending.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    missing_docs,
    clippy::missing_docs_in_private_items,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeSet;

use elemgraph_core::ActorId;
use elemgraph_core::ChannelKind;
use elemgraph_core::DeleteOptions;
use elemgraph_core::DirectMessageInput;
use elemgraph_core::Element;
use elemgraph_core::ElementPatch;
use elemgraph_core::EngineError;
use elemgraph_core::EventFilter;
use elemgraph_core::EventKind;
use elemgraph_core::MutateOptions;
use elemgraph_core::NewChannel;
use elemgraph_core::NewElement;
use elemgraph_core::NewMessage;
use system_tests::alice;
use system_tests::as_alice;
use system_tests::harness;

fn group_channel(
    engine: &elemgraph_core::ElementEngine<elemgraph_store_sqlite::SqliteBackend>,
    name: &str,
    members: &[&str],
) -> elemgraph_core::Channel {
    let input = NewElement::Channel(NewChannel {
        name: Some(name.to_string()),
        members: members.iter().map(|member| ActorId::new(*member)).collect::<BTreeSet<_>>(),
        ..NewChannel::default()
    });
    match engine.create(input, &as_alice()).unwrap() {
        Element::Channel(channel) => channel,
        _ => panic!("expected a channel"),
    }
}

// ============================================================================
// SECTION: Direct Channel Interning
// ============================================================================

#[test]
fn test_direct_channel_interning_is_stable_across_swaps() {
    let h = harness();
    let u1 = ActorId::new("u1");
    let u2 = ActorId::new("u2");

    let (first, created) = h.engine.find_or_create_direct_channel(&u1, &u2, &u1).unwrap();
    assert!(created);
    assert_eq!(first.channel_type, ChannelKind::Direct);

    let (second, created) = h.engine.find_or_create_direct_channel(&u2, &u1, &u2).unwrap();
    assert!(!created);
    assert_eq!(second.core.id, first.core.id);

    let error = h
        .engine
        .add_channel_member(&first.core.id, &ActorId::new("u3"), &u1)
        .unwrap_err();
    assert!(matches!(error, EngineError::DirectChannelMembership { .. }));
}

#[test]
fn test_direct_channel_requires_a_pair_member_actor() {
    let h = harness();
    let error = h
        .engine
        .find_or_create_direct_channel(
            &ActorId::new("u1"),
            &ActorId::new("u2"),
            &ActorId::new("intruder"),
        )
        .unwrap_err();
    assert!(matches!(error, EngineError::InvalidInput { .. }));
}

// ============================================================================
// SECTION: Group Membership
// ============================================================================

#[test]
fn test_member_add_is_idempotent() {
    let h = harness();
    let channel = group_channel(&h.engine, "ops", &["alice", "bob"]);

    let updated = h
        .engine
        .add_channel_member(&channel.core.id, &ActorId::new("carol"), &alice())
        .unwrap();
    assert!(updated.members.contains(&ActorId::new("carol")));

    let events_before = h
        .engine
        .get_events(&channel.core.id, &EventFilter::default())
        .unwrap()
        .len();
    let same = h
        .engine
        .add_channel_member(&channel.core.id, &ActorId::new("carol"), &alice())
        .unwrap();
    assert_eq!(same.members, updated.members);
    let events_after = h
        .engine
        .get_events(&channel.core.id, &EventFilter::default())
        .unwrap()
        .len();
    assert_eq!(events_after, events_before);
}

#[test]
fn test_non_member_cannot_modify_members() {
    let h = harness();
    let channel = group_channel(&h.engine, "ops", &["alice"]);
    let error = h
        .engine
        .add_channel_member(&channel.core.id, &ActorId::new("dave"), &ActorId::new("mallory"))
        .unwrap_err();
    assert!(matches!(error, EngineError::CannotModifyMembers { .. }));
}

#[test]
fn test_leave_channel_permits_self_removal() {
    let h = harness();
    let channel = group_channel(&h.engine, "ops", &["alice", "bob"]);
    let updated = h.engine.leave_channel(&channel.core.id, &ActorId::new("bob")).unwrap();
    assert!(!updated.members.contains(&ActorId::new("bob")));

    let error = h
        .engine
        .leave_channel(&channel.core.id, &ActorId::new("bob"))
        .unwrap_err();
    assert!(matches!(error, EngineError::NotAMember { .. }));
}

#[test]
fn test_membership_events_are_recorded() {
    let h = harness();
    let channel = group_channel(&h.engine, "ops", &["alice"]);
    h.engine
        .add_channel_member(&channel.core.id, &ActorId::new("bob"), &alice())
        .unwrap();
    h.engine
        .remove_channel_member(&channel.core.id, &ActorId::new("bob"), &alice())
        .unwrap();

    let events = h.engine.get_events(&channel.core.id, &EventFilter::default()).unwrap();
    assert!(events.iter().any(|event| event.event_type == EventKind::MemberAdded));
    assert!(events.iter().any(|event| event.event_type == EventKind::MemberRemoved));
}

#[test]
fn test_group_channel_names_are_unique_per_visibility() {
    let h = harness();
    group_channel(&h.engine, "ops", &["alice"]);
    let input = NewElement::Channel(NewChannel {
        name: Some("ops".to_string()),
        members: BTreeSet::from([alice()]),
        ..NewChannel::default()
    });
    let error = h.engine.create(input, &as_alice()).unwrap_err();
    assert!(matches!(error, EngineError::DuplicateName { .. }));
}

// ============================================================================
// SECTION: Messages
// ============================================================================

#[test]
fn test_messages_require_membership() {
    let h = harness();
    let channel = group_channel(&h.engine, "ops", &[]);
    let input = NewElement::Message(NewMessage {
        channel_id: channel.core.id.clone(),
        sender: ActorId::new("outsider"),
        content: Some("hello".to_string()),
        content_ref: None,
        attachments: Vec::new(),
        tags: BTreeSet::new(),
        metadata: std::collections::BTreeMap::new(),
    });
    let error = h.engine.create(input, &as_alice()).unwrap_err();
    assert!(matches!(error, EngineError::NotAMember { .. }));
}

#[test]
fn test_messages_are_immutable() {
    let h = harness();
    let channel = group_channel(&h.engine, "ops", &["alice"]);
    let input = NewElement::Message(NewMessage {
        channel_id: channel.core.id.clone(),
        sender: alice(),
        content: Some("hello".to_string()),
        content_ref: None,
        attachments: Vec::new(),
        tags: BTreeSet::new(),
        metadata: std::collections::BTreeMap::new(),
    });
    let message = h.engine.create(input, &as_alice()).unwrap();

    let update_error = h
        .engine
        .update(message.id(), ElementPatch::default(), &as_alice())
        .unwrap_err();
    assert!(matches!(update_error, EngineError::Immutable { .. }));

    let delete_error = h
        .engine
        .delete(message.id(), &DeleteOptions::new(alice()))
        .unwrap_err();
    assert!(matches!(delete_error, EngineError::Immutable { .. }));

    let events = h.engine.get_events(message.id(), &EventFilter::default()).unwrap();
    assert!(events.iter().all(|event| event.event_type == EventKind::Created));
}

#[test]
fn test_send_direct_message_interns_the_channel() {
    let h = harness();
    let sender = ActorId::new("u1");
    let input = DirectMessageInput {
        recipient: ActorId::new("u2"),
        content: Some("ping".to_string()),
        content_ref: None,
        attachments: Vec::new(),
        tags: BTreeSet::new(),
        metadata: std::collections::BTreeMap::new(),
    };
    let first = h.engine.send_direct_message(&sender, input).unwrap();
    assert!(first.channel_created);
    assert_eq!(first.message.sender, sender);

    let input = DirectMessageInput {
        recipient: ActorId::new("u2"),
        content: Some("pong".to_string()),
        content_ref: None,
        attachments: Vec::new(),
        tags: BTreeSet::new(),
        metadata: std::collections::BTreeMap::new(),
    };
    let second = h.engine.send_direct_message(&sender, input).unwrap();
    assert!(!second.channel_created);
    assert_eq!(second.channel.core.id, first.channel.core.id);
}

#[test]
fn test_reserved_actors_are_rejected_on_public_mutations() {
    let h = harness();
    let error = h
        .engine
        .create(
            system_tests::task_input("forged"),
            &MutateOptions::new(ActorId::new("system:blocked-cache")),
        )
        .unwrap_err();
    assert!(matches!(error, EngineError::InvalidInput { .. }));
}
