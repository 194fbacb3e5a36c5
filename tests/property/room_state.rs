// Test-specific lint overrides: property tests use unwrap/expect freely.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc
)]

//! Property-based tests for room state reconciliation.
//!
//! Uses proptest to verify:
//! 1. Replaying any join/leave sequence yields exactly the
//!    joined-minus-left id set, in join order, with no duplicates.
//! 2. Appending more than the retention cap keeps exactly the most
//!    recent `cap` messages, oldest first.
//! 3. Status updates never change roster membership.

use std::collections::HashSet;

use proptest::prelude::*;
use watchparty::room::RoomState;
use watchparty_proto::server::{
    ChatBroadcastPayload, ServerEvent, UserJoinedPayload, UserLeftPayload, UserStatusPayload,
};
use watchparty_proto::user::{Participant, Role, UserRef};

#[derive(Debug, Clone)]
enum RosterOp {
    Join(u8),
    Leave(u8),
    Status(u8, bool),
}

fn arb_roster_op() -> impl Strategy<Value = RosterOp> {
    prop_oneof![
        (0u8..16).prop_map(RosterOp::Join),
        (0u8..16).prop_map(RosterOp::Leave),
        ((0u8..16), any::<bool>()).prop_map(|(id, online)| RosterOp::Status(id, online)),
    ]
}

fn participant(n: u8) -> Participant {
    Participant {
        id: format!("user-{n}"),
        username: format!("name-{n}"),
        avatar_url: None,
        is_online: true,
        role: Role::Member,
        has_control_permission: false,
    }
}

fn apply_op(state: &mut RoomState, op: &RosterOp) {
    match *op {
        RosterOp::Join(n) => state.apply(&ServerEvent::UserJoined(UserJoinedPayload {
            user: participant(n),
            user_count: 0,
        })),
        RosterOp::Leave(n) => state.apply(&ServerEvent::UserLeft(UserLeftPayload {
            user_id: format!("user-{n}"),
            username: format!("name-{n}"),
            user_count: 0,
        })),
        RosterOp::Status(n, is_online) => {
            state.apply(&ServerEvent::UserStatus(UserStatusPayload {
                user_id: format!("user-{n}"),
                is_online,
            }));
        }
    }
}

fn chat_event(n: usize) -> ServerEvent {
    ServerEvent::ChatMessage(ChatBroadcastPayload {
        id: Some(format!("m{n}")),
        user: UserRef {
            id: "u1".to_string(),
            username: "alice".to_string(),
            role: Role::Member,
            avatar_url: None,
        },
        message: format!("message {n}"),
        timestamp: u64::try_from(n).unwrap(),
    })
}

proptest! {
    /// The roster after any op sequence is exactly the set of ids whose
    /// last membership op was a join, with no duplicates.
    #[test]
    fn roster_replay_matches_reference(ops in proptest::collection::vec(arb_roster_op(), 0..64)) {
        let mut state = RoomState::default();
        let mut reference: Vec<String> = Vec::new();
        for op in &ops {
            apply_op(&mut state, op);
            match *op {
                RosterOp::Join(n) => {
                    let id = format!("user-{n}");
                    if !reference.contains(&id) {
                        reference.push(id);
                    }
                }
                RosterOp::Leave(n) => {
                    let id = format!("user-{n}");
                    reference.retain(|r| r != &id);
                }
                RosterOp::Status(..) => {}
            }
        }

        let roster: Vec<String> =
            state.participants().iter().map(|p| p.id.clone()).collect();
        prop_assert_eq!(&roster, &reference);

        let unique: HashSet<&String> = roster.iter().collect();
        prop_assert_eq!(unique.len(), roster.len());
    }

    /// Message retention keeps exactly the most recent `cap` messages,
    /// oldest first.
    #[test]
    fn message_retention_keeps_most_recent(
        cap in 1usize..32,
        total in 0usize..96,
    ) {
        let mut state = RoomState::new(cap);
        for n in 0..total {
            state.apply(&chat_event(n));
        }

        let expected_len = total.min(cap);
        prop_assert_eq!(state.messages().len(), expected_len);

        let first_kept = total - expected_len;
        for (offset, message) in state.messages().iter().enumerate() {
            prop_assert_eq!(&message.content, &format!("message {}", first_kept + offset));
        }
    }

    /// Status updates flip the online flag but never change membership.
    #[test]
    fn status_updates_preserve_membership(
        joins in proptest::collection::vec(0u8..16, 0..16),
        statuses in proptest::collection::vec((0u8..16, any::<bool>()), 0..32),
    ) {
        let mut state = RoomState::default();
        for n in &joins {
            apply_op(&mut state, &RosterOp::Join(*n));
        }
        let before: Vec<String> =
            state.participants().iter().map(|p| p.id.clone()).collect();

        for (n, online) in &statuses {
            apply_op(&mut state, &RosterOp::Status(*n, *online));
        }
        let after: Vec<String> =
            state.participants().iter().map(|p| p.id.clone()).collect();
        prop_assert_eq!(before, after);
    }
}
