//! Property-based tests for the identity and room registries.
//!
//! These tests verify invariants that must hold for all inputs: active-name
//! uniqueness, member-list integrity, ownership placement, and removal
//! outcome classification.

use std::collections::HashSet;

use parlor_server::{IdentityRegistry, RemovalOutcome, RoomRegistry};
use proptest::prelude::*;

/// Strategy for arbitrary requested names, including empty and colliding
/// ones.
fn requested_names() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(
        prop_oneof![
            Just(String::new()),
            "[a-z]{1,8}",
            // Names shaped like the generated placeholders
            (1u64..20).prop_map(|n| format!("user-{n}")),
        ],
        1..30,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: no two simultaneously-active users ever hold the same name,
    /// for any sequence of register calls.
    #[test]
    fn prop_active_names_are_unique(names in requested_names()) {
        let mut registry = IdentityRegistry::new();

        for (connection_id, name) in names.iter().enumerate() {
            registry.register(connection_id as u64, name, 100);
        }

        let mut seen = HashSet::new();
        for record in registry.list() {
            prop_assert!(seen.insert(record.name.clone()), "duplicate active name: {}", record.name);
        }
        prop_assert_eq!(registry.len(), names.len());
    }

    /// Property: registration always succeeds with some name; empty requests
    /// always produce a `user-<n>` placeholder.
    #[test]
    fn prop_register_never_fails(names in requested_names()) {
        let mut registry = IdentityRegistry::new();

        for (connection_id, name) in names.iter().enumerate() {
            let record = registry.register(connection_id as u64, name, 100);
            prop_assert!(!record.name.is_empty());
            if name.is_empty() {
                prop_assert!(record.name.starts_with("user-"));
            }
        }
    }

    /// Property: a freed name is immediately reusable.
    #[test]
    fn prop_removed_name_is_reusable(name in "[a-z]{1,12}") {
        let mut registry = IdentityRegistry::new();

        registry.register(1, &name, 100);
        registry.register(2, "other", 100);

        registry.remove(1);

        let record = registry.rename(2, &name, 200).unwrap();
        prop_assert_eq!(&record.name, &name);
    }

    /// Property: after create succeeds, the member list has no duplicates and
    /// its first element is the owner.
    #[test]
    fn prop_created_room_has_owner_first_no_duplicates(
        room_id in 1u128..,
        owner in 1u64..100,
        invitees in prop::collection::vec(1u64..100, 1..20),
    ) {
        let mut registry = RoomRegistry::new();

        match registry.create(room_id, "room", owner, &invitees, "", 100) {
            Ok(room) => {
                prop_assert_eq!(room.members[0], owner);

                let unique: HashSet<u64> = room.members.iter().copied().collect();
                prop_assert_eq!(unique.len(), room.members.len(), "duplicate members");
                prop_assert!(room.members.len() >= 2);
            },
            Err(_) => {
                // Only legitimate failure: every invitee collapsed into the owner
                let distinct: HashSet<u64> =
                    invitees.iter().copied().filter(|&key| key != owner).collect();
                prop_assert!(distinct.is_empty());
                prop_assert!(registry.get(room_id).is_none(), "failed create must not insert");
            },
        }
    }

    /// Property: removing members one by one classifies every outcome
    /// correctly and destroys the room exactly at zero members.
    #[test]
    fn prop_removal_outcomes_classify_correctly(
        room_id in 1u128..,
        members in prop::collection::hash_set(1u64..100, 2..20),
        seed in any::<u64>(),
    ) {
        let members: Vec<u64> = members.into_iter().collect();
        let owner = members[0];

        let mut registry = RoomRegistry::new();
        registry.create(room_id, "room", owner, &members[1..], "", 100).unwrap();

        // Deterministic pseudo-random removal order
        let mut order = members.clone();
        let mut state = seed | 1;
        for i in (1..order.len()).rev() {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            order.swap(i, (state as usize) % (i + 1));
        }

        for (idx, user) in order.iter().enumerate() {
            let remaining_before = members.len() - idx;
            let was_owner = registry.get(room_id).unwrap().owner() == Some(*user);

            let outcome = registry.remove_member(room_id, *user).unwrap();

            if remaining_before == 1 {
                prop_assert_eq!(outcome, RemovalOutcome::RoomNowEmpty);
                prop_assert!(registry.get(room_id).is_none());
                prop_assert_eq!(registry.list().count(), 0);
            } else if was_owner {
                let new_owner = registry.get(room_id).unwrap().owner().unwrap();
                prop_assert_eq!(outcome, RemovalOutcome::OwnershipTransferred(new_owner));
            } else {
                prop_assert_eq!(outcome, RemovalOutcome::MemberRemoved);
            }
        }
    }

    /// Property: unlocked rooms accept any password attempt; locked rooms
    /// accept exactly the stored password.
    #[test]
    fn prop_password_check(
        room_id in 1u128..,
        password in "[a-z0-9]{0,12}",
        attempt in "[a-z0-9]{0,12}",
    ) {
        let mut registry = RoomRegistry::new();
        registry.create(room_id, "room", 1, &[2], &password, 100).unwrap();

        let accepted = registry.check_password(room_id, &attempt).unwrap();

        if password.is_empty() {
            prop_assert!(accepted, "unlocked room must accept any attempt");
        } else {
            prop_assert_eq!(accepted, password == attempt);
        }
    }

    /// Property: add_member is idempotent and never introduces duplicates.
    #[test]
    fn prop_add_member_idempotent(
        room_id in 1u128..,
        joiners in prop::collection::vec(1u64..50, 1..30),
    ) {
        let mut registry = RoomRegistry::new();
        registry.create(room_id, "room", 100, &[101], "", 100).unwrap();

        for joiner in joiners {
            registry.add_member(room_id, joiner).unwrap();
        }

        let room = registry.get(room_id).unwrap();
        let unique: HashSet<u64> = room.members.iter().copied().collect();
        prop_assert_eq!(unique.len(), room.members.len());
    }
}
