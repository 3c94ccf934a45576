//! Room registry: membership lists, ownership, and access metadata.
//!
//! Rooms must be explicitly created with at least one invitee besides the
//! owner - a room containing only its creator is never created. Member order
//! matters: index 0 is the room owner, and removing the owner transfers
//! ownership to the new head of the list.
//!
//! The canonical destruction rule is destroy-at-zero: a room lives while it
//! has at least one member and is deleted the moment the last one leaves.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Errors from room registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// Fewer than two distinct members would remain after filtering invitees.
    #[error("room needs at least one other member")]
    EmptyRoom,

    /// Room does not exist.
    #[error("room not found: {0:032x}")]
    RoomNotFound(u128),

    /// Room id collision on creation.
    #[error("room already exists: {0:032x}")]
    RoomAlreadyExists(u128),

    /// User is not a member of the room.
    #[error("user {user_id} is not a member of room {room_id:032x}")]
    NotAMember {
        /// Room that was targeted
        room_id: u128,
        /// User that is not a member
        user_id: u64,
    },
}

/// Outcome of removing a member from a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalOutcome {
    /// The room has zero members left and was destroyed.
    RoomNowEmpty,
    /// The removed member was the owner; ownership transferred to the new
    /// member at index 0.
    OwnershipTransferred(u64),
    /// A non-owner member was removed; the room persists.
    MemberRemoved,
}

/// A chat room.
///
/// Serde-derived so the durable mirror can persist rooms as-is. The password
/// never appears on the wire - only in registry state and the mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    /// Room identifier.
    pub id: u128,
    /// Room title.
    pub title: String,
    /// Member identity keys. Index 0 is the owner. Never contains duplicates.
    pub members: Vec<u64>,
    /// Room password. `None` means unlocked.
    pub password: Option<String>,
    /// Unix seconds when the room was created.
    pub created_at_secs: u64,
}

impl Room {
    /// Current owner: the member at index 0. `None` only during teardown.
    #[must_use]
    pub fn owner(&self) -> Option<u64> {
        self.members.first().copied()
    }

    /// Whether joining requires a password.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.password.is_some()
    }

    /// Whether a user is a member of this room.
    #[must_use]
    pub fn is_member(&self, user_id: u64) -> bool {
        self.members.contains(&user_id)
    }
}

/// Registry of live rooms.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<u128, Room>,
}

impl RoomRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a room.
    ///
    /// `invitees` should already be filtered to identities currently present
    /// in the identity registry. The member list becomes
    /// `[owner, ...invitees]` with duplicates removed and order preserved.
    ///
    /// Fails with [`RoomError::EmptyRoom`] if fewer than 2 distinct members
    /// remain - nothing is inserted on failure, so the room id is released.
    ///
    /// An empty password means unlocked.
    pub fn create(
        &mut self,
        room_id: u128,
        title: impl Into<String>,
        owner_id: u64,
        invitees: &[u64],
        password: &str,
        now_secs: u64,
    ) -> Result<&Room, RoomError> {
        if self.rooms.contains_key(&room_id) {
            return Err(RoomError::RoomAlreadyExists(room_id));
        }

        let mut seen = HashSet::new();
        let mut members = Vec::with_capacity(invitees.len() + 1);
        seen.insert(owner_id);
        members.push(owner_id);
        for &invitee in invitees {
            if seen.insert(invitee) {
                members.push(invitee);
            }
        }

        if members.len() < 2 {
            return Err(RoomError::EmptyRoom);
        }

        let room = Room {
            id: room_id,
            title: title.into(),
            members,
            password: if password.is_empty() { None } else { Some(password.to_string()) },
            created_at_secs: now_secs,
        };

        Ok(self.rooms.entry(room_id).or_insert(room))
    }

    /// Append a member to a room. No-op if already a member.
    pub fn add_member(&mut self, room_id: u128, user_id: u64) -> Result<&Room, RoomError> {
        let room = self.rooms.get_mut(&room_id).ok_or(RoomError::RoomNotFound(room_id))?;

        if !room.members.contains(&user_id) {
            room.members.push(user_id);
        }

        Ok(room)
    }

    /// Remove a member from a room, classifying the outcome.
    ///
    /// - [`RemovalOutcome::RoomNowEmpty`]: post-removal member count is zero;
    ///   the room is destroyed and absent from [`Self::list`] afterwards.
    /// - [`RemovalOutcome::OwnershipTransferred`]: the removed member was at
    ///   index 0 and members remain; carries the new owner.
    /// - [`RemovalOutcome::MemberRemoved`]: any other removal.
    pub fn remove_member(&mut self, room_id: u128, user_id: u64) -> Result<RemovalOutcome, RoomError> {
        let room = self.rooms.get_mut(&room_id).ok_or(RoomError::RoomNotFound(room_id))?;

        let idx = room
            .members
            .iter()
            .position(|&member| member == user_id)
            .ok_or(RoomError::NotAMember { room_id, user_id })?;

        room.members.remove(idx);

        if room.members.is_empty() {
            self.rooms.remove(&room_id);
            return Ok(RemovalOutcome::RoomNowEmpty);
        }

        if idx == 0 {
            // INVARIANT: members is non-empty, checked above.
            #[allow(clippy::expect_used)]
            let new_owner = room.owner().expect("invariant: room has members");
            return Ok(RemovalOutcome::OwnershipTransferred(new_owner));
        }

        Ok(RemovalOutcome::MemberRemoved)
    }

    /// Delete a room outright. Idempotent; returns the room if it existed.
    pub fn delete(&mut self, room_id: u128) -> Option<Room> {
        self.rooms.remove(&room_id)
    }

    /// Room by id. `None` if it doesn't exist.
    #[must_use]
    pub fn get(&self, room_id: u128) -> Option<&Room> {
        self.rooms.get(&room_id)
    }

    /// All live rooms (iteration order is unspecified).
    pub fn list(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    /// The room a user belongs to, if any.
    ///
    /// Linear scan - rooms are assumed few relative to users, so O(rooms) is
    /// acceptable here.
    #[must_use]
    pub fn find_by_member(&self, user_id: u64) -> Option<&Room> {
        self.rooms.values().find(|room| room.is_member(user_id))
    }

    /// Set or clear a room's password. An empty password unlocks the room.
    pub fn set_password(&mut self, room_id: u128, password: &str) -> Result<&Room, RoomError> {
        let room = self.rooms.get_mut(&room_id).ok_or(RoomError::RoomNotFound(room_id))?;

        room.password = if password.is_empty() { None } else { Some(password.to_string()) };

        Ok(room)
    }

    /// Check a password attempt against a room.
    ///
    /// Unlocked rooms accept any attempt, including the empty string.
    pub fn check_password(&self, room_id: u128, attempt: &str) -> Result<bool, RoomError> {
        let room = self.rooms.get(&room_id).ok_or(RoomError::RoomNotFound(room_id))?;

        Ok(match &room.password {
            None => true,
            Some(password) => password == attempt,
        })
    }

    /// Number of live rooms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether there are no live rooms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
