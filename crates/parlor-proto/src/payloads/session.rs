//! Session lifecycle payloads: registration, naming, presence notices.

use serde::{Deserialize, Serialize};

use super::room::RoomEntry;

/// A user as seen on the wire.
///
/// Never carries connection ids or anything session-scoped; the identity key
/// is the stable handle for one connection's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    /// Stable identity key.
    pub key: u64,
    /// Display name, unique among active users.
    pub name: String,
    /// Whether this user has opted out of loud-speaker delivery.
    pub loud_speaker_opt_out: bool,
}

/// Client request for an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Register {
    /// Preferred display name. Empty or taken names fall back to a generated
    /// name; registration itself never fails.
    pub name: String,
}

/// Server reply to [`Register`]: the assigned identity plus a full snapshot
/// of everyone currently connected and every room.
///
/// Sent only to the joining connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Welcome {
    /// Identity key assigned to the requester.
    pub user_id: u64,
    /// Display name assigned to the requester (may be generated).
    pub name: String,
    /// All currently active users, including the requester.
    pub users: Vec<UserEntry>,
    /// All rooms. Passwords are never included, only lock state.
    pub rooms: Vec<RoomEntry>,
}

/// Client request to change display names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rename {
    /// Requested new display name.
    pub name: String,
}

/// Notice: a user changed display names. Sent to all users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameChanged {
    /// Identity whose name changed.
    pub user_id: u64,
    /// The new display name.
    pub name: String,
}

/// Notice: a new user registered. Sent to all other users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserJoined {
    /// The newly registered user.
    pub user: UserEntry,
}

/// Notice: a user disconnected. Sent to all remaining users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLeft {
    /// Identity key of the departed user.
    pub user_id: u64,
    /// Display name of the departed user, now free for reuse.
    pub name: String,
}
