//! Room payloads: creation, membership, room-scoped notices.

use serde::{Deserialize, Serialize};

/// A room as seen on the wire.
///
/// The password never leaves the server; clients only learn whether the room
/// is locked. Member order matters: index 0 is the room owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomEntry {
    /// Room identifier.
    pub id: u128,
    /// Room title.
    pub title: String,
    /// Member identity keys, owner first.
    pub members: Vec<u64>,
    /// Whether joining requires a password.
    pub locked: bool,
}

/// Client request to create a room.
///
/// The requester becomes the owner; invitees that are currently registered
/// are added as members. A room needs at least one valid invitee besides the
/// requester or creation fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRoom {
    /// Room title.
    pub title: String,
    /// Identity keys to invite.
    pub invitees: Vec<u64>,
    /// Room password. Empty means unlocked.
    pub password: String,
}

/// Client request to join a room (room id in the frame header).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRoom {
    /// Password attempt. Ignored for unlocked rooms.
    pub password: String,
}

/// Owner request to kick members from a room (room id in the header).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KickMembers {
    /// Identity keys to remove.
    pub targets: Vec<u64>,
}

/// Owner request to set or clear a room password (room id in the header).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetRoomPassword {
    /// New password. Empty clears the lock.
    pub password: String,
}

/// Room-scoped text message (room id in the header).
///
/// Sent client-to-server to request fan-out, and server-to-client as the
/// fanned-out message with the sender in the header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMessage {
    /// Message text.
    pub text: String,
}

/// Notice: a room was created. Sent to all users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomCreated {
    /// The new room.
    pub room: RoomEntry,
}

/// Notice: a room's member list changed. Sent to all users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipChanged {
    /// Current member identity keys, owner first.
    pub members: Vec<u64>,
}

/// Confirmation: the receiver is now a member of this room.
///
/// Sent on creation (to the owner and each invitee) and on join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinedRoom {
    /// The room the receiver now belongs to.
    pub room: RoomEntry,
}

/// Notice to room members: someone joined the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberJoined {
    /// Identity key of the new member.
    pub user_id: u64,
    /// Display name of the new member.
    pub name: String,
}

/// The member who became owner after an ownership transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomOwner {
    /// Identity key of the new owner.
    pub user_id: u64,
    /// Display name of the new owner.
    pub name: String,
}

/// Notice to room members: someone left the room.
///
/// When the departing member was the owner, `new_owner` announces the
/// transfer to the member now at the head of the list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberLeft {
    /// Identity key of the departed member.
    pub user_id: u64,
    /// Display name of the departed member.
    pub name: String,
    /// New owner, when ownership transferred.
    pub new_owner: Option<RoomOwner>,
}

/// Notice to room members: how many members were kicked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembersKicked {
    /// Number of members removed.
    pub count: u32,
}

/// Notice: a room's lock state changed. Sent to all users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomLockChanged {
    /// Whether the room now requires a password.
    pub locked: bool,
}
