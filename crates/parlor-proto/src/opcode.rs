//! Operation codes for all protocol events.
//!
//! Opcodes are grouped by range: `0x00xx` session lifecycle, `0x01xx`
//! presence/loud-speaker, `0x02xx` rooms, `0x0Fxx` errors. The opcode in the
//! frame header identifies the payload type, so payloads carry no variant tag
//! on the wire.

/// Operation code identifying a protocol event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    // Session lifecycle (0x00xx)
    /// Client requests an identity, optionally with a preferred name.
    Register = 0x0001,
    /// Server reply to Register: assigned identity plus full snapshot.
    Welcome = 0x0002,
    /// Client requests a display-name change.
    Rename = 0x0003,
    /// Client announces a graceful disconnect.
    Goodbye = 0x0004,

    // Presence / loud-speaker (0x01xx)
    /// Loud-speaker broadcast. Client sends text; server fans it out to every
    /// identity that has not opted out.
    LoudSpeaker = 0x0101,
    /// Client toggles its loud-speaker opt-out flag.
    LoudSpeakerOptOut = 0x0102,
    /// Server reports the requester's new loud-speaker setting.
    LoudSpeakerSetting = 0x0103,
    /// Server notice: a new user registered (sent to all others).
    UserJoined = 0x0104,
    /// Server notice: a user disconnected (sent to all others).
    UserLeft = 0x0105,
    /// Server notice: a user changed names (sent to all).
    NameChanged = 0x0106,

    // Rooms (0x02xx)
    /// Client creates a room with a set of invitees.
    CreateRoom = 0x0201,
    /// Client joins an existing room (room id in header).
    JoinRoom = 0x0202,
    /// Client leaves a room (room id in header).
    LeaveRoom = 0x0203,
    /// Room owner kicks one or more members.
    KickMembers = 0x0204,
    /// Room owner sets or clears the room password.
    SetRoomPassword = 0x0205,
    /// Room-scoped text message (room id in header).
    RoomMessage = 0x0206,
    /// Server notice: a room was created (sent to all).
    RoomCreated = 0x0207,
    /// Server notice: a room was destroyed (sent to all).
    RoomDeleted = 0x0208,
    /// Server notice: a room's member list changed (sent to all).
    MembershipChanged = 0x0209,
    /// Server confirmation: the receiver is now a member of this room.
    JoinedRoom = 0x020A,
    /// Server confirmation: the receiver left this room.
    LeftRoom = 0x020B,
    /// Server notice to room members: someone joined.
    MemberJoined = 0x020C,
    /// Server notice to room members: someone left (with optional new owner).
    MemberLeft = 0x020D,
    /// Server notice to a kicked member.
    Kicked = 0x020E,
    /// Server notice to room members: how many members were kicked.
    MembersKicked = 0x020F,
    /// Server notice: a room's lock state changed (sent to all).
    RoomLockChanged = 0x0210,

    // Errors (0x0Fxx)
    /// Structured error response, sent to the originating connection only.
    Error = 0x0F01,
}

impl Opcode {
    /// Raw u16 value of this opcode.
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Parse an opcode from its raw u16 value. `None` if unrecognized.
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::Register),
            0x0002 => Some(Self::Welcome),
            0x0003 => Some(Self::Rename),
            0x0004 => Some(Self::Goodbye),
            0x0101 => Some(Self::LoudSpeaker),
            0x0102 => Some(Self::LoudSpeakerOptOut),
            0x0103 => Some(Self::LoudSpeakerSetting),
            0x0104 => Some(Self::UserJoined),
            0x0105 => Some(Self::UserLeft),
            0x0106 => Some(Self::NameChanged),
            0x0201 => Some(Self::CreateRoom),
            0x0202 => Some(Self::JoinRoom),
            0x0203 => Some(Self::LeaveRoom),
            0x0204 => Some(Self::KickMembers),
            0x0205 => Some(Self::SetRoomPassword),
            0x0206 => Some(Self::RoomMessage),
            0x0207 => Some(Self::RoomCreated),
            0x0208 => Some(Self::RoomDeleted),
            0x0209 => Some(Self::MembershipChanged),
            0x020A => Some(Self::JoinedRoom),
            0x020B => Some(Self::LeftRoom),
            0x020C => Some(Self::MemberJoined),
            0x020D => Some(Self::MemberLeft),
            0x020E => Some(Self::Kicked),
            0x020F => Some(Self::MembersKicked),
            0x0210 => Some(Self::RoomLockChanged),
            0x0F01 => Some(Self::Error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_round_trip() {
        let all = [
            Opcode::Register,
            Opcode::Welcome,
            Opcode::Rename,
            Opcode::Goodbye,
            Opcode::LoudSpeaker,
            Opcode::LoudSpeakerOptOut,
            Opcode::LoudSpeakerSetting,
            Opcode::UserJoined,
            Opcode::UserLeft,
            Opcode::NameChanged,
            Opcode::CreateRoom,
            Opcode::JoinRoom,
            Opcode::LeaveRoom,
            Opcode::KickMembers,
            Opcode::SetRoomPassword,
            Opcode::RoomMessage,
            Opcode::RoomCreated,
            Opcode::RoomDeleted,
            Opcode::MembershipChanged,
            Opcode::JoinedRoom,
            Opcode::LeftRoom,
            Opcode::MemberJoined,
            Opcode::MemberLeft,
            Opcode::Kicked,
            Opcode::MembersKicked,
            Opcode::RoomLockChanged,
            Opcode::Error,
        ];

        for opcode in all {
            assert_eq!(Opcode::from_u16(opcode.to_u16()), Some(opcode));
        }
    }

    #[test]
    fn unknown_opcode_is_none() {
        assert_eq!(Opcode::from_u16(0xFFFF), None);
        assert_eq!(Opcode::from_u16(0x0000), None);
    }
}
