//! CBOR-encoded protocol messages.
//!
//! Frame headers are raw binary for performance, but payloads use CBOR for
//! type safety and forward compatibility. The `Payload` enum covers all
//! message types: session lifecycle, loud-speaker, rooms, and errors.
//!
//! CBOR is self-describing (field names embedded), compact, and needs no code
//! generation. The transport routes frames without deserializing payloads;
//! only the coordinator and clients do.
//!
//! # Invariants
//!
//! Each payload variant maps to exactly one opcode (enforced by match
//! exhaustiveness). Round-trip encoding must produce identical values.

pub mod presence;
pub mod room;
pub mod session;

use bytes::BufMut;
use serde::{Deserialize, Serialize};

use crate::{
    Frame, FrameHeader, Opcode,
    errors::{ProtocolError, Result},
};

/// All possible frame payloads.
///
/// The payload type is determined by the `Opcode` in the frame header, so we
/// serialize only the inner struct content (no variant tag in CBOR). This
/// prevents mismatched opcode/payload pairs: the header's opcode alone
/// selects the deserializer.
///
/// Variants without an inner struct encode as zero bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    // Session lifecycle
    /// Identity request
    Register(session::Register),
    /// Identity assignment + full snapshot
    Welcome(session::Welcome),
    /// Display-name change request
    Rename(session::Rename),
    /// Graceful disconnect
    Goodbye,

    // Presence / loud-speaker
    /// Loud-speaker broadcast
    LoudSpeaker(presence::LoudSpeaker),
    /// Loud-speaker opt-out toggle
    LoudSpeakerOptOut,
    /// Loud-speaker setting report
    LoudSpeakerSetting(presence::LoudSpeakerSetting),
    /// New-user notice
    UserJoined(session::UserJoined),
    /// User-departed notice
    UserLeft(session::UserLeft),
    /// Name-changed notice
    NameChanged(session::NameChanged),

    // Rooms
    /// Room creation request
    CreateRoom(room::CreateRoom),
    /// Room join request
    JoinRoom(room::JoinRoom),
    /// Room leave request
    LeaveRoom,
    /// Kick request
    KickMembers(room::KickMembers),
    /// Password change request
    SetRoomPassword(room::SetRoomPassword),
    /// Room-scoped message
    RoomMessage(room::RoomMessage),
    /// Room-created notice
    RoomCreated(room::RoomCreated),
    /// Room-deleted notice
    RoomDeleted,
    /// Membership update notice
    MembershipChanged(room::MembershipChanged),
    /// Membership confirmation
    JoinedRoom(room::JoinedRoom),
    /// Leave confirmation
    LeftRoom,
    /// Member-joined room notice
    MemberJoined(room::MemberJoined),
    /// Member-left room notice
    MemberLeft(room::MemberLeft),
    /// Individual kicked notice
    Kicked,
    /// Kick-count room notice
    MembersKicked(room::MembersKicked),
    /// Lock-state notice
    RoomLockChanged(room::RoomLockChanged),

    // Error frame
    /// Error response
    Error(ErrorPayload),
}

/// Error payload for error frames.
///
/// Every failed precondition maps to one of the stable codes below; the
/// message is advisory and may change between versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error code identifying the type of error.
    pub code: u16,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorPayload {
    /// Requested name is already held by an active user.
    pub const NAME_CONFLICT: u16 = 0x0001;
    /// Room creation left fewer than two distinct members.
    pub const EMPTY_ROOM: u16 = 0x0002;
    /// Password attempt for a locked room did not match.
    pub const WRONG_PASSWORD: u16 = 0x0003;
    /// Room or user does not exist.
    pub const NOT_FOUND: u16 = 0x0004;
    /// Event payload was malformed or missing required fields.
    pub const INVALID_PAYLOAD: u16 = 0x0005;
    /// Requester lacks the privilege for an owner-only action.
    pub const FORBIDDEN: u16 = 0x0006;

    /// Create a name-conflict error.
    pub fn name_conflict(name: impl Into<String>) -> Self {
        Self {
            code: Self::NAME_CONFLICT,
            message: format!("name already taken: '{}'", name.into()),
        }
    }

    /// Create an empty-room error.
    #[must_use]
    pub fn empty_room() -> Self {
        Self {
            code: Self::EMPTY_ROOM,
            message: "room needs at least one other reachable member".to_string(),
        }
    }

    /// Create a wrong-password error.
    #[must_use]
    pub fn wrong_password() -> Self {
        Self { code: Self::WRONG_PASSWORD, message: "wrong room password".to_string() }
    }

    /// Create a room-not-found error.
    #[must_use]
    pub fn room_not_found(room_id: u128) -> Self {
        Self { code: Self::NOT_FOUND, message: format!("room not found: {room_id:032x}") }
    }

    /// Create a not-found error with a custom description.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self { code: Self::NOT_FOUND, message: what.into() }
    }

    /// Create an invalid-payload error.
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self { code: Self::INVALID_PAYLOAD, message: msg.into() }
    }

    /// Create a forbidden error.
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self { code: Self::FORBIDDEN, message: msg.into() }
    }
}

/// Deserialize one CBOR payload, mapping the error.
fn de<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
}

impl Payload {
    /// Opcode corresponding to this payload type.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Register(_) => Opcode::Register,
            Self::Welcome(_) => Opcode::Welcome,
            Self::Rename(_) => Opcode::Rename,
            Self::Goodbye => Opcode::Goodbye,
            Self::LoudSpeaker(_) => Opcode::LoudSpeaker,
            Self::LoudSpeakerOptOut => Opcode::LoudSpeakerOptOut,
            Self::LoudSpeakerSetting(_) => Opcode::LoudSpeakerSetting,
            Self::UserJoined(_) => Opcode::UserJoined,
            Self::UserLeft(_) => Opcode::UserLeft,
            Self::NameChanged(_) => Opcode::NameChanged,
            Self::CreateRoom(_) => Opcode::CreateRoom,
            Self::JoinRoom(_) => Opcode::JoinRoom,
            Self::LeaveRoom => Opcode::LeaveRoom,
            Self::KickMembers(_) => Opcode::KickMembers,
            Self::SetRoomPassword(_) => Opcode::SetRoomPassword,
            Self::RoomMessage(_) => Opcode::RoomMessage,
            Self::RoomCreated(_) => Opcode::RoomCreated,
            Self::RoomDeleted => Opcode::RoomDeleted,
            Self::MembershipChanged(_) => Opcode::MembershipChanged,
            Self::JoinedRoom(_) => Opcode::JoinedRoom,
            Self::LeftRoom => Opcode::LeftRoom,
            Self::MemberJoined(_) => Opcode::MemberJoined,
            Self::MemberLeft(_) => Opcode::MemberLeft,
            Self::Kicked => Opcode::Kicked,
            Self::MembersKicked(_) => Opcode::MembersKicked,
            Self::RoomLockChanged(_) => Opcode::RoomLockChanged,
            Self::Error(_) => Opcode::Error,
        }
    }

    /// Encode the payload into a buffer.
    ///
    /// Serializes only the inner struct, NOT the variant tag; the frame
    /// header's opcode already identifies the payload type. Unit variants
    /// encode as zero bytes.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::CborEncode`] if serialization fails
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let mut writer = dst.writer();

        match self {
            Self::Goodbye
            | Self::LoudSpeakerOptOut
            | Self::LeaveRoom
            | Self::RoomDeleted
            | Self::LeftRoom
            | Self::Kicked => return Ok(()), // Zero-byte payloads
            Self::Register(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Welcome(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Rename(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::LoudSpeaker(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::LoudSpeakerSetting(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::UserJoined(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::UserLeft(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::NameChanged(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::CreateRoom(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::JoinRoom(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::KickMembers(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::SetRoomPassword(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::RoomMessage(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::RoomCreated(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::MembershipChanged(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::JoinedRoom(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::MemberJoined(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::MemberLeft(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::MembersKicked(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::RoomLockChanged(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Error(inner) => ciborium::ser::into_writer(inner, &mut writer),
        }
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))
    }

    /// Decode a payload from bytes based on the opcode.
    ///
    /// The size check happens BEFORE CBOR parsing begins, so the parser never
    /// sees maliciously large inputs.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::PayloadTooLarge`] if bytes exceed the protocol
    ///   maximum
    /// - [`ProtocolError::CborDecode`] if deserialization fails
    pub fn decode(opcode: Opcode, bytes: &[u8]) -> Result<Self> {
        if bytes.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        let payload = match opcode {
            Opcode::Register => Self::Register(de(bytes)?),
            Opcode::Welcome => Self::Welcome(de(bytes)?),
            Opcode::Rename => Self::Rename(de(bytes)?),
            Opcode::Goodbye => Self::Goodbye,
            Opcode::LoudSpeaker => Self::LoudSpeaker(de(bytes)?),
            Opcode::LoudSpeakerOptOut => Self::LoudSpeakerOptOut,
            Opcode::LoudSpeakerSetting => Self::LoudSpeakerSetting(de(bytes)?),
            Opcode::UserJoined => Self::UserJoined(de(bytes)?),
            Opcode::UserLeft => Self::UserLeft(de(bytes)?),
            Opcode::NameChanged => Self::NameChanged(de(bytes)?),
            Opcode::CreateRoom => Self::CreateRoom(de(bytes)?),
            Opcode::JoinRoom => Self::JoinRoom(de(bytes)?),
            Opcode::LeaveRoom => Self::LeaveRoom,
            Opcode::KickMembers => Self::KickMembers(de(bytes)?),
            Opcode::SetRoomPassword => Self::SetRoomPassword(de(bytes)?),
            Opcode::RoomMessage => Self::RoomMessage(de(bytes)?),
            Opcode::RoomCreated => Self::RoomCreated(de(bytes)?),
            Opcode::RoomDeleted => Self::RoomDeleted,
            Opcode::MembershipChanged => Self::MembershipChanged(de(bytes)?),
            Opcode::JoinedRoom => Self::JoinedRoom(de(bytes)?),
            Opcode::LeftRoom => Self::LeftRoom,
            Opcode::MemberJoined => Self::MemberJoined(de(bytes)?),
            Opcode::MemberLeft => Self::MemberLeft(de(bytes)?),
            Opcode::Kicked => Self::Kicked,
            Opcode::MembersKicked => Self::MembersKicked(de(bytes)?),
            Opcode::RoomLockChanged => Self::RoomLockChanged(de(bytes)?),
            Opcode::Error => Self::Error(de(bytes)?),
        };

        Ok(payload)
    }

    /// Convert the payload into a transport frame.
    ///
    /// Encodes the payload to CBOR, stamps the correct opcode into the
    /// header, and creates a Frame with automatic `payload_size` calculation.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::CborEncode`] if serialization fails
    pub fn into_frame(self, mut header: FrameHeader) -> Result<Frame> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        header.opcode = self.opcode().to_u16().to_be_bytes();
        Ok(Frame::new(header, buf))
    }

    /// Parse a payload from a raw transport frame.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::UnknownOpcode`] if the header opcode is not
    ///   recognized
    /// - [`ProtocolError::CborDecode`] if deserialization fails
    pub fn from_frame(frame: Frame) -> Result<Self> {
        let opcode = frame
            .header
            .opcode_enum()
            .ok_or_else(|| ProtocolError::UnknownOpcode(frame.header.opcode()))?;

        Self::decode(opcode, &frame.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(payload: Payload) {
        let opcode = payload.opcode();
        let mut buf = Vec::new();
        payload.encode(&mut buf).expect("should encode");

        let decoded = Payload::decode(opcode, &buf).expect("should decode");
        assert_eq!(payload, decoded);
    }

    #[test]
    fn register_round_trip() {
        round_trip(Payload::Register(session::Register { name: "alice".to_string() }));
    }

    #[test]
    fn welcome_round_trip() {
        round_trip(Payload::Welcome(session::Welcome {
            user_id: 1,
            name: "user-1".to_string(),
            users: vec![session::UserEntry {
                key: 1,
                name: "user-1".to_string(),
                loud_speaker_opt_out: false,
            }],
            rooms: vec![room::RoomEntry {
                id: 0xABCD,
                title: "lounge".to_string(),
                members: vec![1, 2],
                locked: true,
            }],
        }));
    }

    #[test]
    fn unit_payloads_encode_to_zero_bytes() {
        for payload in [
            Payload::Goodbye,
            Payload::LoudSpeakerOptOut,
            Payload::LeaveRoom,
            Payload::RoomDeleted,
            Payload::LeftRoom,
            Payload::Kicked,
        ] {
            let mut buf = Vec::new();
            payload.encode(&mut buf).expect("should encode");
            assert!(buf.is_empty(), "{:?} should encode to zero bytes", payload.opcode());
        }
    }

    #[test]
    fn member_left_with_transfer_round_trip() {
        round_trip(Payload::MemberLeft(room::MemberLeft {
            user_id: 3,
            name: "carol".to_string(),
            new_owner: Some(room::RoomOwner { user_id: 4, name: "dave".to_string() }),
        }));
    }

    #[test]
    fn error_payload_via_frame() {
        let payload = Payload::Error(ErrorPayload::wrong_password());
        let frame =
            payload.clone().into_frame(FrameHeader::new(Opcode::Error)).expect("should frame");

        assert_eq!(frame.header.opcode_enum(), Some(Opcode::Error));

        let parsed = Payload::from_frame(frame).expect("should parse");
        assert_eq!(parsed, payload);
    }

    #[test]
    fn into_frame_overrides_header_opcode() {
        // A header constructed with the wrong opcode is corrected
        let payload = Payload::Rename(session::Rename { name: "bob".to_string() });
        let frame =
            payload.into_frame(FrameHeader::new(Opcode::Register)).expect("should frame");

        assert_eq!(frame.header.opcode_enum(), Some(Opcode::Rename));
    }

    #[test]
    fn decode_rejects_garbage() {
        let result = Payload::decode(Opcode::Register, &[0xFF, 0x00, 0x13]);
        assert!(matches!(result, Err(ProtocolError::CborDecode(_))));
    }
}
