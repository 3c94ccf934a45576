//! Property-based tests for Frame encoding/decoding
//!
//! These tests verify that frame serialization is correct for ALL valid
//! inputs, not just specific examples. Uses proptest to generate arbitrary
//! frames and verify round-trip and structural properties.

use bytes::Bytes;
use parlor_proto::{Frame, FrameHeader, Opcode, ProtocolError};
use proptest::prelude::*;

/// Strategy for generating arbitrary opcodes
fn arbitrary_opcode() -> impl Strategy<Value = Opcode> {
    prop_oneof![
        Just(Opcode::Register),
        Just(Opcode::Welcome),
        Just(Opcode::Rename),
        Just(Opcode::Goodbye),
        Just(Opcode::LoudSpeaker),
        Just(Opcode::LoudSpeakerOptOut),
        Just(Opcode::UserJoined),
        Just(Opcode::UserLeft),
        Just(Opcode::NameChanged),
        Just(Opcode::CreateRoom),
        Just(Opcode::JoinRoom),
        Just(Opcode::LeaveRoom),
        Just(Opcode::KickMembers),
        Just(Opcode::RoomMessage),
        Just(Opcode::RoomCreated),
        Just(Opcode::RoomDeleted),
        Just(Opcode::MembershipChanged),
        Just(Opcode::Error),
    ]
}

/// Strategy for generating arbitrary frame headers
fn arbitrary_header() -> impl Strategy<Value = FrameHeader> {
    (
        arbitrary_opcode(),
        any::<u128>(), // room_id
        any::<u64>(),  // sender_id
        any::<u32>(),  // request_id
        any::<u64>(),  // timestamp_secs
    )
        .prop_map(|(opcode, room_id, sender_id, request_id, timestamp_secs)| {
            let mut header = FrameHeader::new(opcode);
            header.set_room_id(room_id);
            header.set_sender_id(sender_id);
            header.set_request_id(request_id);
            header.set_timestamp_secs(timestamp_secs);
            header
        })
}

/// Strategy for generating arbitrary frames with payloads
fn arbitrary_frame() -> impl Strategy<Value = Frame> {
    (
        arbitrary_header(),
        prop::collection::vec(any::<u8>(), 0..1024), // payload up to 1KB
    )
        .prop_map(|(header, payload)| Frame::new(header, Bytes::from(payload)))
}

#[test]
fn prop_frame_encode_decode_roundtrip() {
    proptest!(|(frame in arbitrary_frame())| {
        let mut buf = Vec::new();
        frame.encode(&mut buf).expect("encode should succeed");

        let decoded = Frame::decode(&buf).expect("decode should succeed");

        // PROPERTY: Round-trip must be identity
        prop_assert_eq!(decoded.header, frame.header, "Header mismatch after round-trip");
        prop_assert_eq!(decoded.payload, frame.payload, "Payload content mismatch");
    });
}

#[test]
fn prop_frame_header_roundtrip() {
    proptest!(|(header in arbitrary_header())| {
        let bytes = header.to_bytes();
        let decoded = FrameHeader::from_bytes(&bytes).expect("from_bytes should succeed");

        // PROPERTY: Header round-trip must be identity
        prop_assert_eq!(decoded.opcode(), header.opcode(), "Opcode mismatch");
        prop_assert_eq!(decoded.room_id(), header.room_id(), "Room ID mismatch");
        prop_assert_eq!(decoded.sender_id(), header.sender_id(), "Sender ID mismatch");
        prop_assert_eq!(decoded.request_id(), header.request_id(), "Request ID mismatch");
        prop_assert_eq!(
            decoded.timestamp_secs(),
            header.timestamp_secs(),
            "Timestamp mismatch"
        );
    });
}

#[test]
fn prop_frame_empty_payload() {
    proptest!(|(header in arbitrary_header())| {
        let frame = Frame::new(header, Bytes::new());

        let mut buf = Vec::new();
        frame.encode(&mut buf).expect("encode should succeed");

        let decoded = Frame::decode(&buf).expect("decode should succeed");

        // PROPERTY: Empty payload preserved
        prop_assert_eq!(decoded.payload.len(), 0, "Empty payload should remain empty");
        prop_assert_eq!(decoded.header.payload_size(), 0, "Header should show 0 payload");
    });
}

#[test]
fn prop_frame_opcode_preservation() {
    proptest!(|(opcode in arbitrary_opcode())| {
        let mut header = FrameHeader::new(opcode);
        header.set_room_id(1);

        let frame = Frame::new(header, Bytes::new());

        let mut buf = Vec::new();
        frame.encode(&mut buf).expect("encode should succeed");

        let decoded = Frame::decode(&buf).expect("decode should succeed");

        // PROPERTY: Opcode must be preserved exactly
        prop_assert_eq!(
            decoded.header.opcode_enum(),
            Some(opcode),
            "Opcode not preserved: expected {:?}, got {:?}",
            opcode,
            decoded.header.opcode_enum()
        );
    });
}

#[test]
fn prop_frame_encoded_size_correct() {
    proptest!(|(frame in arbitrary_frame())| {
        let mut buf = Vec::new();
        frame.encode(&mut buf).expect("encode should succeed");

        // PROPERTY: Encoded size must equal header size + payload size
        let expected_size = FrameHeader::SIZE + frame.payload.len();
        prop_assert_eq!(
            buf.len(),
            expected_size,
            "Encoded size mismatch: expected {}, got {}",
            expected_size,
            buf.len()
        );
    });
}

#[test]
fn prop_corrupt_magic_always_rejected() {
    proptest!(|(frame in arbitrary_frame(), garbage in any::<u8>())| {
        prop_assume!(garbage != 0x50); // leave a genuinely corrupt first byte

        let mut buf = Vec::new();
        frame.encode(&mut buf).expect("encode should succeed");
        buf[0] = garbage;

        // PROPERTY: A corrupted magic number never decodes
        prop_assert_eq!(Frame::decode(&buf), Err(ProtocolError::InvalidMagic));
    });
}

#[test]
fn prop_truncated_payload_always_rejected() {
    proptest!(|(
        header in arbitrary_header(),
        payload in prop::collection::vec(any::<u8>(), 1..512),
        cut in 1usize..512,
    )| {
        let frame = Frame::new(header, Bytes::from(payload));

        let mut buf = Vec::new();
        frame.encode(&mut buf).expect("encode should succeed");

        let cut = cut.min(frame.payload.len());
        buf.truncate(buf.len() - cut);

        // PROPERTY: A frame missing payload bytes never decodes
        prop_assert!(
            matches!(
                Frame::decode(&buf),
                Err(ProtocolError::FrameTruncated { .. })
            ),
            "truncated frame must not decode"
        );
    });
}
