//! Frame header implementation with zero-copy parsing.
//!
//! The `FrameHeader` is a fixed 64-byte structure serialized as raw binary
//! (Big Endian). The coordinator routes events by opcode and room id without
//! deserializing the CBOR payload.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    Opcode,
    errors::{ProtocolError, Result},
};

/// Fixed 64-byte frame header (Big Endian network byte order).
///
/// All multi-byte integers are stored in Big Endian format to match network
/// byte order. Fields are stored as raw byte arrays to avoid alignment
/// issues. The header fits exactly one 64-byte CPU cache line.
///
/// # Security
///
/// The `#[repr(C, packed)]` layout with zerocopy traits ensures this struct
/// can be safely cast from untrusted network bytes - all 64-byte patterns are
/// valid, preventing undefined behavior. Validation (magic, version, payload
/// size) happens in [`Self::from_bytes`] before any payload is read.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FrameHeader {
    // Protocol identification (8 bytes: 0-7)
    magic: [u8; 4],             // 0x5041524C ("PARL" in ASCII)
    version: u8,                // 0x01
    reserved: u8,               // must be zero, reserved for flags
    pub(crate) opcode: [u8; 2], // u16 operation code

    // Request/payload metadata (8 bytes: 8-15)
    request_id: [u8; 4], // u32 client nonce for request/response correlation
    pub(crate) payload_size: [u8; 4], // u32 payload length

    // Routing context (24 bytes: 16-39)
    room_id: [u8; 16],  // 128-bit room identifier (0 = no room)
    sender_id: [u8; 8], // u64 identity key (0 while anonymous)

    // Timing (8 bytes: 40-47)
    timestamp_secs: [u8; 8], // u64 Unix seconds, set by the server on notices

    // Reserved for future use (16 bytes: 48-63)
    reserved2: [u8; 16],
}

impl FrameHeader {
    /// Size of the serialized header (64 bytes, one CPU cache line).
    pub const SIZE: usize = 64;

    /// Magic number: "PARL" in ASCII (0x5041524C).
    pub const MAGIC: u32 = 0x5041_524C;

    /// Current protocol version.
    pub const VERSION: u8 = 0x01;

    /// Maximum payload size (1 MB).
    ///
    /// Presence events are small; the cap bounds memory per connection and
    /// rejects garbage length fields before allocation.
    pub const MAX_PAYLOAD_SIZE: u32 = 1024 * 1024;

    /// Create a new header with the specified opcode.
    ///
    /// All routing fields start zeroed; use the setters to fill them in.
    #[must_use]
    pub fn new(opcode: Opcode) -> Self {
        Self {
            magic: Self::MAGIC.to_be_bytes(),
            version: Self::VERSION,
            reserved: 0,
            opcode: opcode.to_u16().to_be_bytes(),
            request_id: [0; 4],
            payload_size: [0; 4],
            room_id: [0; 16],
            sender_id: [0; 8],
            timestamp_secs: [0; 8],
            reserved2: [0; 16],
        }
    }

    /// Parse a header from network bytes (zero-copy, safe).
    ///
    /// Casts raw bytes directly to a `FrameHeader` reference using
    /// compile-time layout verification from `zerocopy`. No data is copied.
    /// Validates cheapest-to-check properties first (size, magic) before more
    /// expensive ones (version, payload size), failing fast on garbage data.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::FrameTooShort`] if the buffer is under 64 bytes
    /// - [`ProtocolError::InvalidMagic`] if the magic number is wrong
    /// - [`ProtocolError::UnsupportedVersion`] for unknown protocol versions
    /// - [`ProtocolError::PayloadTooLarge`] if the claimed payload size
    ///   exceeds [`Self::MAX_PAYLOAD_SIZE`]
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::FrameTooShort {
                expected: Self::SIZE,
                actual: bytes.len(),
            })?
            .0;

        if u32::from_be_bytes(header.magic) != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic);
        }

        if header.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }

        let payload_size = u32::from_be_bytes(header.payload_size);
        if payload_size > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_size as usize,
                max: Self::MAX_PAYLOAD_SIZE as usize,
            });
        }

        Ok(header)
    }

    /// Serialize the header to bytes (zero-copy).
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let bytes = IntoBytes::as_bytes(self);
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(bytes);
        arr
    }

    /// Protocol magic number (0x5041524C = "PARL").
    #[must_use]
    pub fn magic(&self) -> u32 {
        u32::from_be_bytes(self.magic)
    }

    /// Protocol version byte (currently 0x01).
    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Operation code as raw u16.
    #[must_use]
    pub fn opcode(&self) -> u16 {
        u16::from_be_bytes(self.opcode)
    }

    /// Operation code as enum. `None` if unrecognized.
    #[must_use]
    pub fn opcode_enum(&self) -> Option<Opcode> {
        Opcode::from_u16(self.opcode())
    }

    /// Client-assigned nonce for request/response correlation.
    #[must_use]
    pub fn request_id(&self) -> u32 {
        u32::from_be_bytes(self.request_id)
    }

    /// 128-bit room identifier. Zero when the event targets no room.
    #[must_use]
    pub fn room_id(&self) -> u128 {
        u128::from_be_bytes(self.room_id)
    }

    /// Stable identity key of the sender. Zero while anonymous.
    #[must_use]
    pub fn sender_id(&self) -> u64 {
        u64::from_be_bytes(self.sender_id)
    }

    /// Unix timestamp in seconds. Set by the server on outbound notices.
    #[must_use]
    pub fn timestamp_secs(&self) -> u64 {
        u64::from_be_bytes(self.timestamp_secs)
    }

    /// Payload size in bytes (max 1 MB).
    #[must_use]
    pub fn payload_size(&self) -> u32 {
        u32::from_be_bytes(self.payload_size)
    }

    /// Update the room identifier.
    pub fn set_room_id(&mut self, room_id: u128) {
        self.room_id = room_id.to_be_bytes();
    }

    /// Update the sender identity key.
    pub fn set_sender_id(&mut self, sender_id: u64) {
        self.sender_id = sender_id.to_be_bytes();
    }

    /// Set the client request nonce for response correlation.
    pub fn set_request_id(&mut self, request_id: u32) {
        self.request_id = request_id.to_be_bytes();
    }

    /// Set the Unix timestamp in seconds.
    pub fn set_timestamp_secs(&mut self, secs: u64) {
        self.timestamp_secs = secs.to_be_bytes();
    }

    /// Set the payload size.
    pub fn set_payload_size(&mut self, size: u32) {
        self.payload_size = size.to_be_bytes();
    }
}

// Manual Debug implementation (can't derive due to packed repr)
impl std::fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHeader")
            .field("magic", &format!("{:#010x}", self.magic()))
            .field("version", &self.version())
            .field("opcode", &format!("{:#06x}", self.opcode()))
            .field("request_id", &self.request_id())
            .field("room_id", &format!("{:#034x}", self.room_id()))
            .field("sender_id", &self.sender_id())
            .field("timestamp_secs", &self.timestamp_secs())
            .field("payload_size", &self.payload_size())
            .finish_non_exhaustive()
    }
}

// Manual PartialEq implementation (can't derive due to packed repr)
impl PartialEq for FrameHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for FrameHeader {}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn arbitrary_bytes<const N: usize>() -> impl Strategy<Value = [u8; N]> {
        prop::collection::vec(any::<u8>(), N).prop_map(|v| {
            let mut arr = [0u8; N];
            arr.copy_from_slice(&v);
            arr
        })
    }

    impl Arbitrary for FrameHeader {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with((): Self::Parameters) -> Self::Strategy {
            (
                arbitrary_bytes::<2>(),        // opcode
                arbitrary_bytes::<4>(),        // request_id
                0u32..=Self::MAX_PAYLOAD_SIZE, // payload_size
                arbitrary_bytes::<16>(),       // room_id
                arbitrary_bytes::<8>(),        // sender_id
                arbitrary_bytes::<8>(),        // timestamp_secs
            )
                .prop_map(
                    |(opcode, request_id, payload_size, room_id, sender_id, timestamp_secs)| {
                        Self {
                            magic: Self::MAGIC.to_be_bytes(),
                            version: Self::VERSION,
                            reserved: 0,
                            opcode,
                            request_id,
                            payload_size: payload_size.to_be_bytes(),
                            room_id,
                            sender_id,
                            timestamp_secs,
                            reserved2: [0; 16],
                        }
                    },
                )
                .boxed()
        }
    }

    #[test]
    fn header_size() {
        assert_eq!(std::mem::size_of::<FrameHeader>(), FrameHeader::SIZE);
        assert_eq!(FrameHeader::SIZE, 64);
    }

    proptest! {
        #[test]
        fn header_round_trip(header in any::<FrameHeader>()) {
            let bytes = header.to_bytes();
            let parsed = FrameHeader::from_bytes(&bytes).expect("should parse");
            prop_assert_eq!(&header, parsed);
        }

        #[test]
        fn header_accessors(header in any::<FrameHeader>()) {
            prop_assert_eq!(header.magic(), FrameHeader::MAGIC);
            prop_assert_eq!(header.version(), FrameHeader::VERSION);
            prop_assert!(header.payload_size() <= FrameHeader::MAX_PAYLOAD_SIZE);
        }
    }

    #[test]
    fn setters_round_trip() {
        let mut header = FrameHeader::new(Opcode::JoinRoom);
        header.set_room_id(0x1234_5678_90ab_cdef_1234_5678_90ab_cdef);
        header.set_sender_id(42);
        header.set_request_id(7);
        header.set_timestamp_secs(1_700_000_000);

        assert_eq!(header.opcode_enum(), Some(Opcode::JoinRoom));
        assert_eq!(header.room_id(), 0x1234_5678_90ab_cdef_1234_5678_90ab_cdef);
        assert_eq!(header.sender_id(), 42);
        assert_eq!(header.request_id(), 7);
        assert_eq!(header.timestamp_secs(), 1_700_000_000);
    }

    #[test]
    fn reject_short_buffer() {
        let short_buf = [0u8; 32];
        let result = FrameHeader::from_bytes(&short_buf);
        assert_eq!(result, Err(ProtocolError::FrameTooShort { expected: 64, actual: 32 }));
    }

    #[test]
    fn reject_invalid_magic() {
        let mut buf = [0u8; 64];
        buf[0..4].copy_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
        buf[4] = FrameHeader::VERSION;

        let result = FrameHeader::from_bytes(&buf);
        assert_eq!(result, Err(ProtocolError::InvalidMagic));
    }

    #[test]
    fn reject_invalid_version() {
        let mut buf = [0u8; 64];
        buf[0..4].copy_from_slice(&FrameHeader::MAGIC.to_be_bytes());
        buf[4] = 0xFF;

        let result = FrameHeader::from_bytes(&buf);
        assert_eq!(result, Err(ProtocolError::UnsupportedVersion(0xFF)));
    }

    #[test]
    fn reject_oversized_payload() {
        let mut buf = [0u8; 64];
        buf[0..4].copy_from_slice(&FrameHeader::MAGIC.to_be_bytes());
        buf[4] = FrameHeader::VERSION;

        // payload_size lives at offset 12-15
        let oversized = FrameHeader::MAX_PAYLOAD_SIZE + 1;
        buf[12..16].copy_from_slice(&oversized.to_be_bytes());

        let result = FrameHeader::from_bytes(&buf);
        assert!(matches!(result, Err(ProtocolError::PayloadTooLarge { .. })));
    }
}
