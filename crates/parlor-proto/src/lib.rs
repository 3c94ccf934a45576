//! Parlor wire protocol.
//!
//! Defines the transport framing shared by the server and its clients:
//!
//! - [`FrameHeader`]: fixed 64-byte raw binary header (Big Endian) enabling
//!   O(1) routing decisions without payload deserialization
//! - [`Frame`]: header + raw payload bytes (the transport-layer packet)
//! - [`Opcode`]: operation codes identifying every event in the protocol
//! - [`Payload`]: typed CBOR payloads, one variant per opcode
//!
//! Headers are raw binary for performance; payloads use CBOR for type safety
//! and forward compatibility. The coordinator validates payloads at the
//! boundary before any state is touched, so malformed events never reach the
//! registries.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod errors;
mod frame;
mod header;
mod opcode;
pub mod payloads;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::FrameHeader;
pub use opcode::Opcode;
pub use payloads::{ErrorPayload, Payload};

/// ALPN protocol identifier for QUIC connections.
pub const ALPN_PROTOCOL: &[u8] = b"parlor";
