//! Protocol error types.
//!
//! Structural errors raised while parsing or building frames. These indicate
//! a broken or malicious peer (bad magic, truncated data) or an internal
//! encoding failure; they never represent application-level failures, which
//! travel as [`crate::ErrorPayload`] frames instead.

use thiserror::Error;

/// Convenience result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding protocol data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer is too short to contain a frame header.
    #[error("frame too short: expected {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Minimum number of bytes required
        expected: usize,
        /// Number of bytes actually available
        actual: usize,
    },

    /// Header magic number does not match the protocol magic.
    #[error("invalid magic number")]
    InvalidMagic,

    /// Protocol version is not supported by this implementation.
    #[error("unsupported protocol version: {0:#04x}")]
    UnsupportedVersion(u8),

    /// Payload size exceeds the protocol maximum.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Claimed or actual payload size
        size: usize,
        /// Maximum allowed payload size
        max: usize,
    },

    /// Buffer ends before the payload the header claims.
    #[error("frame truncated: header claims {expected} payload bytes, got {actual}")]
    FrameTruncated {
        /// Payload bytes the header claims
        expected: usize,
        /// Payload bytes actually present
        actual: usize,
    },

    /// Opcode is not recognized by this protocol version.
    #[error("unknown opcode: {0:#06x}")]
    UnknownOpcode(u16),

    /// CBOR serialization failed.
    #[error("CBOR encode error: {0}")]
    CborEncode(String),

    /// CBOR deserialization failed.
    #[error("CBOR decode error: {0}")]
    CborDecode(String),
}
