//! Coordinator error types.
//!
//! Errors returned by [`crate::ServerDriver::process_event`]. Most protocol
//! failures never surface here - they become error frames to the requester.
//! A `DriverError` means the event itself could not be attributed or
//! processed; the runtime logs it and continues serving other connections.

use std::fmt;

use crate::{rooms::RoomError, users::IdentityError};

/// Errors that can occur while processing a coordinator event.
#[derive(Debug)]
pub enum DriverError {
    /// Session not found in the connection registry.
    ///
    /// The event arrived for a connection the driver never saw (or one that
    /// already disconnected). Transient - the client should reconnect.
    SessionNotFound(u64),

    /// Identity registry operation failed.
    ///
    /// Wraps [`IdentityError`]. Conflicts are normally answered with error
    /// frames instead; seeing this here indicates an attribution bug.
    Identity(IdentityError),

    /// Room registry operation failed.
    ///
    /// Wraps [`RoomError`]. Precondition failures are normally answered with
    /// error frames instead.
    Room(RoomError),

    /// Frame encoding/decoding error.
    ///
    /// Failed to encode a response frame. Indicates a bug - inbound decode
    /// failures are answered with error frames, never raised here.
    Protocol(String),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionNotFound(id) => write!(f, "session not found: {id}"),
            Self::Identity(err) => write!(f, "identity error: {err}"),
            Self::Room(err) => write!(f, "room error: {err}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
        }
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Identity(err) => Some(err),
            Self::Room(err) => Some(err),
            _ => None,
        }
    }
}

impl From<IdentityError> for DriverError {
    fn from(err: IdentityError) -> Self {
        Self::Identity(err)
    }
}

impl From<RoomError> for DriverError {
    fn from(err: RoomError) -> Self {
        Self::Room(err)
    }
}

impl From<parlor_proto::ProtocolError> for DriverError {
    fn from(err: parlor_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}
