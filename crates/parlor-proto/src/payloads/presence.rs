//! Loud-speaker payloads.
//!
//! The loud-speaker is the all-users broadcast channel. Delivery skips users
//! who opted out; the sender is identified by `sender_id` in the frame header
//! (clients resolve names from their snapshot).

use serde::{Deserialize, Serialize};

/// Loud-speaker broadcast text.
///
/// Sent client-to-server to request fan-out, and server-to-client as the
/// fanned-out notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoudSpeaker {
    /// Message text.
    pub text: String,
}

/// Server reply reporting the requester's loud-speaker setting after a
/// toggle. Sent to the requester only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoudSpeakerSetting {
    /// `true` when loud-speaker delivery is enabled for this user.
    pub enabled: bool,
}
