//! Identity registry: connection → user record mapping with name uniqueness.
//!
//! Owns every active user record. Registration never fails - an empty or
//! taken name falls back to a generated `user-<n>` placeholder from a
//! monotonic counter. Name uniqueness holds only among active users; removing
//! a record frees its name immediately.
//!
//! A name → connection index is maintained transactionally alongside the
//! primary map so uniqueness checks are O(1) instead of a scan.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Errors from identity registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// Requested name is already held by a different active connection.
    #[error("name already taken: '{0}'")]
    NameConflict(String),

    /// Connection has no registered identity.
    #[error("no identity for connection {0}")]
    UnknownConnection(u64),
}

/// A registered user.
///
/// Serde-derived so the durable mirror can persist records as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Stable identity key, unique for the lifetime of the registry.
    pub key: u64,
    /// Display name, unique among active users.
    pub name: String,
    /// Unix seconds when the record was created.
    pub created_at_secs: u64,
    /// Unix seconds of the last mutation.
    pub updated_at_secs: u64,
    /// Whether the user opted out of loud-speaker delivery.
    pub loud_speaker_opt_out: bool,
}

/// Registry of active users, keyed by connection id.
///
/// Each connection maps to at most one identity record. Identity keys come
/// from a monotonic counter, so they are collision-free and never reused
/// within one registry instance.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    /// Connection id → user record
    users: HashMap<u64, UserRecord>,
    /// Display name → connection id (reverse index for uniqueness checks)
    names: HashMap<String, u64>,
    /// Next identity key to hand out
    next_key: u64,
    /// Next fallback-name counter
    next_fallback: u64,
}

impl IdentityRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an identity for a connection.
    ///
    /// If `requested_name` is empty or already held by an active user, a
    /// generated `user-<n>` fallback is assigned instead. Always succeeds
    /// with *some* name.
    ///
    /// The caller must ensure the connection has no identity yet; registering
    /// twice would orphan the first record's name index entry.
    pub fn register(&mut self, connection_id: u64, requested_name: &str, now_secs: u64) -> &UserRecord {
        debug_assert!(!self.users.contains_key(&connection_id), "connection already registered");

        let name = if requested_name.is_empty() || self.names.contains_key(requested_name) {
            self.generate_fallback_name()
        } else {
            requested_name.to_string()
        };

        self.next_key += 1;
        let record = UserRecord {
            key: self.next_key,
            name: name.clone(),
            created_at_secs: now_secs,
            updated_at_secs: now_secs,
            loud_speaker_opt_out: false,
        };

        self.names.insert(name, connection_id);
        self.users.entry(connection_id).or_insert(record)
    }

    /// Rename the identity bound to a connection.
    ///
    /// Fails with [`IdentityError::NameConflict`] if `new_name` is already
    /// active and belongs to a different connection. Renaming to your own
    /// current name is a timestamp-only update.
    pub fn rename(
        &mut self,
        connection_id: u64,
        new_name: &str,
        now_secs: u64,
    ) -> Result<&UserRecord, IdentityError> {
        match self.names.get(new_name) {
            Some(&holder) if holder != connection_id => {
                return Err(IdentityError::NameConflict(new_name.to_string()));
            },
            _ => {},
        }

        let record = self
            .users
            .get_mut(&connection_id)
            .ok_or(IdentityError::UnknownConnection(connection_id))?;

        self.names.remove(&record.name);
        self.names.insert(new_name.to_string(), connection_id);

        record.name = new_name.to_string();
        record.updated_at_secs = now_secs;

        Ok(record)
    }

    /// Remove the identity bound to a connection, freeing its name.
    ///
    /// Idempotent: removing an absent connection is a no-op. Returns the
    /// removed record so callers can build departure notices.
    pub fn remove(&mut self, connection_id: u64) -> Option<UserRecord> {
        let record = self.users.remove(&connection_id)?;
        self.names.remove(&record.name);
        Some(record)
    }

    /// Identity record for a connection. `None` if not registered.
    #[must_use]
    pub fn get(&self, connection_id: u64) -> Option<&UserRecord> {
        self.users.get(&connection_id)
    }

    /// Identity record by identity key.
    ///
    /// Linear scan - users are few relative to event volume, and the key
    /// lookup only happens on invite/kick paths.
    #[must_use]
    pub fn get_by_key(&self, key: u64) -> Option<&UserRecord> {
        self.users.values().find(|record| record.key == key)
    }

    /// All active user records (iteration order is unspecified).
    pub fn list(&self) -> impl Iterator<Item = &UserRecord> {
        self.users.values()
    }

    /// All currently active display names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }

    /// Whether a name is held by an active user.
    #[must_use]
    pub fn is_name_active(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Set the loud-speaker opt-out flag for a connection's identity.
    pub fn set_loud_speaker_opt_out(
        &mut self,
        connection_id: u64,
        opt_out: bool,
        now_secs: u64,
    ) -> Result<&UserRecord, IdentityError> {
        let record = self
            .users
            .get_mut(&connection_id)
            .ok_or(IdentityError::UnknownConnection(connection_id))?;

        record.loud_speaker_opt_out = opt_out;
        record.updated_at_secs = now_secs;

        Ok(record)
    }

    /// Number of active users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether the registry holds no users.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Next free `user-<n>` placeholder.
    ///
    /// The counter only moves forward, but a user may have claimed a literal
    /// `user-<n>` name, so keep incrementing until the slot is free.
    fn generate_fallback_name(&mut self) -> String {
        loop {
            self.next_fallback += 1;
            let candidate = format!("user-{}", self.next_fallback);
            if !self.names.contains_key(&candidate) {
                return candidate;
            }
        }
    }
}
