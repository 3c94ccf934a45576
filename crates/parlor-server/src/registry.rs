//! Connection registry for session and broadcast-group tracking.
//!
//! The registry maintains bidirectional mappings: group → sessions (for
//! broadcast) and session → groups (for cleanup on disconnect). This enables
//! O(1) lookups in both directions.
//!
//! Broadcast targets are explicit [`GroupId`] values - the two well-known
//! singleton groups plus one group per room - rather than ad-hoc strings.
//! When a session is unregistered, all its subscriptions are removed.

use std::collections::{HashMap, HashSet};

/// An addressable fan-out target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupId {
    /// Every registered connection.
    All,
    /// Registered connections that have not opted out of the loud-speaker.
    LoudSpeaker,
    /// Members of one room.
    Room(u128),
}

/// Information about a registered session.
#[derive(Debug, Clone, Default)]
pub struct SessionInfo {
    /// Identity key bound to this session, once registered.
    pub user_id: Option<u64>,
}

impl SessionInfo {
    /// Create session info for a connection with no identity yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the session has a registered identity.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.user_id.is_some()
    }
}

/// Registry for tracking sessions and group subscriptions.
///
/// Maintains bidirectional mappings for efficient lookups:
/// - Get all sessions in a group (for broadcast)
/// - Get all groups a session is in (for cleanup)
/// - Get the session for an identity key (for targeted notices) - O(1)
/// - Enforces one session per identity for deterministic behavior
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Session ID → session info
    sessions: HashMap<u64, SessionInfo>,
    /// Group → set of subscribed session IDs
    group_subscriptions: HashMap<GroupId, HashSet<u64>>,
    /// Session ID → set of subscribed groups
    session_groups: HashMap<u64, HashSet<GroupId>>,
    /// Identity key → session ID (reverse index)
    user_sessions: HashMap<u64, u64>,
}

impl ConnectionRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session with no identity.
    ///
    /// Returns `false` if the session already exists.
    pub fn register_session(&mut self, session_id: u64) -> bool {
        if self.sessions.contains_key(&session_id) {
            return false;
        }

        self.sessions.insert(session_id, SessionInfo::new());
        self.session_groups.insert(session_id, HashSet::new());
        true
    }

    /// Bind an identity key to a session.
    ///
    /// Returns `false` if the session doesn't exist or the identity is
    /// already bound to another session (one active session per identity).
    pub fn bind_user(&mut self, session_id: u64, user_id: u64) -> bool {
        let Some(info) = self.sessions.get_mut(&session_id) else {
            return false;
        };

        match self.user_sessions.get(&user_id) {
            Some(&existing) if existing != session_id => return false,
            _ => {},
        }

        if let Some(old_user_id) = info.user_id {
            self.user_sessions.remove(&old_user_id);
        }

        info.user_id = Some(user_id);
        self.user_sessions.insert(user_id, session_id);
        true
    }

    /// Unregister a session and remove all its group subscriptions.
    ///
    /// Returns the session info if it existed, along with the groups it was
    /// subscribed to.
    pub fn unregister_session(&mut self, session_id: u64) -> Option<(SessionInfo, HashSet<GroupId>)> {
        let info = self.sessions.remove(&session_id)?;
        let groups = self.session_groups.remove(&session_id).unwrap_or_default();

        if let Some(user_id) = info.user_id {
            self.user_sessions.remove(&user_id);
        }

        for group in &groups {
            if let Some(subscribers) = self.group_subscriptions.get_mut(group) {
                subscribers.remove(&session_id);
                if subscribers.is_empty() {
                    self.group_subscriptions.remove(group);
                }
            }
        }

        Some((info, groups))
    }

    /// Session metadata. `None` if the session doesn't exist.
    #[must_use]
    pub fn session(&self, session_id: u64) -> Option<&SessionInfo> {
        self.sessions.get(&session_id)
    }

    /// Check if a session is registered.
    #[must_use]
    pub fn has_session(&self, session_id: u64) -> bool {
        self.sessions.contains_key(&session_id)
    }

    /// Subscribe a session to a group.
    ///
    /// Returns `false` if the session is not registered.
    pub fn subscribe(&mut self, session_id: u64, group: GroupId) -> bool {
        if !self.sessions.contains_key(&session_id) {
            return false;
        }

        self.group_subscriptions.entry(group).or_default().insert(session_id);
        self.session_groups.entry(session_id).or_default().insert(group);
        true
    }

    /// Unsubscribe a session from a group.
    ///
    /// Returns `true` if the session was subscribed and is now unsubscribed.
    pub fn unsubscribe(&mut self, session_id: u64, group: GroupId) -> bool {
        let removed_from_group =
            self.group_subscriptions.get_mut(&group).is_some_and(|s| s.remove(&session_id));

        let removed_from_session =
            self.session_groups.get_mut(&session_id).is_some_and(|g| g.remove(&group));

        if self.group_subscriptions.get(&group).is_some_and(HashSet::is_empty) {
            self.group_subscriptions.remove(&group);
        }

        removed_from_group && removed_from_session
    }

    /// Check if a session is subscribed to a group.
    #[must_use]
    pub fn is_subscribed(&self, session_id: u64, group: GroupId) -> bool {
        self.group_subscriptions.get(&group).is_some_and(|s| s.contains(&session_id))
    }

    /// All sessions subscribed to a group.
    pub fn sessions_in_group(&self, group: GroupId) -> impl Iterator<Item = u64> + '_ {
        self.group_subscriptions.get(&group).into_iter().flat_map(|s| s.iter().copied())
    }

    /// All groups a session is subscribed to.
    pub fn groups_for_session(&self, session_id: u64) -> impl Iterator<Item = GroupId> + '_ {
        self.session_groups.get(&session_id).into_iter().flat_map(|g| g.iter().copied())
    }

    /// Find the session for an identity key.
    ///
    /// Returns `None` if no session is bound to this identity. O(1) lookup
    /// using the reverse index.
    #[must_use]
    pub fn session_for_user(&self, user_id: u64) -> Option<u64> {
        self.user_sessions.get(&user_id).copied()
    }

    /// Total number of registered sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of sessions subscribed to a group.
    #[must_use]
    pub fn group_session_count(&self, group: GroupId) -> usize {
        self.group_subscriptions.get(&group).map_or(0, HashSet::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOM: GroupId = GroupId::Room(0x1234_5678_90ab_cdef_1234_5678_90ab_cdef);

    #[test]
    fn register_and_lookup_session() {
        let mut registry = ConnectionRegistry::new();

        assert!(registry.register_session(1));
        assert!(registry.has_session(1));
        assert!(!registry.has_session(2));

        let info = registry.session(1).unwrap();
        assert!(!info.is_registered());
        assert!(info.user_id.is_none());
    }

    #[test]
    fn register_duplicate_session_fails() {
        let mut registry = ConnectionRegistry::new();

        assert!(registry.register_session(1));
        assert!(!registry.register_session(1));
    }

    #[test]
    fn bind_user_and_reverse_lookup() {
        let mut registry = ConnectionRegistry::new();

        registry.register_session(1);
        assert!(registry.bind_user(1, 42));

        assert!(registry.session(1).unwrap().is_registered());
        assert_eq!(registry.session_for_user(42), Some(1));
        assert_eq!(registry.session_for_user(99), None);
    }

    #[test]
    fn one_session_per_user_enforcement() {
        let mut registry = ConnectionRegistry::new();

        registry.register_session(1);
        registry.register_session(2);

        assert!(registry.bind_user(1, 42));
        // Second session claiming the same identity fails
        assert!(!registry.bind_user(2, 42));
        assert_eq!(registry.session_for_user(42), Some(1));

        // Different identity succeeds
        assert!(registry.bind_user(2, 99));
        assert_eq!(registry.session_for_user(99), Some(2));
    }

    #[test]
    fn bind_user_to_unknown_session_fails() {
        let mut registry = ConnectionRegistry::new();

        assert!(!registry.bind_user(999, 42));
    }

    #[test]
    fn subscribe_and_lookup() {
        let mut registry = ConnectionRegistry::new();

        registry.register_session(1);
        registry.register_session(2);

        assert!(registry.subscribe(1, ROOM));
        assert!(registry.subscribe(2, ROOM));

        assert!(registry.is_subscribed(1, ROOM));
        assert!(registry.is_subscribed(2, ROOM));

        let sessions: Vec<_> = registry.sessions_in_group(ROOM).collect();
        assert_eq!(sessions.len(), 2);
        assert!(sessions.contains(&1));
        assert!(sessions.contains(&2));
    }

    #[test]
    fn subscribe_unregistered_session_fails() {
        let mut registry = ConnectionRegistry::new();

        assert!(!registry.subscribe(999, GroupId::All));
    }

    #[test]
    fn singleton_groups_are_distinct_from_rooms() {
        let mut registry = ConnectionRegistry::new();

        registry.register_session(1);
        registry.subscribe(1, GroupId::All);
        registry.subscribe(1, GroupId::LoudSpeaker);

        assert!(registry.is_subscribed(1, GroupId::All));
        assert!(registry.is_subscribed(1, GroupId::LoudSpeaker));
        assert!(!registry.is_subscribed(1, ROOM));
    }

    #[test]
    fn unsubscribe_removes_from_both_maps() {
        let mut registry = ConnectionRegistry::new();

        registry.register_session(1);
        registry.subscribe(1, ROOM);

        assert!(registry.unsubscribe(1, ROOM));
        assert!(!registry.is_subscribed(1, ROOM));

        assert_eq!(registry.sessions_in_group(ROOM).count(), 0);
        assert_eq!(registry.groups_for_session(1).count(), 0);
    }

    #[test]
    fn unregister_session_removes_all_subscriptions() {
        let mut registry = ConnectionRegistry::new();

        registry.register_session(1);
        registry.register_session(2);

        registry.subscribe(1, GroupId::All);
        registry.subscribe(1, ROOM);
        registry.subscribe(2, ROOM);

        let (_, groups) = registry.unregister_session(1).unwrap();
        assert_eq!(groups.len(), 2);
        assert!(groups.contains(&GroupId::All));
        assert!(groups.contains(&ROOM));

        let sessions: Vec<_> = registry.sessions_in_group(ROOM).collect();
        assert_eq!(sessions, vec![2]);

        // Empty set cleaned up
        assert_eq!(registry.group_session_count(GroupId::All), 0);
    }

    #[test]
    fn unregister_session_cleans_up_reverse_index() {
        let mut registry = ConnectionRegistry::new();

        registry.register_session(1);
        registry.bind_user(1, 42);

        let (info, _) = registry.unregister_session(1).unwrap();
        assert_eq!(info.user_id, Some(42));
        assert_eq!(registry.session_for_user(42), None);
    }

    #[test]
    fn session_count() {
        let mut registry = ConnectionRegistry::new();

        assert_eq!(registry.session_count(), 0);

        registry.register_session(1);
        registry.register_session(2);
        assert_eq!(registry.session_count(), 2);

        registry.unregister_session(1);
        assert_eq!(registry.session_count(), 1);
    }
}
