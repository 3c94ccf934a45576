//! In-memory storage implementation for testing and local runs.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use super::{Storage, StorageError};
use crate::{rooms::Room, users::UserRecord};

/// In-memory mirror backed by `HashMap`s.
///
/// All state is wrapped in `Arc<Mutex<>>` to allow Clone and concurrent
/// access. Uses `lock().expect()` which will panic if the mutex is poisoned -
/// acceptable for test code. All operations are O(1) except the load
/// methods, which are O(entries).
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

#[derive(Default)]
struct MemoryStorageInner {
    users: HashMap<u64, UserRecord>,
    rooms: HashMap<u128, Room>,
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mirrored users. Useful for debugging and testing.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").users.len()
    }

    /// Number of mirrored rooms. Useful for debugging and testing.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").rooms.len()
    }
}

#[allow(clippy::expect_used)]
impl Storage for MemoryStorage {
    fn persist_user(&self, user: &UserRecord) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.users.insert(user.key, user.clone());
        Ok(())
    }

    fn delete_user(&self, key: u64) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.users.remove(&key);
        Ok(())
    }

    fn persist_room(&self, room: &Room) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.rooms.insert(room.id, room.clone());
        Ok(())
    }

    fn delete_room(&self, room_id: u128) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.rooms.remove(&room_id);
        Ok(())
    }

    fn load_users(&self) -> Result<Vec<UserRecord>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.users.values().cloned().collect())
    }

    fn load_rooms(&self) -> Result<Vec<Room>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.rooms.values().cloned().collect())
    }

    fn clear(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.users.clear();
        inner.rooms.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(key: u64, name: &str) -> UserRecord {
        UserRecord {
            key,
            name: name.to_string(),
            created_at_secs: 100,
            updated_at_secs: 100,
            loud_speaker_opt_out: false,
        }
    }

    #[test]
    fn persist_and_load_users() {
        let storage = MemoryStorage::new();

        storage.persist_user(&user(1, "alice")).unwrap();
        storage.persist_user(&user(2, "bob")).unwrap();

        let users = storage.load_users().unwrap();
        assert_eq!(users.len(), 2);
    }

    #[test]
    fn persist_overwrites() {
        let storage = MemoryStorage::new();

        storage.persist_user(&user(1, "alice")).unwrap();
        storage.persist_user(&user(1, "alicia")).unwrap();

        let users = storage.load_users().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].name, "alicia");
    }

    #[test]
    fn delete_is_idempotent() {
        let storage = MemoryStorage::new();

        storage.persist_user(&user(1, "alice")).unwrap();
        storage.delete_user(1).unwrap();
        storage.delete_user(1).unwrap();

        assert_eq!(storage.user_count(), 0);
    }

    #[test]
    fn clear_drops_everything() {
        let storage = MemoryStorage::new();

        storage.persist_user(&user(1, "alice")).unwrap();
        storage
            .persist_room(&Room {
                id: 7,
                title: "lounge".to_string(),
                members: vec![1, 2],
                password: None,
                created_at_secs: 100,
            })
            .unwrap();

        storage.clear().unwrap();

        assert_eq!(storage.user_count(), 0);
        assert_eq!(storage.room_count(), 0);
    }
}
