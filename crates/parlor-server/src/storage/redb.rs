//! Redb-backed durable storage implementation.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety. The
//! mirror survives server restarts; values are CBOR-encoded records.

use std::{path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};

use super::{Storage, StorageError};
use crate::{rooms::Room, users::UserRecord};

/// Table: users
/// Key: identity key as big-endian bytes [8 bytes]
/// Value: CBOR-encoded `UserRecord`
const USERS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("users");

/// Table: rooms
/// Key: room id as big-endian bytes [16 bytes]
/// Value: CBOR-encoded `Room`
const ROOMS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("rooms");

/// Durable mirror backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates the USERS and ROOMS tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the database cannot be opened or
    /// created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(|e| StorageError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(USERS).map_err(|e| StorageError::Io(e.to_string()))?;
            let _ = txn.open_table(ROOMS).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    fn put(
        &self,
        table: TableDefinition<'_, &[u8], &[u8]>,
        key: &[u8],
        value: &[u8],
    ) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let mut table = txn.open_table(table).map_err(|e| StorageError::Io(e.to_string()))?;
            table.insert(key, value).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(())
    }

    fn remove(
        &self,
        table: TableDefinition<'_, &[u8], &[u8]>,
        key: &[u8],
    ) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let mut table = txn.open_table(table).map_err(|e| StorageError::Io(e.to_string()))?;
            table.remove(key).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(())
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode<T: for<'de> serde::Deserialize<'de>>(bytes: &[u8]) -> Result<T, StorageError> {
    ciborium::de::from_reader(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

impl Storage for RedbStorage {
    fn persist_user(&self, user: &UserRecord) -> Result<(), StorageError> {
        let value = encode(user)?;
        self.put(USERS, &user.key.to_be_bytes(), &value)
    }

    fn delete_user(&self, key: u64) -> Result<(), StorageError> {
        self.remove(USERS, &key.to_be_bytes())
    }

    fn persist_room(&self, room: &Room) -> Result<(), StorageError> {
        let value = encode(room)?;
        self.put(ROOMS, &room.id.to_be_bytes(), &value)
    }

    fn delete_room(&self, room_id: u128) -> Result<(), StorageError> {
        self.remove(ROOMS, &room_id.to_be_bytes())
    }

    fn load_users(&self) -> Result<Vec<UserRecord>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(USERS).map_err(|e| StorageError::Io(e.to_string()))?;

        let mut users = Vec::new();
        for entry in table.iter().map_err(|e| StorageError::Io(e.to_string()))? {
            let (_, value) = entry.map_err(|e| StorageError::Io(e.to_string()))?;
            users.push(decode(value.value())?);
        }

        Ok(users)
    }

    fn load_rooms(&self) -> Result<Vec<Room>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(ROOMS).map_err(|e| StorageError::Io(e.to_string()))?;

        let mut rooms = Vec::new();
        for entry in table.iter().map_err(|e| StorageError::Io(e.to_string()))? {
            let (_, value) = entry.map_err(|e| StorageError::Io(e.to_string()))?;
            rooms.push(decode(value.value())?);
        }

        Ok(rooms)
    }

    fn clear(&self) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        // Dropping and recreating the tables is the cheapest full wipe.
        txn.delete_table(USERS).map_err(|e| StorageError::Io(e.to_string()))?;
        txn.delete_table(ROOMS).map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(USERS).map_err(|e| StorageError::Io(e.to_string()))?;
            let _ = txn.open_table(ROOMS).map_err(|e| StorageError::Io(e.to_string()))?;
        }

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;
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
    fn persist_load_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("mirror.redb")).unwrap();

        storage.persist_user(&user(1, "alice")).unwrap();
        storage
            .persist_room(&Room {
                id: 7,
                title: "lounge".to_string(),
                members: vec![1, 2],
                password: Some("hunter2".to_string()),
                created_at_secs: 100,
            })
            .unwrap();

        let users = storage.load_users().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].name, "alice");

        let rooms = storage.load_rooms().unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].password.as_deref(), Some("hunter2"));

        storage.delete_user(1).unwrap();
        storage.delete_room(7).unwrap();
        assert!(storage.load_users().unwrap().is_empty());
        assert!(storage.load_rooms().unwrap().is_empty());
    }

    #[test]
    fn delete_absent_entry_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("mirror.redb")).unwrap();

        storage.delete_user(99).unwrap();
        storage.delete_room(99).unwrap();
    }

    #[test]
    fn clear_wipes_both_tables() {
        let dir = tempfile::tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("mirror.redb")).unwrap();

        storage.persist_user(&user(1, "alice")).unwrap();
        storage.persist_user(&user(2, "bob")).unwrap();

        storage.clear().unwrap();

        assert!(storage.load_users().unwrap().is_empty());
        assert!(storage.load_rooms().unwrap().is_empty());
    }
}
