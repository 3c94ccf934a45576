//! Storage abstraction for the durable mirror.
//!
//! Trait-based abstraction for mirroring users and rooms into a durable
//! store. The mirror is advisory: in-memory registry state is authoritative,
//! and every call here is best-effort (executed off the broadcast path,
//! logged on failure). The trait is synchronous to keep implementations
//! simple; callers must not invoke it while holding the driver lock hot.

mod error;
mod memory;
mod redb;

pub use error::StorageError;
pub use memory::MemoryStorage;

pub use self::redb::RedbStorage;
use crate::{rooms::Room, users::UserRecord};

/// Storage abstraction for the user/room mirror.
///
/// Must be Clone (shared between tasks), Send + Sync (thread-safe), and
/// synchronous. Implementations typically share internal state via Arc, so
/// clones access the same underlying storage.
///
/// Only active entities are mirrored: a user is deleted on disconnect and a
/// room on destruction, so a restart recovers exactly the state worth
/// recovering.
pub trait Storage: Clone + Send + Sync + 'static {
    /// Store or overwrite a user record, keyed by identity key.
    fn persist_user(&self, user: &UserRecord) -> Result<(), StorageError>;

    /// Remove a user from the mirror. Removing an absent user is a no-op.
    fn delete_user(&self, key: u64) -> Result<(), StorageError>;

    /// Store or overwrite a room, keyed by room id.
    fn persist_room(&self, room: &Room) -> Result<(), StorageError>;

    /// Remove a room from the mirror. Removing an absent room is a no-op.
    fn delete_room(&self, room_id: u128) -> Result<(), StorageError>;

    /// Load all mirrored users. Order is not guaranteed.
    fn load_users(&self) -> Result<Vec<UserRecord>, StorageError>;

    /// Load all mirrored rooms. Order is not guaranteed.
    fn load_rooms(&self) -> Result<Vec<Room>, StorageError>;

    /// Drop every mirrored user and room.
    ///
    /// This is the explicit shutdown maintenance operation: connected users
    /// cannot survive a process exit, so the mirror is flushed rather than
    /// left claiming active sessions.
    fn clear(&self) -> Result<(), StorageError>;
}
