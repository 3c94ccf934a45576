//! Durable mirror tests.
//!
//! Verifies that the redb-backed mirror survives a reopen (crash recovery),
//! that the shutdown maintenance operation wipes it, and that server startup
//! drops stale state from a previous process.

use parlor_server::{
    MemoryStorage, RedbStorage, Room, Server, ServerRuntimeConfig, Storage, UserRecord,
};

fn user(key: u64, name: &str) -> UserRecord {
    UserRecord {
        key,
        name: name.to_string(),
        created_at_secs: 1_700_000_000,
        updated_at_secs: 1_700_000_000,
        loud_speaker_opt_out: false,
    }
}

fn room(id: u128, members: Vec<u64>) -> Room {
    Room {
        id,
        title: "lounge".to_string(),
        members,
        password: Some("hunter2".to_string()),
        created_at_secs: 1_700_000_000,
    }
}

#[test]
fn mirror_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mirror.redb");

    {
        let storage = RedbStorage::open(&path).unwrap();
        storage.persist_user(&user(1, "alice")).unwrap();
        storage.persist_user(&user(2, "bob")).unwrap();
        storage.persist_room(&room(7, vec![1, 2])).unwrap();
        // Dropped here: simulates a crash with no shutdown maintenance
    }

    let storage = RedbStorage::open(&path).unwrap();

    let mut users = storage.load_users().unwrap();
    users.sort_by_key(|record| record.key);
    assert_eq!(users.len(), 2);
    assert_eq!(users[0].name, "alice");
    assert_eq!(users[1].name, "bob");

    let rooms = storage.load_rooms().unwrap();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].members, vec![1, 2]);
    assert_eq!(rooms[0].password.as_deref(), Some("hunter2"));
}

#[test]
fn updates_overwrite_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mirror.redb");

    {
        let storage = RedbStorage::open(&path).unwrap();
        storage.persist_user(&user(1, "alice")).unwrap();

        let mut renamed = user(1, "alicia");
        renamed.updated_at_secs = 1_700_000_500;
        storage.persist_user(&renamed).unwrap();
    }

    let storage = RedbStorage::open(&path).unwrap();
    let users = storage.load_users().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].name, "alicia");
    assert_eq!(users[0].updated_at_secs, 1_700_000_500);
}

#[test]
fn clear_is_the_shutdown_maintenance_operation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mirror.redb");

    let storage = RedbStorage::open(&path).unwrap();
    storage.persist_user(&user(1, "alice")).unwrap();
    storage.persist_room(&room(7, vec![1])).unwrap();

    storage.clear().unwrap();

    assert!(storage.load_users().unwrap().is_empty());
    assert!(storage.load_rooms().unwrap().is_empty());

    // The mirror is still usable after the wipe
    storage.persist_user(&user(3, "carol")).unwrap();
    assert_eq!(storage.load_users().unwrap().len(), 1);
}

#[tokio::test]
async fn server_startup_drops_stale_mirror_state() {
    // A "crashed" predecessor left users and rooms behind
    let storage = MemoryStorage::new();
    storage.persist_user(&user(1, "alice")).unwrap();
    storage.persist_room(&room(7, vec![1])).unwrap();

    let config = ServerRuntimeConfig {
        bind_address: "127.0.0.1:0".to_string(),
        ..Default::default()
    };

    let server = Server::bind(config, storage.clone()).unwrap();
    assert!(server.local_addr().is_ok());

    // Stale entries are gone: their sessions did not survive the restart
    assert!(storage.load_users().unwrap().is_empty());
    assert!(storage.load_rooms().unwrap().is_empty());
}
