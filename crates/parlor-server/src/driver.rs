//! Presence/broadcast coordinator.
//!
//! Ties together the identity registry, room registry, and connection/group
//! registry. The driver is a pure state machine: it consumes [`ServerEvent`]s
//! and produces [`ServerAction`]s for the runtime to execute, performing no
//! I/O itself. One event is processed at a time, so registry mutations are
//! atomic with respect to each other.
//!
//! Per-connection protocol states: anonymous → registered → (optionally in a
//! room) → disconnected. Every precondition failure is answered with an error
//! frame to the originating connection only; registries are mutated only
//! after all preconditions for an operation pass.

use parlor_proto::{
    ErrorPayload, Frame, FrameHeader, Opcode, Payload,
    payloads::{presence, room as room_payloads, session},
};

use crate::{
    env::Environment,
    registry::{ConnectionRegistry, GroupId},
    rooms::{RemovalOutcome, Room, RoomRegistry},
    server_error::DriverError,
    users::{IdentityError, IdentityRegistry, UserRecord},
};

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { max_connections: 10_000 }
    }
}

/// Events that the coordinator processes.
///
/// Produced by the transport runtime (production or tests).
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A new connection was accepted.
    ConnectionAccepted {
        /// Unique connection ID assigned by the runtime
        session_id: u64,
    },

    /// A frame was received from a connection.
    FrameReceived {
        /// Connection that sent the frame
        session_id: u64,
        /// The received frame
        frame: Frame,
    },

    /// A connection was closed (by peer or error).
    ConnectionClosed {
        /// Connection that was closed
        session_id: u64,
        /// Reason for closure
        reason: String,
    },
}

/// Actions that the coordinator produces.
///
/// Executed by runtime-specific code. Persist/Delete actions mirror state
/// into the durable store - best-effort, never on the broadcast path.
#[derive(Debug, Clone)]
pub enum ServerAction {
    /// Send a frame to a specific session.
    SendToSession {
        /// Target session ID
        session_id: u64,
        /// Frame to send
        frame: Frame,
    },

    /// Broadcast a frame to all sessions in a group.
    Broadcast {
        /// Target group
        group: GroupId,
        /// Frame to broadcast
        frame: Frame,
        /// Optional session to exclude from the broadcast
        exclude_session: Option<u64>,
    },

    /// Close a connection.
    CloseConnection {
        /// Session to close
        session_id: u64,
        /// Reason for closure
        reason: String,
    },

    /// Mirror a user record into the durable store.
    PersistUser(UserRecord),

    /// Remove a user from the durable store.
    DeleteUser(u64),

    /// Mirror a room into the durable store.
    PersistRoom(Room),

    /// Remove a room from the durable store.
    DeleteRoom(u128),

    /// Log a message (for debugging/monitoring).
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
    },
}

/// Log levels for server actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

/// Action-based presence/broadcast coordinator.
///
/// Orchestrates identity registration, room membership, and event fan-out.
pub struct ServerDriver<E>
where
    E: Environment,
{
    /// Session/group registry
    registry: ConnectionRegistry,
    /// Identity registry
    users: IdentityRegistry,
    /// Room registry
    rooms: RoomRegistry,
    /// Environment (time, RNG)
    env: E,
    /// Coordinator configuration
    config: DriverConfig,
}

impl<E> ServerDriver<E>
where
    E: Environment,
{
    /// Create a new coordinator.
    pub fn new(env: E, config: DriverConfig) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            users: IdentityRegistry::new(),
            rooms: RoomRegistry::new(),
            env,
            config,
        }
    }

    /// Process a server event and return actions to execute.
    ///
    /// This is the main entry point for the coordinator.
    pub fn process_event(&mut self, event: ServerEvent) -> Result<Vec<ServerAction>, DriverError> {
        match event {
            ServerEvent::ConnectionAccepted { session_id } => {
                self.handle_connection_accepted(session_id)
            },
            ServerEvent::FrameReceived { session_id, frame } => {
                self.handle_frame_received(session_id, frame)
            },
            ServerEvent::ConnectionClosed { session_id, reason } => {
                Ok(self.handle_disconnect(session_id, &reason))
            },
        }
    }

    /// Handle a new connection being accepted.
    fn handle_connection_accepted(
        &mut self,
        session_id: u64,
    ) -> Result<Vec<ServerAction>, DriverError> {
        if self.registry.session_count() >= self.config.max_connections {
            return Ok(vec![ServerAction::CloseConnection {
                session_id,
                reason: "max connections exceeded".to_string(),
            }]);
        }

        self.registry.register_session(session_id);

        Ok(vec![ServerAction::Log {
            level: LogLevel::Debug,
            message: format!("connection {session_id} accepted"),
        }])
    }

    /// Handle a frame received from a connection.
    ///
    /// Payloads are validated here, at the boundary; malformed events are
    /// answered with an `InvalidPayload` error frame and touch no state.
    fn handle_frame_received(
        &mut self,
        session_id: u64,
        frame: Frame,
    ) -> Result<Vec<ServerAction>, DriverError> {
        if !self.registry.has_session(session_id) {
            return Err(DriverError::SessionNotFound(session_id));
        }

        let room_id = frame.header.room_id();

        let payload = match Payload::from_frame(frame) {
            Ok(payload) => payload,
            Err(e) => {
                return Ok(self.error_to(
                    session_id,
                    room_id,
                    ErrorPayload::invalid_payload(e.to_string()),
                ));
            },
        };

        let actions = match payload {
            Payload::Register(req) => self.handle_register(session_id, &req),
            Payload::Rename(req) => self.handle_rename(session_id, &req),
            Payload::Goodbye => self.handle_goodbye(session_id),
            Payload::LoudSpeaker(req) => self.handle_loud_speaker(session_id, req),
            Payload::LoudSpeakerOptOut => self.handle_loud_speaker_opt_out(session_id),
            Payload::CreateRoom(req) => self.handle_create_room(session_id, req),
            Payload::JoinRoom(req) => self.handle_join_room(session_id, room_id, &req),
            Payload::LeaveRoom => self.handle_leave_room(session_id, room_id),
            Payload::KickMembers(req) => self.handle_kick_members(session_id, room_id, &req),
            Payload::SetRoomPassword(req) => {
                self.handle_set_room_password(session_id, room_id, &req)
            },
            Payload::RoomMessage(req) => self.handle_room_message(session_id, room_id, req),
            // Server-to-client notices are never valid as requests
            _ => self.error_to(
                session_id,
                room_id,
                ErrorPayload::invalid_payload("not a client event"),
            ),
        };

        Ok(actions)
    }

    /// Register an identity for an anonymous connection.
    fn handle_register(&mut self, session_id: u64, req: &session::Register) -> Vec<ServerAction> {
        match self.registry.session(session_id) {
            Some(info) if info.is_registered() => {
                return self.error_to(
                    session_id,
                    0,
                    ErrorPayload::forbidden("connection already has an identity"),
                );
            },
            _ => {},
        }

        let now = self.env.wall_clock_secs();
        let record = self.users.register(session_id, &req.name, now).clone();

        // One identity per connection and fresh keys per registration, so the
        // bind cannot conflict.
        let bound = self.registry.bind_user(session_id, record.key);
        debug_assert!(bound, "freshly issued identity key must bind");

        self.registry.subscribe(session_id, GroupId::All);
        self.registry.subscribe(session_id, GroupId::LoudSpeaker);

        let mut actions = Vec::new();

        self.push_broadcast(
            &mut actions,
            GroupId::All,
            Payload::UserJoined(session::UserJoined { user: user_entry(&record) }),
            0,
            record.key,
            Some(session_id),
        );

        let snapshot = session::Welcome {
            user_id: record.key,
            name: record.name.clone(),
            users: self.users.list().map(user_entry).collect(),
            rooms: self.rooms.list().map(room_entry).collect(),
        };
        self.push_send(&mut actions, session_id, Payload::Welcome(snapshot), 0, record.key);

        actions.push(ServerAction::PersistUser(record.clone()));
        actions.push(ServerAction::Log {
            level: LogLevel::Info,
            message: format!("user '{}' registered on connection {session_id}", record.name),
        });

        actions
    }

    /// Change the display name bound to a connection.
    fn handle_rename(&mut self, session_id: u64, req: &session::Rename) -> Vec<ServerAction> {
        let Some(user) = self.users.get(session_id).cloned() else {
            return self.no_identity_error(session_id);
        };

        if req.name.is_empty() {
            return self.error_to(
                session_id,
                0,
                ErrorPayload::invalid_payload("name must not be empty"),
            );
        }

        let now = self.env.wall_clock_secs();
        let record = match self.users.rename(session_id, &req.name, now) {
            Ok(record) => record.clone(),
            Err(IdentityError::NameConflict(name)) => {
                return self.error_to(session_id, 0, ErrorPayload::name_conflict(name));
            },
            Err(IdentityError::UnknownConnection(_)) => {
                return self.no_identity_error(session_id);
            },
        };

        let mut actions = Vec::new();

        self.push_broadcast(
            &mut actions,
            GroupId::All,
            Payload::NameChanged(session::NameChanged {
                user_id: record.key,
                name: record.name.clone(),
            }),
            0,
            record.key,
            None,
        );

        actions.push(ServerAction::PersistUser(record));
        actions.push(ServerAction::Log {
            level: LogLevel::Info,
            message: format!("user '{}' renamed to '{}'", user.name, req.name),
        });

        actions
    }

    /// Graceful disconnect: same cleanup as an abrupt close, plus an explicit
    /// connection shutdown. The later transport-level close becomes a no-op.
    fn handle_goodbye(&mut self, session_id: u64) -> Vec<ServerAction> {
        let mut actions = self.handle_disconnect(session_id, "goodbye");
        actions.push(ServerAction::CloseConnection {
            session_id,
            reason: "goodbye".to_string(),
        });
        actions
    }

    /// Fan a loud-speaker message out to everyone who hasn't opted out.
    fn handle_loud_speaker(
        &mut self,
        session_id: u64,
        req: presence::LoudSpeaker,
    ) -> Vec<ServerAction> {
        let Some(user) = self.users.get(session_id).cloned() else {
            return self.no_identity_error(session_id);
        };

        let mut actions = Vec::new();
        self.push_broadcast(
            &mut actions,
            GroupId::LoudSpeaker,
            Payload::LoudSpeaker(req),
            0,
            user.key,
            None,
        );
        actions
    }

    /// Flip the requester's loud-speaker opt-out flag.
    fn handle_loud_speaker_opt_out(&mut self, session_id: u64) -> Vec<ServerAction> {
        let Some(user) = self.users.get(session_id).cloned() else {
            return self.no_identity_error(session_id);
        };

        let opt_out = !user.loud_speaker_opt_out;
        let now = self.env.wall_clock_secs();
        let record = match self.users.set_loud_speaker_opt_out(session_id, opt_out, now) {
            Ok(record) => record.clone(),
            Err(_) => return self.no_identity_error(session_id),
        };

        if opt_out {
            self.registry.unsubscribe(session_id, GroupId::LoudSpeaker);
        } else {
            self.registry.subscribe(session_id, GroupId::LoudSpeaker);
        }

        let mut actions = Vec::new();
        self.push_send(
            &mut actions,
            session_id,
            Payload::LoudSpeakerSetting(presence::LoudSpeakerSetting { enabled: !opt_out }),
            0,
            record.key,
        );
        actions.push(ServerAction::PersistUser(record));
        actions
    }

    /// Create a room with the requester as owner.
    fn handle_create_room(
        &mut self,
        session_id: u64,
        req: room_payloads::CreateRoom,
    ) -> Vec<ServerAction> {
        let Some(owner) = self.users.get(session_id).cloned() else {
            return self.no_identity_error(session_id);
        };

        if req.title.is_empty() || req.invitees.is_empty() {
            return self.error_to(
                session_id,
                0,
                ErrorPayload::invalid_payload("room title and invitees are required"),
            );
        }

        // Only currently reachable identities can be included.
        let invitees: Vec<u64> = req
            .invitees
            .iter()
            .copied()
            .filter(|&key| key != owner.key && self.registry.session_for_user(key).is_some())
            .collect();

        let room_id = self.fresh_room_id();
        let now = self.env.wall_clock_secs();
        let room = match self.rooms.create(room_id, &req.title, owner.key, &invitees, &req.password, now)
        {
            Ok(room) => room.clone(),
            // Nothing was inserted, the id is released
            Err(_) => return self.error_to(session_id, 0, ErrorPayload::empty_room()),
        };

        let mut actions = Vec::new();
        let entry = room_entry(&room);

        // Subscribe every member's session to the room group, then confirm
        // membership to each of them individually.
        let mut member_sessions = Vec::with_capacity(room.members.len());
        for &member in &room.members {
            if let Some(member_session) = self.registry.session_for_user(member) {
                self.registry.subscribe(member_session, GroupId::Room(room_id));
                member_sessions.push(member_session);
            }
        }

        self.push_broadcast(
            &mut actions,
            GroupId::All,
            Payload::RoomCreated(room_payloads::RoomCreated { room: entry.clone() }),
            room_id,
            owner.key,
            None,
        );

        for member_session in member_sessions {
            self.push_send(
                &mut actions,
                member_session,
                Payload::JoinedRoom(room_payloads::JoinedRoom { room: entry.clone() }),
                room_id,
                owner.key,
            );
        }

        actions.push(ServerAction::PersistRoom(room.clone()));
        actions.push(ServerAction::Log {
            level: LogLevel::Info,
            message: format!(
                "room '{}' ({room_id:032x}) created by '{}' with {} members",
                room.title,
                owner.name,
                room.members.len()
            ),
        });

        actions
    }

    /// Join an existing room, checking its password.
    fn handle_join_room(
        &mut self,
        session_id: u64,
        room_id: u128,
        req: &room_payloads::JoinRoom,
    ) -> Vec<ServerAction> {
        let Some(user) = self.users.get(session_id).cloned() else {
            return self.no_identity_error(session_id);
        };

        let Some(room) = self.rooms.get(room_id) else {
            return self.error_to(session_id, room_id, ErrorPayload::room_not_found(room_id));
        };

        if !self.rooms.check_password(room_id, &req.password).unwrap_or(false) {
            return self.error_to(session_id, room_id, ErrorPayload::wrong_password());
        }

        if room.is_member(user.key) {
            // Re-join is a no-op beyond re-confirming membership.
            let entry = room_entry(room);
            self.registry.subscribe(session_id, GroupId::Room(room_id));
            let mut actions = Vec::new();
            self.push_send(
                &mut actions,
                session_id,
                Payload::JoinedRoom(room_payloads::JoinedRoom { room: entry }),
                room_id,
                user.key,
            );
            return actions;
        }

        // Preconditions passed: mutate and announce.
        #[allow(clippy::expect_used)]
        let room = self
            .rooms
            .add_member(room_id, user.key)
            .expect("invariant: room existence checked above")
            .clone();
        self.registry.subscribe(session_id, GroupId::Room(room_id));

        let mut actions = Vec::new();

        self.push_broadcast(
            &mut actions,
            GroupId::All,
            Payload::MembershipChanged(room_payloads::MembershipChanged {
                members: room.members.clone(),
            }),
            room_id,
            user.key,
            None,
        );

        self.push_broadcast(
            &mut actions,
            GroupId::Room(room_id),
            Payload::MemberJoined(room_payloads::MemberJoined {
                user_id: user.key,
                name: user.name.clone(),
            }),
            room_id,
            user.key,
            None,
        );

        self.push_send(
            &mut actions,
            session_id,
            Payload::JoinedRoom(room_payloads::JoinedRoom { room: room_entry(&room) }),
            room_id,
            user.key,
        );

        actions.push(ServerAction::PersistRoom(room));
        actions
    }

    /// Leave a room on explicit request.
    fn handle_leave_room(&mut self, session_id: u64, room_id: u128) -> Vec<ServerAction> {
        let Some(user) = self.users.get(session_id).cloned() else {
            return self.no_identity_error(session_id);
        };

        let Some(room) = self.rooms.get(room_id) else {
            return self.error_to(session_id, room_id, ErrorPayload::room_not_found(room_id));
        };

        if !room.is_member(user.key) {
            return self.error_to(
                session_id,
                room_id,
                ErrorPayload::not_found("not a member of this room"),
            );
        }

        let mut actions = self.depart_room(session_id, &user, room_id);

        // The requester always gets a leave confirmation.
        self.push_send(&mut actions, session_id, Payload::LeftRoom, room_id, user.key);
        actions
    }

    /// Kick members out of a room. Owner-only.
    fn handle_kick_members(
        &mut self,
        session_id: u64,
        room_id: u128,
        req: &room_payloads::KickMembers,
    ) -> Vec<ServerAction> {
        let Some(user) = self.users.get(session_id).cloned() else {
            return self.no_identity_error(session_id);
        };

        if req.targets.is_empty() {
            return self.error_to(
                session_id,
                room_id,
                ErrorPayload::invalid_payload("kick targets are required"),
            );
        }

        let Some(room) = self.rooms.get(room_id) else {
            return self.error_to(session_id, room_id, ErrorPayload::room_not_found(room_id));
        };

        if room.owner() != Some(user.key) {
            return self.error_to(
                session_id,
                room_id,
                ErrorPayload::forbidden("only the room owner can kick members"),
            );
        }

        // Valid targets: current members other than the owner, deduplicated.
        let mut targets: Vec<u64> = Vec::new();
        for &target in &req.targets {
            if target != user.key && room.is_member(target) && !targets.contains(&target) {
                targets.push(target);
            }
        }

        if targets.is_empty() {
            return self.error_to(
                session_id,
                room_id,
                ErrorPayload::not_found("no such members in room"),
            );
        }

        let mut actions = Vec::new();

        for target in &targets {
            let target_session = self.registry.session_for_user(*target);

            // Notify the target before their group membership disappears.
            if let Some(target_session) = target_session {
                self.push_send(&mut actions, target_session, Payload::Kicked, room_id, user.key);
            }

            let outcome = self.rooms.remove_member(room_id, *target);
            debug_assert!(
                matches!(outcome, Ok(RemovalOutcome::MemberRemoved)),
                "kicking a non-owner member cannot destroy or transfer the room"
            );

            if let Some(target_session) = target_session {
                self.registry.unsubscribe(target_session, GroupId::Room(room_id));
            }
        }

        // INVARIANT: the owner is still a member, so the room exists.
        #[allow(clippy::expect_used)]
        let room = self.rooms.get(room_id).expect("invariant: owner remains in room").clone();

        self.push_broadcast(
            &mut actions,
            GroupId::All,
            Payload::MembershipChanged(room_payloads::MembershipChanged {
                members: room.members.clone(),
            }),
            room_id,
            user.key,
            None,
        );

        self.push_broadcast(
            &mut actions,
            GroupId::Room(room_id),
            Payload::MembersKicked(room_payloads::MembersKicked { count: targets.len() as u32 }),
            room_id,
            user.key,
            None,
        );

        actions.push(ServerAction::PersistRoom(room));
        actions.push(ServerAction::Log {
            level: LogLevel::Info,
            message: format!("{} members kicked from room {room_id:032x}", targets.len()),
        });

        actions
    }

    /// Set or clear a room password. Owner-only.
    fn handle_set_room_password(
        &mut self,
        session_id: u64,
        room_id: u128,
        req: &room_payloads::SetRoomPassword,
    ) -> Vec<ServerAction> {
        let Some(user) = self.users.get(session_id).cloned() else {
            return self.no_identity_error(session_id);
        };

        let Some(room) = self.rooms.get(room_id) else {
            return self.error_to(session_id, room_id, ErrorPayload::room_not_found(room_id));
        };

        if room.owner() != Some(user.key) {
            return self.error_to(
                session_id,
                room_id,
                ErrorPayload::forbidden("only the room owner can change the password"),
            );
        }

        #[allow(clippy::expect_used)]
        let room = self
            .rooms
            .set_password(room_id, &req.password)
            .expect("invariant: room existence checked above")
            .clone();

        let mut actions = Vec::new();

        self.push_broadcast(
            &mut actions,
            GroupId::All,
            Payload::RoomLockChanged(room_payloads::RoomLockChanged { locked: room.is_locked() }),
            room_id,
            user.key,
            None,
        );

        actions.push(ServerAction::PersistRoom(room));
        actions
    }

    /// Fan a message out to a room's members.
    fn handle_room_message(
        &mut self,
        session_id: u64,
        room_id: u128,
        req: room_payloads::RoomMessage,
    ) -> Vec<ServerAction> {
        let Some(user) = self.users.get(session_id).cloned() else {
            return self.no_identity_error(session_id);
        };

        if req.text.is_empty() || room_id == 0 {
            return self.error_to(
                session_id,
                room_id,
                ErrorPayload::invalid_payload("message text and room are required"),
            );
        }

        let Some(room) = self.rooms.get(room_id) else {
            return self.error_to(session_id, room_id, ErrorPayload::room_not_found(room_id));
        };

        if !room.is_member(user.key) {
            return self.error_to(
                session_id,
                room_id,
                ErrorPayload::not_found("not a member of this room"),
            );
        }

        let mut actions = Vec::new();
        self.push_broadcast(
            &mut actions,
            GroupId::Room(room_id),
            Payload::RoomMessage(req),
            room_id,
            user.key,
            None,
        );
        actions
    }

    /// Handle a connection going away, gracefully or abruptly.
    ///
    /// The departing identity is removed from its room (same outcome handling
    /// as an explicit leave) before the identity record itself is discarded,
    /// so no room ever holds a dangling member key. Idempotent: a second
    /// close for the same session is a no-op.
    fn handle_disconnect(&mut self, session_id: u64, reason: &str) -> Vec<ServerAction> {
        let user = self.users.get(session_id).cloned();

        if self.registry.unregister_session(session_id).is_none() {
            return vec![ServerAction::Log {
                level: LogLevel::Debug,
                message: format!("close for unknown connection {session_id}"),
            }];
        }

        let mut actions = Vec::new();

        if let Some(user) = user {
            // Every room the user belongs to must drop them before the
            // identity record goes away - no dangling member keys.
            let member_rooms: Vec<u128> = self
                .rooms
                .list()
                .filter(|room| room.is_member(user.key))
                .map(|room| room.id)
                .collect();
            for room_id in member_rooms {
                let mut room_actions = self.depart_room(session_id, &user, room_id);
                actions.append(&mut room_actions);
            }

            self.users.remove(session_id);

            self.push_broadcast(
                &mut actions,
                GroupId::All,
                Payload::UserLeft(session::UserLeft {
                    user_id: user.key,
                    name: user.name.clone(),
                }),
                0,
                user.key,
                None,
            );

            actions.push(ServerAction::DeleteUser(user.key));
            actions.push(ServerAction::Log {
                level: LogLevel::Info,
                message: format!("user '{}' disconnected: {reason}", user.name),
            });
        } else {
            actions.push(ServerAction::Log {
                level: LogLevel::Debug,
                message: format!("anonymous connection {session_id} closed: {reason}"),
            });
        }

        actions
    }

    /// Shared removal path for explicit leave, kick-free departure, and
    /// disconnect. Unsubscribes first so the departing session never receives
    /// the room-scoped notices that follow.
    fn depart_room(&mut self, session_id: u64, user: &UserRecord, room_id: u128) -> Vec<ServerAction> {
        let mut actions = Vec::new();

        self.registry.unsubscribe(session_id, GroupId::Room(room_id));

        let outcome = match self.rooms.remove_member(room_id, user.key) {
            Ok(outcome) => outcome,
            Err(e) => {
                actions.push(ServerAction::Log {
                    level: LogLevel::Warn,
                    message: format!("departure from room {room_id:032x} failed: {e}"),
                });
                return actions;
            },
        };

        match outcome {
            RemovalOutcome::RoomNowEmpty => {
                self.push_broadcast(
                    &mut actions,
                    GroupId::All,
                    Payload::RoomDeleted,
                    room_id,
                    user.key,
                    None,
                );
                actions.push(ServerAction::DeleteRoom(room_id));
            },
            RemovalOutcome::OwnershipTransferred(new_owner_key) => {
                let new_owner = self.users.get_by_key(new_owner_key).map(|owner| {
                    room_payloads::RoomOwner { user_id: owner.key, name: owner.name.clone() }
                });
                self.announce_departure(&mut actions, user, room_id, new_owner);
            },
            RemovalOutcome::MemberRemoved => {
                self.announce_departure(&mut actions, user, room_id, None);
            },
        }

        actions
    }

    /// Membership update to all, leave notice (with any ownership transfer)
    /// to the remaining room members, and a mirror refresh.
    fn announce_departure(
        &mut self,
        actions: &mut Vec<ServerAction>,
        user: &UserRecord,
        room_id: u128,
        new_owner: Option<room_payloads::RoomOwner>,
    ) {
        // INVARIANT: the room persists after a non-emptying removal.
        #[allow(clippy::expect_used)]
        let room = self.rooms.get(room_id).expect("invariant: room survives removal").clone();

        self.push_broadcast(
            actions,
            GroupId::All,
            Payload::MembershipChanged(room_payloads::MembershipChanged {
                members: room.members.clone(),
            }),
            room_id,
            user.key,
            None,
        );

        self.push_broadcast(
            actions,
            GroupId::Room(room_id),
            Payload::MemberLeft(room_payloads::MemberLeft {
                user_id: user.key,
                name: user.name.clone(),
                new_owner,
            }),
            room_id,
            user.key,
            None,
        );

        actions.push(ServerAction::PersistRoom(room));
    }

    /// A random room id not currently in use.
    fn fresh_room_id(&self) -> u128 {
        loop {
            let candidate = self.env.random_u128();
            if candidate != 0 && self.rooms.get(candidate).is_none() {
                return candidate;
            }
        }
    }

    /// Base header for an outbound frame, stamped with the current time.
    fn outbound_header(&self, room_id: u128, sender_id: u64) -> FrameHeader {
        let mut header = FrameHeader::new(Opcode::Error); // overwritten by into_frame
        header.set_room_id(room_id);
        header.set_sender_id(sender_id);
        header.set_timestamp_secs(self.env.wall_clock_secs());
        header
    }

    /// Queue a direct send, degrading to a log action on encode failure.
    fn push_send(
        &self,
        actions: &mut Vec<ServerAction>,
        session_id: u64,
        payload: Payload,
        room_id: u128,
        sender_id: u64,
    ) {
        match payload.into_frame(self.outbound_header(room_id, sender_id)) {
            Ok(frame) => actions.push(ServerAction::SendToSession { session_id, frame }),
            Err(e) => actions.push(ServerAction::Log {
                level: LogLevel::Error,
                message: format!("failed to encode frame for session {session_id}: {e}"),
            }),
        }
    }

    /// Queue a group broadcast, degrading to a log action on encode failure.
    fn push_broadcast(
        &self,
        actions: &mut Vec<ServerAction>,
        group: GroupId,
        payload: Payload,
        room_id: u128,
        sender_id: u64,
        exclude_session: Option<u64>,
    ) {
        match payload.into_frame(self.outbound_header(room_id, sender_id)) {
            Ok(frame) => actions.push(ServerAction::Broadcast { group, frame, exclude_session }),
            Err(e) => actions.push(ServerAction::Log {
                level: LogLevel::Error,
                message: format!("failed to encode broadcast for {group:?}: {e}"),
            }),
        }
    }

    /// Error frame to the originating connection plus a warn log.
    fn error_to(&self, session_id: u64, room_id: u128, error: ErrorPayload) -> Vec<ServerAction> {
        let message = error.message.clone();
        match Payload::Error(error).into_frame(self.outbound_header(room_id, 0)) {
            Ok(frame) => vec![ServerAction::SendToSession { session_id, frame }, ServerAction::Log {
                level: LogLevel::Warn,
                message: format!("rejected event from connection {session_id}: {message}"),
            }],
            Err(e) => vec![ServerAction::Log {
                level: LogLevel::Error,
                message: format!("failed to encode error response: {e}"),
            }],
        }
    }

    /// Standard error for events that require an identity.
    fn no_identity_error(&self, session_id: u64) -> Vec<ServerAction> {
        self.error_to(
            session_id,
            0,
            ErrorPayload::not_found("no identity registered for this connection"),
        )
    }

    /// All sessions subscribed to a group. Used by the action executor.
    pub fn sessions_in_group(&self, group: GroupId) -> impl Iterator<Item = u64> + '_ {
        self.registry.sessions_in_group(group)
    }

    /// Whether a session is subscribed to a group.
    #[must_use]
    pub fn is_subscribed(&self, session_id: u64, group: GroupId) -> bool {
        self.registry.is_subscribed(session_id, group)
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.registry.session_count()
    }

    /// Number of registered identities.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Identity record for a connection, if registered.
    #[must_use]
    pub fn user_for_session(&self, session_id: u64) -> Option<&UserRecord> {
        self.users.get(session_id)
    }

    /// Room by id.
    #[must_use]
    pub fn room(&self, room_id: u128) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    /// All live rooms.
    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.list()
    }

    /// Number of live rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl<E> std::fmt::Debug for ServerDriver<E>
where
    E: Environment,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerDriver")
            .field("connection_count", &self.registry.session_count())
            .field("user_count", &self.users.len())
            .field("room_count", &self.rooms.len())
            .finish()
    }
}

/// Wire entry for a user record.
fn user_entry(record: &UserRecord) -> session::UserEntry {
    session::UserEntry {
        key: record.key,
        name: record.name.clone(),
        loud_speaker_opt_out: record.loud_speaker_opt_out,
    }
}

/// Wire entry for a room. The password never leaves the server.
fn room_entry(room: &Room) -> room_payloads::RoomEntry {
    room_payloads::RoomEntry {
        id: room.id,
        title: room.title.clone(),
        members: room.members.clone(),
        locked: room.is_locked(),
    }
}
