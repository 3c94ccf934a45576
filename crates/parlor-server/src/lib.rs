//! Parlor production server.
//!
//! Real-time presence and room-messaging service: clients connect over QUIC,
//! register a display name, join/leave rooms, broadcast messages, and receive
//! live updates about other users and rooms.
//!
//! # Architecture
//!
//! The [`ServerDriver`] follows the Sans-IO pattern: it is a pure state
//! machine that consumes [`ServerEvent`]s and produces [`ServerAction`]s,
//! performing no I/O itself. [`Server`] is the production "glue" that
//! executes those actions using Quinn QUIC and the Tokio async runtime, and
//! mirrors state into a [`Storage`] backend best-effort.
//!
//! # Components
//!
//! - [`ServerDriver`]: presence/broadcast coordinator (pure logic, no I/O)
//! - [`IdentityRegistry`] / [`RoomRegistry`]: authoritative in-memory state
//! - [`ConnectionRegistry`]: session ↔ broadcast-group subscriptions
//! - [`Server`]: production runtime that executes driver actions
//! - [`QuinnTransport`]: QUIC transport via the Quinn library
//! - [`SystemEnv`]: production environment (real time, crypto RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod driver;
pub mod env;
mod error;
mod registry;
mod rooms;
mod server_error;
pub mod storage;
mod system_env;
mod transport;
mod users;

use std::{collections::HashMap, sync::Arc};

use bytes::BytesMut;
pub use driver::{DriverConfig, LogLevel, ServerAction, ServerDriver, ServerEvent};
pub use error::ServerError;
use parlor_proto::{Frame, FrameHeader};
pub use registry::{ConnectionRegistry, GroupId, SessionInfo};
pub use rooms::{RemovalOutcome, Room, RoomError, RoomRegistry};
pub use server_error::DriverError;
pub use storage::{MemoryStorage, RedbStorage, Storage, StorageError};
pub use system_env::SystemEnv;
use tokio::sync::RwLock;
pub use transport::{QuinnConnection, QuinnTransport};
pub use users::{IdentityError, IdentityRegistry, UserRecord};

use crate::env::Environment;

/// Shared state for all connections.
///
/// Holds connection and stream maps for message routing.
struct SharedState {
    /// Map of session ID to QUIC connection (for closing)
    connections: RwLock<HashMap<u64, QuinnConnection>>,
    /// Map of session ID to persistent outbound stream.
    /// All messages to a client go through this single stream, ensuring
    /// ordering.
    outbound_streams: RwLock<HashMap<u64, tokio::sync::Mutex<quinn::SendStream>>>,
}

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:4433")
    pub bind_address: String,
    /// Path to TLS certificate (PEM format)
    pub cert_path: Option<String>,
    /// Path to TLS private key (PEM format)
    pub key_path: Option<String>,
    /// Coordinator configuration (connection limits)
    pub driver: DriverConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4433".to_string(),
            cert_path: None,
            key_path: None,
            driver: DriverConfig::default(),
        }
    }
}

/// Production Parlor server.
///
/// Wraps `ServerDriver` with Quinn QUIC transport, system environment, and a
/// durable mirror.
pub struct Server<S>
where
    S: Storage,
{
    /// The action-based coordinator
    driver: ServerDriver<SystemEnv>,
    /// QUIC endpoint
    transport: QuinnTransport,
    /// Durable mirror
    storage: S,
    /// Environment
    env: SystemEnv,
}

impl<S> Server<S>
where
    S: Storage,
{
    /// Create and bind a new server.
    ///
    /// Any entities left in the mirror by a previous crash are dropped:
    /// their sessions cannot survive a process exit, so stale mirror state
    /// would only misrepresent presence.
    pub fn bind(config: ServerRuntimeConfig, storage: S) -> Result<Self, ServerError> {
        let env = SystemEnv::new();
        let driver = ServerDriver::new(env.clone(), config.driver);

        let stale_users = storage.load_users().map(|users| users.len()).unwrap_or(0);
        let stale_rooms = storage.load_rooms().map(|rooms| rooms.len()).unwrap_or(0);
        if stale_users > 0 || stale_rooms > 0 {
            tracing::info!(
                "dropping stale mirror state: {} users, {} rooms",
                stale_users,
                stale_rooms
            );
        }
        storage.clear()?;

        let transport =
            QuinnTransport::bind(&config.bind_address, config.cert_path, config.key_path)?;

        Ok(Self { driver, transport, storage, env })
    }

    /// Run the server, accepting connections and processing frames.
    ///
    /// This method runs until the server is shut down or an error occurs.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Server starting on {}", self.transport.local_addr()?);

        let env = self.env;
        let storage = self.storage;
        let driver = Arc::new(tokio::sync::Mutex::new(self.driver));
        let shared = Arc::new(SharedState {
            connections: RwLock::new(HashMap::new()),
            outbound_streams: RwLock::new(HashMap::new()),
        });

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let driver = Arc::clone(&driver);
                    let shared = Arc::clone(&shared);
                    let storage = storage.clone();
                    let env = env.clone();

                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_connection(conn, driver, shared, storage, env).await
                        {
                            tracing::error!("Connection error: {}", e);
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                },
            }
        }
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.transport.local_addr()
    }
}

/// Handle a single QUIC connection.
async fn handle_connection<S: Storage>(
    conn: QuinnConnection,
    driver: Arc<tokio::sync::Mutex<ServerDriver<SystemEnv>>>,
    shared: Arc<SharedState>,
    storage: S,
    env: SystemEnv,
) -> Result<(), ServerError> {
    let session_id = env.random_u64();

    tracing::debug!("New connection {} from {}", session_id, conn.remote_addr());

    let outbound_stream = conn
        .open_uni()
        .await
        .map_err(|e| ServerError::Internal(format!("Failed to open outbound stream: {e}")))?;

    {
        let mut connections = shared.connections.write().await;
        connections.insert(session_id, conn.clone());
    }

    {
        let mut streams = shared.outbound_streams.write().await;
        streams.insert(session_id, tokio::sync::Mutex::new(outbound_stream));
    }

    {
        let mut driver = driver.lock().await;
        let actions = driver.process_event(ServerEvent::ConnectionAccepted { session_id })?;
        execute_actions(&mut driver, actions, &shared, &storage).await;
    }

    loop {
        match conn.accept_bi().await {
            Ok((send, recv)) => {
                let driver = Arc::clone(&driver);
                let shared = Arc::clone(&shared);
                let storage = storage.clone();

                tokio::spawn(async move {
                    if let Err(e) =
                        handle_stream(session_id, send, recv, driver, &shared, &storage).await
                    {
                        tracing::debug!("Stream error: {}", e);
                    }
                });
            },
            Err(e) => {
                tracing::debug!("Connection closed: {}", e);
                break;
            },
        }
    }

    {
        let mut connections = shared.connections.write().await;
        connections.remove(&session_id);
    }

    {
        let mut streams = shared.outbound_streams.write().await;
        streams.remove(&session_id);
    }

    {
        let mut driver = driver.lock().await;
        let actions = driver.process_event(ServerEvent::ConnectionClosed {
            session_id,
            reason: "connection closed".to_string(),
        })?;
        execute_actions(&mut driver, actions, &shared, &storage).await;
    }

    Ok(())
}

/// Handle a single bidirectional stream.
async fn handle_stream<S: Storage>(
    session_id: u64,
    send: quinn::SendStream,
    mut recv: quinn::RecvStream,
    driver: Arc<tokio::sync::Mutex<ServerDriver<SystemEnv>>>,
    shared: &Arc<SharedState>,
    storage: &S,
) -> Result<(), ServerError> {
    drop(send); // responses go over the persistent outbound stream

    let mut buf = BytesMut::with_capacity(4096);

    loop {
        buf.clear();
        buf.resize(FrameHeader::SIZE, 0);

        match recv.read_exact(&mut buf[..FrameHeader::SIZE]).await {
            Ok(()) => {},
            Err(e) => {
                tracing::debug!("Read error: {}", e);
                break;
            },
        }

        let payload_size = match FrameHeader::from_bytes(&buf[..FrameHeader::SIZE]) {
            Ok(header) => header.payload_size() as usize,
            Err(e) => {
                tracing::warn!("Invalid frame header: {}", e);
                break;
            },
        };

        if payload_size > 0 {
            buf.resize(FrameHeader::SIZE + payload_size, 0);
            if let Err(e) = recv.read_exact(&mut buf[FrameHeader::SIZE..]).await {
                tracing::debug!("Payload read error: {}", e);
                break;
            }
        }

        let frame = match Frame::decode(&buf) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Frame decode error: {}", e);
                break;
            },
        };

        let mut driver = driver.lock().await;
        let actions =
            match driver.process_event(ServerEvent::FrameReceived { session_id, frame }) {
                Ok(actions) => actions,
                Err(e) => {
                    tracing::warn!("Frame processing error: {}", e);
                    continue;
                },
            };

        execute_actions(&mut driver, actions, shared, storage).await;
    }

    Ok(())
}

/// Execute server actions.
///
/// Send failures and mirror failures are logged and never propagate - an
/// unreachable peer or a sick mirror must not take down the event loop.
async fn execute_actions<S: Storage>(
    driver: &mut ServerDriver<SystemEnv>,
    actions: Vec<ServerAction>,
    shared: &SharedState,
    storage: &S,
) {
    for action in actions {
        match action {
            ServerAction::SendToSession { session_id, frame } => {
                let mut buf = Vec::new();
                if let Err(e) = frame.encode(&mut buf) {
                    tracing::error!("Failed to encode frame for {}: {}", session_id, e);
                    continue;
                }

                let streams = shared.outbound_streams.read().await;
                if let Some(stream_mutex) = streams.get(&session_id) {
                    let mut stream = stream_mutex.lock().await;
                    if let Err(e) = stream.write_all(&buf).await {
                        tracing::warn!("SendToSession write failed for {}: {}", session_id, e);
                    }
                } else {
                    tracing::warn!("SendToSession: session {} not found", session_id);
                }
            },

            ServerAction::Broadcast { group, frame, exclude_session } => {
                let sessions: Vec<u64> = driver.sessions_in_group(group).collect();

                let mut buf = Vec::new();
                if let Err(e) = frame.encode(&mut buf) {
                    tracing::error!("Failed to encode broadcast for {:?}: {}", group, e);
                    continue;
                }

                let streams = shared.outbound_streams.read().await;
                for session_id in sessions {
                    if Some(session_id) != exclude_session {
                        if let Some(stream_mutex) = streams.get(&session_id) {
                            let mut stream = stream_mutex.lock().await;
                            if let Err(e) = stream.write_all(&buf).await {
                                tracing::warn!(
                                    "Broadcast write failed for {}: {}",
                                    session_id,
                                    e
                                );
                            }
                        }
                    }
                }
            },

            ServerAction::CloseConnection { session_id, reason } => {
                tracing::info!("Closing connection {}: {}", session_id, reason);
                let mut connections = shared.connections.write().await;
                if let Some(conn) = connections.remove(&session_id) {
                    conn.close(0u32.into(), reason.as_bytes());
                }
            },

            ServerAction::PersistUser(user) => {
                if let Err(e) = storage.persist_user(&user) {
                    tracing::error!("Failed to mirror user {}: {}", user.key, e);
                }
            },

            ServerAction::DeleteUser(key) => {
                if let Err(e) = storage.delete_user(key) {
                    tracing::error!("Failed to remove mirrored user {}: {}", key, e);
                }
            },

            ServerAction::PersistRoom(room) => {
                if let Err(e) = storage.persist_room(&room) {
                    tracing::error!("Failed to mirror room {:032x}: {}", room.id, e);
                }
            },

            ServerAction::DeleteRoom(room_id) => {
                if let Err(e) = storage.delete_room(room_id) {
                    tracing::error!("Failed to remove mirrored room {:032x}: {}", room_id, e);
                }
            },

            ServerAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
        }
    }
}
