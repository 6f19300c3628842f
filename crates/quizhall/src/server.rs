//! `QuizhallServer` builder and accept loop.
//!
//! This is the entry point for running a quiz server. It ties together
//! all the layers: transport → protocol → session → room.

use std::sync::Arc;
use std::time::Instant;

use quizhall_protocol::{Codec, JsonCodec};
use quizhall_room::{QuestionSupply, RoomConfig, RoomRegistry, ScoreStore};
use quizhall_session::{Authenticator, SessionManager};
use quizhall_transport::{Transport, WebSocketTransport};
use tokio::sync::Mutex;

use crate::QuizhallError;
use crate::handler::handle_connection;

/// Shared server state passed to each connection handler task.
///
/// Both tables sit behind their own mutex and are locked only for the
/// table operation itself. Room operations run on a cloned
/// [`RoomHandle`](quizhall_room::RoomHandle) after the lock is released.
pub(crate) struct ServerState<A, Q, R, C> {
    pub(crate) sessions: Mutex<SessionManager>,
    pub(crate) rooms: Mutex<RoomRegistry<Q, R>>,
    pub(crate) auth: A,
    pub(crate) codec: C,
    /// Origin for envelope timestamps.
    pub(crate) started: Instant,
}

impl<A, Q, R, C> ServerState<A, Q, R, C> {
    /// Milliseconds since the server started.
    pub(crate) fn now_millis(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Builder for configuring and starting a quiz server.
///
/// # Example
///
/// ```rust,ignore
/// use quizhall::prelude::*;
///
/// let server = QuizhallServer::builder()
///     .bind("0.0.0.0:8080")
///     .room_config(RoomConfig { question_limit: 20, ..RoomConfig::default() })
///     .build(GuestAuthenticator, Arc::new(questions), Arc::new(scores))
///     .await?;
/// server.run().await
/// ```
pub struct QuizhallServerBuilder {
    bind_addr: String,
    room_config: RoomConfig,
}

impl QuizhallServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            room_config: RoomConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the configuration every new room starts with.
    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.room_config = config;
        self
    }

    /// Binds the listener and builds the server.
    ///
    /// Frames are JSON-encoded and carried over WebSocket.
    pub async fn build<A, Q, R>(
        self,
        auth: A,
        questions: Arc<Q>,
        scores: Arc<R>,
    ) -> Result<QuizhallServer<A, Q, R, JsonCodec>, QuizhallError>
    where
        A: Authenticator,
        Q: QuestionSupply,
        R: ScoreStore,
    {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            sessions: Mutex::new(SessionManager::new()),
            rooms: Mutex::new(RoomRegistry::new(questions, scores, self.room_config)),
            auth,
            codec: JsonCodec,
            started: Instant::now(),
        });

        Ok(QuizhallServer { transport, state })
    }
}

impl Default for QuizhallServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound quiz server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct QuizhallServer<A, Q, R, C = JsonCodec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<A, Q, R, C>>,
}

impl QuizhallServer<(), (), (), JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> QuizhallServerBuilder {
        QuizhallServerBuilder::new()
    }
}

impl<A, Q, R, C> QuizhallServer<A, Q, R, C>
where
    A: Authenticator,
    Q: QuestionSupply,
    R: ScoreStore,
    C: Codec,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the accept loop.
    ///
    /// Spawns a handler task per accepted connection. Runs until the
    /// process is terminated.
    pub async fn run(mut self) -> Result<(), QuizhallError> {
        tracing::info!(addr = ?self.local_addr().ok(), "quizhall server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
