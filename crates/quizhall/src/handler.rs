//! Per-connection handler: handshake, auth, and event routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive `Hello` → validate version
//!   2. Authenticate token → get an `Identity`
//!   3. Send `Welcome` → session is live
//!   4. Loop: receive envelopes → route to the connection's room
//!
//! Outbound events, whether a reply to this connection or a room
//! broadcast, all go through one channel drained by a writer task, so
//! the client sees them in the order they were produced.

use std::sync::Arc;
use std::time::Duration;

use quizhall_protocol::{
    ClientEvent, Codec, ConnectionId, Envelope, PROTOCOL_VERSION, ProtocolError, ServerEvent,
};
use quizhall_room::{MemberSender, QuestionSupply, RoomError, RoomHandle, ScoreStore};
use quizhall_session::{Authenticator, Identity};
use quizhall_transport::{Connection, WebSocketConnection};
use tokio::sync::mpsc;

use crate::QuizhallError;
use crate::server::ServerState;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Drop guard that takes the connection out of its room and ends its
/// session when the handler exits.
///
/// This runs whatever ended the handler: an explicit `Disconnect`, a
/// closed socket or a transport error. Since `Drop` is synchronous, the
/// cleanup runs on a spawned task.
struct SessionGuard<A, Q, R, C>
where
    A: Authenticator,
    Q: QuestionSupply,
    R: ScoreStore,
    C: Codec,
{
    connection_id: ConnectionId,
    state: Arc<ServerState<A, Q, R, C>>,
}

impl<A, Q, R, C> Drop for SessionGuard<A, Q, R, C>
where
    A: Authenticator,
    Q: QuestionSupply,
    R: ScoreStore,
    C: Codec,
{
    fn drop(&mut self) {
        let connection_id = self.connection_id;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let session = state.sessions.lock().await.remove(connection_id);
            let Some(code) = session.and_then(|s| s.room) else {
                return;
            };
            let handle = state.rooms.lock().await.get(&code);
            if let Ok(handle) = handle {
                leave_room(&state, connection_id, &handle).await;
            }
        });
    }
}

/// Removes `connection_id` from the room and deletes the room if that
/// emptied it.
async fn leave_room<A, Q, R, C>(
    state: &ServerState<A, Q, R, C>,
    connection_id: ConnectionId,
    handle: &RoomHandle,
) where
    Q: QuestionSupply,
    R: ScoreStore,
{
    let code = handle.room_code();
    handle.leave(connection_id).await;
    state.rooms.lock().await.delete_if_empty(code);
    tracing::info!(%connection_id, room_code = %code, "left room");
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, Q, R, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<A, Q, R, C>>,
) -> Result<(), QuizhallError>
where
    A: Authenticator,
    Q: QuestionSupply,
    R: ScoreStore,
    C: Codec,
{
    let connection_id = conn.id();
    tracing::debug!(%connection_id, "handling new connection");

    // --- Step 1: Handshake ---
    let identity = perform_handshake(&conn, &state).await?;

    tracing::info!(%connection_id, display_name = %identity.display_name, "player connected");

    // Create session and guard together: if session creation fails, no
    // guard is needed. If it succeeds, the guard is immediately active.
    state
        .sessions
        .lock()
        .await
        .create(connection_id, identity.clone())?;
    let _guard = SessionGuard {
        connection_id,
        state: Arc::clone(&state),
    };

    let conn = Arc::new(conn);
    let (sender, receiver) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_loop(Arc::clone(&conn), receiver, Arc::clone(&state)));

    let mut gateway = Gateway {
        connection_id,
        identity,
        sender,
        room: None,
        state: Arc::clone(&state),
    };

    // --- Step 2: Event loop ---
    loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::info!(%connection_id, "connection closed cleanly");
                break;
            }
            Err(e) => {
                tracing::debug!(%connection_id, error = %e, "recv error");
                break;
            }
        };

        let envelope: Envelope<ClientEvent> = match state.codec.decode(&data) {
            Ok(env) => env,
            Err(e) => {
                tracing::debug!(%connection_id, error = %e, "failed to decode envelope");
                gateway.send(ServerEvent::error(400, format!("invalid message: {e}")));
                continue;
            }
        };

        match gateway.dispatch(envelope.payload).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Close) => break,
            Err(e) => gateway.report(e),
        }
    }

    // Room broadcasts stop here; the guard takes care of the room.
    writer.abort();
    Ok(())
}

/// Performs the handshake: receive `Hello`, validate, auth, send
/// `Welcome`.
async fn perform_handshake<A, Q, R, C>(
    conn: &WebSocketConnection,
    state: &ServerState<A, Q, R, C>,
) -> Result<Identity, QuizhallError>
where
    A: Authenticator,
    C: Codec,
{
    let data = match tokio::time::timeout(HANDSHAKE_TIMEOUT, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage("connection closed before handshake".into()).into());
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("handshake timed out".into()).into());
        }
    };

    let envelope: Envelope<ClientEvent> = match state.codec.decode(&data) {
        Ok(env) => env,
        Err(e) => {
            send_direct(conn, state, ServerEvent::error(400, "expected Hello")).await?;
            return Err(e.into());
        }
    };

    let ClientEvent::Hello { version, token } = envelope.payload else {
        send_direct(conn, state, ServerEvent::error(400, "expected Hello")).await?;
        return Err(ProtocolError::InvalidMessage("first message must be Hello".into()).into());
    };

    if version != PROTOCOL_VERSION {
        let message = format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}");
        send_direct(conn, state, ServerEvent::error(400, message)).await?;
        return Err(ProtocolError::InvalidMessage("protocol version mismatch".into()).into());
    }

    let identity = match state.auth.authenticate(token.as_deref()).await {
        Ok(identity) => identity,
        Err(e) => {
            send_direct(conn, state, ServerEvent::error(401, "unauthorized")).await?;
            return Err(e.into());
        }
    };

    let welcome = ServerEvent::Welcome {
        connection_id: conn.id(),
        display_name: identity.display_name.clone(),
    };
    send_direct(conn, state, welcome).await?;

    Ok(identity)
}

/// Sends one event before the writer task exists. Handshake frames use
/// sequence number 0.
async fn send_direct<A, Q, R, C: Codec>(
    conn: &WebSocketConnection,
    state: &ServerState<A, Q, R, C>,
    event: ServerEvent,
) -> Result<(), QuizhallError> {
    let bytes = state.codec.encode(&Envelope::new(0, state.now_millis(), event))?;
    conn.send(&bytes).await?;
    Ok(())
}

/// Drains the connection's outbound channel onto the socket.
async fn write_loop<A, Q, R, C: Codec>(
    conn: Arc<WebSocketConnection>,
    mut receiver: mpsc::UnboundedReceiver<ServerEvent>,
    state: Arc<ServerState<A, Q, R, C>>,
) {
    let connection_id = conn.id();
    let mut seq: u64 = 1;

    while let Some(event) = receiver.recv().await {
        let envelope = Envelope::new(next_seq(&mut seq), state.now_millis(), event);
        let bytes = match state.codec.encode(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(%connection_id, error = %e, "failed to encode event");
                continue;
            }
        };
        if let Err(e) = conn.send(&bytes).await {
            tracing::debug!(%connection_id, error = %e, "send failed, stopping writer");
            break;
        }
    }
}

/// Increments and returns the next sequence number.
fn next_seq(seq: &mut u64) -> u64 {
    let current = *seq;
    *seq += 1;
    current
}

/// Whether the event loop keeps going after an event.
enum Flow {
    Continue,
    Close,
}

/// One connection's view of the server: who it is, where its events go
/// and which room it is in.
struct Gateway<A, Q, R, C> {
    connection_id: ConnectionId,
    identity: Identity,
    sender: MemberSender,
    room: Option<RoomHandle>,
    state: Arc<ServerState<A, Q, R, C>>,
}

impl<A, Q, R, C> Gateway<A, Q, R, C>
where
    A: Authenticator,
    Q: QuestionSupply,
    R: ScoreStore,
    C: Codec,
{
    /// Queues an event for this connection only. A closed writer means
    /// the connection is going away, so the event is dropped.
    fn send(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }

    /// Surfaces an error to this connection, or swallows it if it stems
    /// from a stale or repeated client message.
    fn report(&self, err: QuizhallError) {
        let connection_id = self.connection_id;
        if err.is_silent() {
            tracing::debug!(%connection_id, error = %err, "ignored client event");
            return;
        }
        tracing::debug!(%connection_id, error = %err, "client event rejected");
        self.send(ServerEvent::error(err.code(), err.to_string()));
    }

    fn current_room(&self) -> Result<&RoomHandle, RoomError> {
        self.room.as_ref().ok_or(RoomError::NotInRoom)
    }

    async fn dispatch(&mut self, event: ClientEvent) -> Result<Flow, QuizhallError> {
        let id = self.connection_id;
        match event {
            ClientEvent::Hello { .. } => {
                return Err(ProtocolError::InvalidMessage("already said hello".into()).into());
            }
            ClientEvent::CreateRoom { display_name } => {
                self.leave_current().await;
                let identity = self.identity.renamed(display_name.as_deref());
                let handle = self
                    .state
                    .rooms
                    .lock()
                    .await
                    .create_room(id, identity, self.sender.clone());
                self.enter(handle).await?;
            }
            ClientEvent::JoinRoom {
                room_code,
                display_name,
            } => {
                let handle = self.state.rooms.lock().await.get(&room_code)?;
                if self.room.as_ref().map(RoomHandle::room_code) != Some(&room_code) {
                    self.leave_current().await;
                }
                let identity = self.identity.renamed(display_name.as_deref());
                handle.join(id, identity, self.sender.clone()).await?;
                self.enter(handle).await?;
            }
            ClientEvent::LeaveRoom => self.leave_current().await,
            ClientEvent::SetReady => {
                self.current_room()?.set_ready(id).await?;
            }
            ClientEvent::SelectDeck { deck_id } => {
                self.current_room()?.select_deck(id, deck_id).await?;
            }
            ClientEvent::SelectGameMode { mode } => {
                self.current_room()?.select_game_mode(id, mode).await?;
            }
            ClientEvent::StartGame => {
                self.current_room()?.start(id).await?;
            }
            ClientEvent::SubmitAnswer {
                question_id,
                answer_index,
                risk,
            } => {
                self.current_room()?
                    .submit_answer(id, question_id, answer_index, risk)
                    .await?;
            }
            ClientEvent::UseJoker { question_id } => {
                self.current_room()?.use_joker(id, question_id).await?;
            }
            ClientEvent::EndGame => {
                self.current_room()?.end(id).await?;
            }
            ClientEvent::ResetRoom => {
                self.current_room()?.reset(id).await?;
            }
            ClientEvent::Disconnect { reason } => {
                tracing::info!(connection_id = %id, reason = reason.as_deref().unwrap_or(""), "client disconnected");
                return Ok(Flow::Close);
            }
        }
        Ok(Flow::Continue)
    }

    /// Records `handle` as the connection's room.
    async fn enter(&mut self, handle: RoomHandle) -> Result<(), QuizhallError> {
        let code = handle.room_code().clone();
        self.room = Some(handle);
        self.state.sessions.lock().await.set_room(self.connection_id, code.clone())?;
        tracing::info!(connection_id = %self.connection_id, room_code = %code, "entered room");
        Ok(())
    }

    /// Leaves the current room, if any. Never fails.
    async fn leave_current(&mut self) {
        let Some(handle) = self.room.take() else {
            return;
        };
        self.state.sessions.lock().await.clear_room(self.connection_id);
        leave_room(&self.state, self.connection_id, &handle).await;
    }
}
