//! Room registry: the process-wide code → room table.
//!
//! The registry only does table work: generating codes, inserting,
//! looking up and removing handles. Room operations run on the handle a
//! caller cloned out, after the registry lock has been released.

use std::collections::HashMap;
use std::sync::Arc;

use quizhall_protocol::{ConnectionId, RoomCode};
use quizhall_session::Identity;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::actor::{MemberSender, spawn_room};
use crate::{QuestionSupply, Room, RoomConfig, RoomError, RoomHandle, ScoreStore};

/// Creates, finds and deletes rooms.
pub struct RoomRegistry<Q, R> {
    rooms: HashMap<RoomCode, RoomHandle>,
    questions: Arc<Q>,
    scores: Arc<R>,
    config: RoomConfig,
    /// Source for room codes and for seeding each room's own rng.
    rng: StdRng,
}

impl<Q: QuestionSupply, R: ScoreStore> RoomRegistry<Q, R> {
    pub fn new(questions: Arc<Q>, scores: Arc<R>, config: RoomConfig) -> Self {
        Self::with_rng(questions, scores, config, StdRng::from_rng(&mut rand::rng()))
    }

    /// Like [`new`](Self::new) with a caller-supplied rng, for
    /// reproducible codes and shuffles.
    pub fn with_rng(questions: Arc<Q>, scores: Arc<R>, config: RoomConfig, rng: StdRng) -> Self {
        Self {
            rooms: HashMap::new(),
            questions,
            scores,
            config,
            rng,
        }
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// Generates a code no live room uses, drawing again on collision.
    fn unique_code(&mut self) -> RoomCode {
        loop {
            let rng = &mut self.rng;
            let code = RoomCode::generate(|n| rng.random_range(0..n));
            if !self.rooms.contains_key(&code) {
                return code;
            }
            tracing::debug!(%code, "room code collision, regenerating");
        }
    }

    /// Creates a room in `Lobby` with `host` as its only member and host.
    ///
    /// The host receives `RoomCreated` on `sender`.
    pub fn create_room(
        &mut self,
        host: ConnectionId,
        identity: Identity,
        sender: MemberSender,
    ) -> RoomHandle {
        let code = self.unique_code();
        self.spawn(code, host, identity, sender)
    }

    /// Creates a room under a fixed code.
    ///
    /// # Errors
    /// [`RoomError::CodeTaken`] if a room already uses `code`, even one
    /// whose last member left but which has not been deleted yet. Nothing
    /// is spawned in that case.
    pub fn create_room_with_code(
        &mut self,
        code: RoomCode,
        host: ConnectionId,
        identity: Identity,
        sender: MemberSender,
    ) -> Result<RoomHandle, RoomError> {
        if self.rooms.contains_key(&code) {
            return Err(RoomError::CodeTaken(code));
        }
        Ok(self.spawn(code, host, identity, sender))
    }

    fn spawn(
        &mut self,
        code: RoomCode,
        host: ConnectionId,
        identity: Identity,
        sender: MemberSender,
    ) -> RoomHandle {
        let room_rng = StdRng::from_rng(&mut self.rng);
        let (room, opening) = Room::open(code.clone(), self.config.clone(), room_rng, host, identity);
        let handle = spawn_room(
            room,
            (host, sender),
            opening,
            Arc::clone(&self.questions),
            Arc::clone(&self.scores),
        );
        self.rooms.insert(code.clone(), handle.clone());
        tracing::info!(room_code = %code, %host, rooms = self.rooms.len(), "room created");
        handle
    }

    /// Looks up a live room.
    ///
    /// # Errors
    /// [`RoomError::NotFound`] if no room uses `code`, or its last member
    /// already left.
    pub fn get(&self, code: &RoomCode) -> Result<RoomHandle, RoomError> {
        self.rooms
            .get(code)
            .filter(|h| !h.is_closed())
            .cloned()
            .ok_or_else(|| RoomError::NotFound(code.clone()))
    }

    /// Removes the room if its last member has left. Returns `true` if it
    /// was removed.
    pub fn delete_if_empty(&mut self, code: &RoomCode) -> bool {
        let empty = self.rooms.get(code).is_some_and(RoomHandle::is_closed);
        if empty {
            self.rooms.remove(code);
            tracing::info!(room_code = %code, rooms = self.rooms.len(), "room deleted");
        }
        empty
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
