//! Room actor: an isolated Tokio task that owns one [`Room`].
//!
//! Every operation on a room goes through its command channel, so the
//! room's read-modify-write steps never interleave. Events are pushed to
//! member channels in the order the room produced them.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use quizhall_clock::{RoomClock, TimerKind};
use quizhall_protocol::{
    ConnectionId, DeckId, GameMode, Phase, QuestionId, Recipient, RoomCode,
    RoomSnapshot, ServerEvent,
};
use quizhall_session::Identity;
use tokio::sync::{mpsc, oneshot};

use crate::room::{FinishedGame, Outbound};
use crate::scorer::Graded;
use crate::{QuestionSupply, Room, RoomError, ScoreStore, SupplyError};

/// Channel that delivers server events to one member's connection.
pub type MemberSender = mpsc::UnboundedSender<ServerEvent>;

/// Commands sent to a room actor through its channel.
pub(crate) enum RoomCommand {
    Join {
        connection_id: ConnectionId,
        identity: Identity,
        sender: MemberSender,
        reply: oneshot::Sender<RoomSnapshot>,
    },
    Leave {
        connection_id: ConnectionId,
        reply: oneshot::Sender<()>,
    },
    SetReady {
        connection_id: ConnectionId,
        reply: oneshot::Sender<Result<bool, RoomError>>,
    },
    SelectDeck {
        connection_id: ConnectionId,
        deck_id: DeckId,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    SelectGameMode {
        connection_id: ConnectionId,
        mode: GameMode,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Start {
        connection_id: ConnectionId,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    SubmitAnswer {
        connection_id: ConnectionId,
        question_id: QuestionId,
        answer_index: usize,
        risk: bool,
        reply: oneshot::Sender<Result<Graded, RoomError>>,
    },
    UseJoker {
        connection_id: ConnectionId,
        question_id: QuestionId,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    End {
        connection_id: ConnectionId,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Reset {
        connection_id: ConnectionId,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    GetInfo {
        reply: oneshot::Sender<RoomInfo>,
    },
}

/// A snapshot of room metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub room_code: RoomCode,
    pub phase: Phase,
    pub player_count: usize,
    pub host: Option<ConnectionId>,
    pub selected_deck: Option<DeckId>,
    pub selected_mode: Option<GameMode>,
    pub game_generation: u64,
}

// ---------------------------------------------------------------------------
// RoomHandle
// ---------------------------------------------------------------------------

/// Handle to a running room actor.
///
/// Cheap to clone. The registry hands out clones so callers can await a
/// room operation without holding the registry lock.
#[derive(Clone)]
pub struct RoomHandle {
    room_code: RoomCode,
    sender: mpsc::Sender<RoomCommand>,
    closed: Arc<AtomicBool>,
}

impl RoomHandle {
    pub fn room_code(&self) -> &RoomCode {
        &self.room_code
    }

    /// `true` once the last member left and the actor stopped.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// A room that went away between lookup and use reports `NotFound`.
    fn gone(&self) -> RoomError {
        if self.is_closed() {
            RoomError::NotFound(self.room_code.clone())
        } else {
            RoomError::Unavailable(self.room_code.clone())
        }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| self.gone())?;
        reply_rx.await.map_err(|_| self.gone())
    }

    /// Adds a member. `sender` joins the room's broadcast group in the
    /// same step.
    pub async fn join(
        &self,
        connection_id: ConnectionId,
        identity: Identity,
        sender: MemberSender,
    ) -> Result<RoomSnapshot, RoomError> {
        self.request(|reply| RoomCommand::Join {
            connection_id,
            identity,
            sender,
            reply,
        })
        .await
    }

    /// Removes a member. Never fails: a room that is already gone has
    /// nobody left to remove.
    pub async fn leave(&self, connection_id: ConnectionId) {
        let result = self
            .request(|reply| RoomCommand::Leave {
                connection_id,
                reply,
            })
            .await;
        if let Err(e) = result {
            tracing::debug!(room_code = %self.room_code, %connection_id, error = %e, "leave on a stopped room");
        }
    }

    /// Toggles ready and returns the new flag.
    pub async fn set_ready(&self, connection_id: ConnectionId) -> Result<bool, RoomError> {
        self.request(|reply| RoomCommand::SetReady {
            connection_id,
            reply,
        })
        .await?
    }

    pub async fn select_deck(
        &self,
        connection_id: ConnectionId,
        deck_id: DeckId,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::SelectDeck {
            connection_id,
            deck_id,
            reply,
        })
        .await?
    }

    pub async fn select_game_mode(
        &self,
        connection_id: ConnectionId,
        mode: GameMode,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::SelectGameMode {
            connection_id,
            mode,
            reply,
        })
        .await?
    }

    /// Host only. Fetches questions and starts the game.
    pub async fn start(&self, connection_id: ConnectionId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Start {
            connection_id,
            reply,
        })
        .await?
    }

    pub async fn submit_answer(
        &self,
        connection_id: ConnectionId,
        question_id: QuestionId,
        answer_index: usize,
        risk: bool,
    ) -> Result<Graded, RoomError> {
        self.request(|reply| RoomCommand::SubmitAnswer {
            connection_id,
            question_id,
            answer_index,
            risk,
            reply,
        })
        .await?
    }

    pub async fn use_joker(
        &self,
        connection_id: ConnectionId,
        question_id: QuestionId,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::UseJoker {
            connection_id,
            question_id,
            reply,
        })
        .await?
    }

    pub async fn end(&self, connection_id: ConnectionId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::End {
            connection_id,
            reply,
        })
        .await?
    }

    pub async fn reset(&self, connection_id: ConnectionId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Reset {
            connection_id,
            reply,
        })
        .await?
    }

    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        self.request(|reply| RoomCommand::GetInfo { reply }).await
    }
}

// ---------------------------------------------------------------------------
// RoomActor
// ---------------------------------------------------------------------------

/// The internal actor state. Runs inside a Tokio task.
struct RoomActor<Q, R> {
    room: Room,
    /// The room's broadcast group, keyed like the roster.
    members: HashMap<ConnectionId, MemberSender>,
    clock: RoomClock,
    /// Set after the countdown fired; cleared when the room stops being
    /// startable so the next all-ready moment arms a fresh countdown.
    countdown_fired: bool,
    countdown_generation: u64,
    questions: Arc<Q>,
    scores: Arc<R>,
    closed: Arc<AtomicBool>,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl<Q: QuestionSupply, R: ScoreStore> RoomActor<Q, R> {
    async fn run(mut self) {
        let room_code = self.room.code().clone();
        tracing::info!(%room_code, "room actor started");

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else { break };
                    if self.handle_command(cmd).await {
                        break;
                    }
                }
                expired = self.clock.wait_next() => {
                    let events = match expired.kind {
                        TimerKind::SpeedBudget => {
                            tracing::info!(%room_code, generation = expired.generation, "speed budget expired");
                            self.room.expire_speed_budget(expired.generation)
                        }
                        TimerKind::ReadyCountdown => {
                            self.countdown_fired = true;
                            self.room.countdown_elapsed()
                        }
                    };
                    self.settle(events);
                }
            }
        }

        self.clock.cancel_all();
        tracing::info!(%room_code, "room actor stopped");
    }

    /// Applies one command. Returns `true` when the room emptied and the
    /// actor must stop.
    async fn handle_command(&mut self, cmd: RoomCommand) -> bool {
        match cmd {
            RoomCommand::Join {
                connection_id,
                identity,
                sender,
                reply,
            } => {
                self.members.insert(connection_id, sender);
                let (snapshot, events) = self.room.join(connection_id, identity);
                self.settle(events);
                let _ = reply.send(snapshot);
            }
            RoomCommand::Leave {
                connection_id,
                reply,
            } => {
                let events = self.room.leave(connection_id);
                self.members.remove(&connection_id);
                self.settle(events);
                if self.room.is_empty() {
                    // Mark closed before replying so the caller's
                    // delete_if_empty sees it.
                    self.closed.store(true, Ordering::Release);
                    let _ = reply.send(());
                    return true;
                }
                let _ = reply.send(());
            }
            RoomCommand::SetReady {
                connection_id,
                reply,
            } => {
                let result = self.room.set_ready(connection_id).map(|(ready, events)| {
                    self.settle(events);
                    ready
                });
                let _ = reply.send(result);
            }
            RoomCommand::SelectDeck {
                connection_id,
                deck_id,
                reply,
            } => {
                let result = self.room.select_deck(connection_id, deck_id);
                let _ = reply.send(self.settle_result(result));
            }
            RoomCommand::SelectGameMode {
                connection_id,
                mode,
                reply,
            } => {
                let result = self.room.select_game_mode(connection_id, mode);
                let _ = reply.send(self.settle_result(result));
            }
            RoomCommand::Start {
                connection_id,
                reply,
            } => {
                let result = self.handle_start(connection_id).await;
                let _ = reply.send(self.settle_result(result));
            }
            RoomCommand::SubmitAnswer {
                connection_id,
                question_id,
                answer_index,
                risk,
                reply,
            } => {
                let result = self
                    .room
                    .submit_answer(connection_id, &question_id, answer_index, risk)
                    .map(|outcome| {
                        self.settle(outcome.events);
                        outcome.graded
                    });
                let _ = reply.send(result);
            }
            RoomCommand::UseJoker {
                connection_id,
                question_id,
                reply,
            } => {
                let result = self.room.use_joker(connection_id, &question_id);
                let _ = reply.send(self.settle_result(result));
            }
            RoomCommand::End {
                connection_id,
                reply,
            } => {
                let result = self.room.end(connection_id);
                let _ = reply.send(self.settle_result(result));
            }
            RoomCommand::Reset {
                connection_id,
                reply,
            } => {
                let result = self.room.reset(connection_id);
                let _ = reply.send(self.settle_result(result));
            }
            RoomCommand::GetInfo { reply } => {
                let _ = reply.send(self.info());
            }
        }
        false
    }

    /// Validates, fetches, then starts. The mailbox is not drained while
    /// the fetch is in flight, so the room cannot change underneath it.
    async fn handle_start(&mut self, connection_id: ConnectionId) -> Result<Outbound, RoomError> {
        let (deck, mode) = self.room.check_start(connection_id)?;
        let limit = self.room.config().question_limit;
        let questions = self
            .questions
            .fetch_questions(&deck, limit)
            .await
            .map_err(|e| {
                tracing::warn!(room_code = %self.room.code(), %deck, %mode, error = %e, "question fetch failed");
                match e {
                    SupplyError::DeckNotFound(deck) => RoomError::DeckUnavailable(deck),
                    SupplyError::Unavailable(_) => RoomError::DeckUnavailable(deck.clone()),
                }
            })?;
        self.room.begin_game(connection_id, questions)
    }

    fn settle_result(&mut self, result: Result<Outbound, RoomError>) -> Result<(), RoomError> {
        result.map(|events| self.settle(events))
    }

    /// Dispatches `events`, persists a finished game and re-derives the
    /// room's timers from its new state.
    fn settle(&mut self, events: Outbound) {
        self.dispatch(events);
        if let Some(finished) = self.room.take_finished() {
            self.persist_scores(finished);
        }
        self.sync_timers();
    }

    fn sync_timers(&mut self) {
        let config = self.room.config().clone();

        match self.room.speed_game() {
            Some(generation) => {
                if self.clock.armed_generation(TimerKind::SpeedBudget) != Some(generation) {
                    self.clock.arm(TimerKind::SpeedBudget, config.speed_budget, generation);
                }
            }
            None => {
                self.clock.cancel(TimerKind::SpeedBudget);
            }
        }

        if self.room.can_start() {
            if !self.countdown_fired && !self.clock.is_armed(TimerKind::ReadyCountdown) {
                self.countdown_generation += 1;
                self.clock.arm(
                    TimerKind::ReadyCountdown,
                    config.ready_countdown,
                    self.countdown_generation,
                );
                self.dispatch(vec![(
                    Recipient::All,
                    ServerEvent::ReadyCountdown {
                        seconds: config.ready_countdown.as_secs(),
                    },
                )]);
            }
        } else {
            self.clock.cancel(TimerKind::ReadyCountdown);
            self.countdown_fired = false;
        }
    }

    /// Records final scores off the actor task. Each rejection is
    /// reported to its player and never retried.
    fn persist_scores(&self, finished: FinishedGame) {
        let scores = Arc::clone(&self.scores);
        let room_code = self.room.code().clone();
        let targets: Vec<_> = finished
            .results
            .into_iter()
            .filter(|(_, identity, _)| !identity.is_guest())
            .map(|(id, identity, score)| (self.members.get(&id).cloned(), identity, score))
            .collect();
        if targets.is_empty() {
            return;
        }
        let deck = finished.deck;

        tokio::spawn(async move {
            for (sender, identity, score) in targets {
                let accepted = match scores.record_score(&identity, &deck, score).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(
                            %room_code,
                            %deck,
                            player = %identity.display_name,
                            error = %e,
                            "score not recorded"
                        );
                        false
                    }
                };
                if let Some(sender) = sender {
                    let _ = sender.send(ServerEvent::ScoreRecorded {
                        deck_id: deck.clone(),
                        score,
                        accepted,
                    });
                }
            }
        });
    }

    /// Sends each event to the members its recipient selects, in roster
    /// order.
    fn dispatch(&self, events: Outbound) {
        for (recipient, event) in events {
            for player in self.room.players() {
                if recipient.includes(player.connection_id) {
                    self.send_to(player.connection_id, event.clone());
                }
            }
        }
    }

    /// Silently drops the event if the member's connection is gone.
    fn send_to(&self, connection_id: ConnectionId, event: ServerEvent) {
        if let Some(sender) = self.members.get(&connection_id) {
            let _ = sender.send(event);
        }
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            room_code: self.room.code().clone(),
            phase: self.room.phase(),
            player_count: self.room.players().len(),
            host: self.room.host(),
            selected_deck: self.room.selected_deck().cloned(),
            selected_mode: self.room.selected_mode(),
            game_generation: self.room.game_generation(),
        }
    }
}

/// Spawns the actor for `room` and returns its handle.
///
/// `opening` holds the events produced while creating the room; they are
/// dispatched once the host's sender is registered.
pub(crate) fn spawn_room<Q: QuestionSupply, R: ScoreStore>(
    room: Room,
    host: (ConnectionId, MemberSender),
    opening: Outbound,
    questions: Arc<Q>,
    scores: Arc<R>,
) -> RoomHandle {
    let room_code = room.code().clone();
    let (tx, rx) = mpsc::channel(room.config().channel_size.max(1));
    let closed = Arc::new(AtomicBool::new(false));

    let mut actor = RoomActor {
        room,
        members: HashMap::from([host]),
        clock: RoomClock::new(),
        countdown_fired: false,
        countdown_generation: 0,
        questions,
        scores,
        closed: Arc::clone(&closed),
        receiver: rx,
    };
    actor.settle(opening);

    tokio::spawn(actor.run());

    RoomHandle {
        room_code,
        sender: tx,
        closed,
    }
}
