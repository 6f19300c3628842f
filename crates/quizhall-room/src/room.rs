//! The room state machine.
//!
//! [`Room`] owns the roster, host, shared selection, phase and the running
//! [`GameSession`]. It performs no I/O: each operation validates, mutates
//! and returns the events it produced as `(Recipient, ServerEvent)` pairs.
//! The room actor is the only caller in production; tests drive it
//! directly.
//!
//! ```text
//! Lobby → Selecting → InProgress → Finished → Lobby (reset)
//!                          └──────── end ────────┘
//! ```

use quizhall_protocol::{
    ConnectionId, DeckId, GameMode, GameOverReason, Phase, PlayerView,
    Question, QuestionId, Recipient, RoomCode, RoomSnapshot, ScoreEntry,
    ServerEvent,
};
use quizhall_session::Identity;
use rand::rngs::StdRng;

use crate::error::Action;
use crate::scorer::{Decision, GameSession, Graded};
use crate::{RoomConfig, RoomError};

/// Events produced by one room operation, in dispatch order.
pub type Outbound = Vec<(Recipient, ServerEvent)>;

/// A member of a room.
#[derive(Debug, Clone)]
pub struct Player {
    pub connection_id: ConnectionId,
    pub identity: Identity,
    pub is_host: bool,
    pub is_ready: bool,
    /// Position in join order. Host promotion picks the smallest.
    pub join_seq: u64,
}

impl Player {
    fn view(&self) -> PlayerView {
        PlayerView {
            connection_id: self.connection_id,
            display_name: self.identity.display_name.clone(),
            is_host: self.is_host,
            is_ready: self.is_ready,
        }
    }
}

/// Result of [`Room::submit_answer`].
#[derive(Debug)]
pub struct AnswerOutcome {
    pub graded: Graded,
    pub events: Outbound,
}

/// A game that just ended, with every remaining player's final score.
#[derive(Debug, Clone)]
pub struct FinishedGame {
    pub deck: DeckId,
    pub mode: GameMode,
    pub reason: GameOverReason,
    pub results: Vec<(ConnectionId, Identity, i64)>,
}

/// One quiz room.
#[derive(Debug)]
pub struct Room {
    code: RoomCode,
    config: RoomConfig,
    /// Kept in join order.
    players: Vec<Player>,
    next_join_seq: u64,
    selected_deck: Option<DeckId>,
    selected_mode: Option<GameMode>,
    phase: Phase,
    game: Option<GameSession>,
    /// Bumped on every game start; lets timers tell games apart.
    game_generation: u64,
    finished: Option<FinishedGame>,
    rng: StdRng,
}

impl Room {
    fn new(code: RoomCode, config: RoomConfig, rng: StdRng) -> Self {
        Self {
            code,
            config,
            players: Vec::new(),
            next_join_seq: 0,
            selected_deck: None,
            selected_mode: None,
            phase: Phase::Lobby,
            game: None,
            game_generation: 0,
            finished: None,
            rng,
        }
    }

    /// Creates a room with `host` as its only member.
    pub fn open(
        code: RoomCode,
        config: RoomConfig,
        rng: StdRng,
        host: ConnectionId,
        identity: Identity,
    ) -> (Self, Outbound) {
        let mut room = Self::new(code, config, rng);
        room.add_player(host, identity);
        let events = vec![
            (
                Recipient::Player(host),
                ServerEvent::RoomCreated {
                    room_code: room.code.clone(),
                    host,
                },
            ),
            (Recipient::All, room.update_players()),
        ];
        (room, events)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn host(&self) -> Option<ConnectionId> {
        self.players
            .iter()
            .find(|p| p.is_host)
            .map(|p| p.connection_id)
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, id: ConnectionId) -> Option<&Player> {
        self.players.iter().find(|p| p.connection_id == id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.player(id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn selected_deck(&self) -> Option<&DeckId> {
        self.selected_deck.as_ref()
    }

    pub fn selected_mode(&self) -> Option<GameMode> {
        self.selected_mode
    }

    pub fn game(&self) -> Option<&GameSession> {
        self.game.as_ref()
    }

    pub fn game_generation(&self) -> u64 {
        self.game_generation
    }

    /// The generation of the running speed game, if one is running.
    pub fn speed_game(&self) -> Option<u64> {
        match (&self.game, self.phase) {
            (Some(game), Phase::InProgress) if game.mode() == GameMode::Speed => {
                Some(self.game_generation)
            }
            _ => None,
        }
    }

    /// Everyone is ready, deck and mode are chosen, and no game is running.
    pub fn can_start(&self) -> bool {
        self.phase.is_pregame()
            && self.selected_deck.is_some()
            && self.selected_mode.is_some()
            && !self.players.is_empty()
            && self.players.iter().all(|p| p.is_ready)
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_code: self.code.clone(),
            players: self.player_views(),
            host: self.host(),
            selected_deck: self.selected_deck.clone(),
            selected_mode: self.selected_mode,
            phase: self.phase,
            current_question: match self.phase {
                Phase::InProgress => self.game.as_ref().map(GameSession::current_view),
                _ => None,
            },
        }
    }

    pub fn player_views(&self) -> Vec<PlayerView> {
        self.players.iter().map(Player::view).collect()
    }

    /// Scoreboard for the players still in the room, best first.
    pub fn score_entries(&self) -> Vec<ScoreEntry> {
        let mut entries: Vec<ScoreEntry> = self
            .players
            .iter()
            .map(|p| ScoreEntry {
                connection_id: p.connection_id,
                display_name: p.identity.display_name.clone(),
                score: self
                    .game
                    .as_ref()
                    .and_then(|g| g.score_of(p.connection_id))
                    .unwrap_or(0),
            })
            .collect();
        // Stable sort keeps join order among ties.
        entries.sort_by(|a, b| b.score.cmp(&a.score));
        entries
    }

    /// Takes the results of the most recently finished game, once.
    pub fn take_finished(&mut self) -> Option<FinishedGame> {
        self.finished.take()
    }

    fn live_ids(&self) -> Vec<ConnectionId> {
        self.players.iter().map(|p| p.connection_id).collect()
    }

    fn update_players(&self) -> ServerEvent {
        ServerEvent::UpdatePlayers {
            players: self.player_views(),
            host: self.host(),
        }
    }

    fn can_start_event(&self, events: &mut Outbound) {
        if self.can_start() {
            events.push((Recipient::All, ServerEvent::GameCanStart));
        }
    }

    fn require_member(&self, id: ConnectionId) -> Result<&Player, RoomError> {
        self.player(id).ok_or(RoomError::NotInRoom)
    }

    fn require_host(&self, id: ConnectionId) -> Result<(), RoomError> {
        if self.require_member(id)?.is_host {
            Ok(())
        } else {
            Err(RoomError::NotHost)
        }
    }

    fn transition(&mut self, target: Phase) {
        debug_assert!(
            self.phase.can_transition_to(target),
            "{} -> {target}",
            self.phase
        );
        tracing::debug!(room_code = %self.code, from = %self.phase, to = %target, "phase change");
        self.phase = target;
    }

    /// Back to the lobby with ready flags cleared. A room that keeps a
    /// selection goes on to `Selecting`.
    fn return_to_lobby(&mut self) {
        self.transition(Phase::Lobby);
        self.game = None;
        for p in &mut self.players {
            p.is_ready = false;
        }
        if self.selected_deck.is_some() || self.selected_mode.is_some() {
            self.transition(Phase::Selecting);
        }
    }

    fn add_player(&mut self, id: ConnectionId, identity: Identity) {
        let is_host = self.host().is_none();
        self.players.push(Player {
            connection_id: id,
            identity,
            is_host,
            is_ready: false,
            join_seq: self.next_join_seq,
        });
        self.next_join_seq += 1;
    }

    // -----------------------------------------------------------------------
    // Roster
    // -----------------------------------------------------------------------

    /// Adds a player. Joining twice from the same connection only resends
    /// the snapshot.
    ///
    /// The joiner gets `RoomJoined`; everyone else gets `UpdatePlayers`.
    pub fn join(&mut self, id: ConnectionId, identity: Identity) -> (RoomSnapshot, Outbound) {
        if self.contains(id) {
            let snapshot = self.snapshot();
            let events = vec![(
                Recipient::Player(id),
                ServerEvent::RoomJoined {
                    room: snapshot.clone(),
                },
            )];
            return (snapshot, events);
        }

        self.add_player(id, identity);
        tracing::info!(
            room_code = %self.code,
            connection_id = %id,
            players = self.players.len(),
            "player joined"
        );

        let snapshot = self.snapshot();
        let mut events = vec![
            (
                Recipient::Player(id),
                ServerEvent::RoomJoined {
                    room: snapshot.clone(),
                },
            ),
            (Recipient::AllExcept(id), self.update_players()),
        ];
        self.can_start_event(&mut events);
        (snapshot, events)
    }

    /// Removes a player. Never fails; leaving a room you are not in does
    /// nothing.
    ///
    /// A departing host hands over to the earliest remaining joiner. A
    /// departure mid-round may complete that round.
    pub fn leave(&mut self, id: ConnectionId) -> Outbound {
        let Some(pos) = self.players.iter().position(|p| p.connection_id == id) else {
            return Vec::new();
        };
        let removed = self.players.remove(pos);
        tracing::info!(
            room_code = %self.code,
            connection_id = %id,
            players = self.players.len(),
            "player left"
        );

        let mut events = Vec::new();
        if self.players.is_empty() {
            return events;
        }

        let mut new_host = None;
        if removed.is_host {
            if let Some(next) = self.players.iter_mut().min_by_key(|p| p.join_seq) {
                next.is_host = true;
                new_host = Some(next.connection_id);
            }
        }

        events.push((Recipient::All, self.update_players()));
        if let Some(host) = new_host {
            tracing::info!(room_code = %self.code, %host, "host changed");
            events.push((Recipient::All, ServerEvent::NewHost { host }));
        }

        if self.phase == Phase::InProgress {
            let decision = self
                .game
                .as_ref()
                .map(|g| g.round_decision(&self.live_ids()))
                .unwrap_or(Decision::Wait);
            self.apply_decision(decision, &mut events);
        }

        self.can_start_event(&mut events);
        events
    }

    /// Flips the player's ready flag and returns the new value.
    pub fn set_ready(&mut self, id: ConnectionId) -> Result<(bool, Outbound), RoomError> {
        let player = self
            .players
            .iter_mut()
            .find(|p| p.connection_id == id)
            .ok_or(RoomError::NotInRoom)?;
        player.is_ready = !player.is_ready;
        let ready = player.is_ready;

        let mut events = vec![(
            Recipient::All,
            ServerEvent::UpdateReadyStatus {
                players: self.player_views(),
            },
        )];
        self.can_start_event(&mut events);
        Ok((ready, events))
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    fn check_selectable(&self, id: ConnectionId) -> Result<(), RoomError> {
        self.require_member(id)?;
        if !self.phase.is_pregame() {
            return Err(RoomError::InvalidPhaseTransition {
                phase: self.phase,
                action: Action::Select,
            });
        }
        Ok(())
    }

    fn after_selection(&mut self, mut events: Outbound) -> Outbound {
        if self.phase == Phase::Lobby {
            self.transition(Phase::Selecting);
        }
        if let (Some(deck_id), Some(mode)) = (&self.selected_deck, self.selected_mode) {
            events.push((
                Recipient::All,
                ServerEvent::AllSelectionsMade {
                    deck_id: deck_id.clone(),
                    mode,
                },
            ));
        }
        self.can_start_event(&mut events);
        events
    }

    /// Any member may pick the deck; last write wins.
    pub fn select_deck(&mut self, id: ConnectionId, deck_id: DeckId) -> Result<Outbound, RoomError> {
        self.check_selectable(id)?;
        self.selected_deck = Some(deck_id.clone());
        let events = vec![(Recipient::All, ServerEvent::UpdateDeckSelection { deck_id })];
        Ok(self.after_selection(events))
    }

    /// Any member may pick the mode; last write wins.
    pub fn select_game_mode(&mut self, id: ConnectionId, mode: GameMode) -> Result<Outbound, RoomError> {
        self.check_selectable(id)?;
        self.selected_mode = Some(mode);
        let events = vec![(Recipient::All, ServerEvent::UpdateGameModeSelection { mode })];
        Ok(self.after_selection(events))
    }

    // -----------------------------------------------------------------------
    // Game
    // -----------------------------------------------------------------------

    /// Validates a start request and returns what to fetch.
    ///
    /// Does not mutate; the caller fetches questions and then calls
    /// [`Room::begin_game`].
    pub fn check_start(&self, id: ConnectionId) -> Result<(DeckId, GameMode), RoomError> {
        self.require_host(id)?;
        if !self.phase.is_pregame() {
            return Err(RoomError::InvalidPhaseTransition {
                phase: self.phase,
                action: Action::Start,
            });
        }
        let (Some(deck), Some(mode)) = (self.selected_deck.clone(), self.selected_mode) else {
            return Err(RoomError::SelectionIncomplete);
        };
        if !self.players.iter().all(|p| p.is_ready) {
            return Err(RoomError::NotAllReady);
        }
        Ok((deck, mode))
    }

    /// Starts a game over `questions` (shuffled here) and broadcasts the
    /// first question.
    pub fn begin_game(
        &mut self,
        id: ConnectionId,
        questions: Vec<Question>,
    ) -> Result<Outbound, RoomError> {
        let (deck, mode) = self.check_start(id)?;
        let game = GameSession::new(deck, mode, questions, self.config.risk_floor, &mut self.rng)?;

        if self.phase == Phase::Lobby {
            self.transition(Phase::Selecting);
        }
        self.transition(Phase::InProgress);
        self.game_generation += 1;
        self.finished = None;

        let event = ServerEvent::GameStarted {
            mode,
            question_count: game.question_count(),
            time_budget_secs: (mode == GameMode::Speed).then(|| self.config.speed_budget.as_secs()),
            question: game.current_view(),
        };
        tracing::info!(
            room_code = %self.code,
            %mode,
            deck = %game.deck(),
            questions = game.question_count(),
            "game started"
        );
        self.game = Some(game);
        Ok(vec![(Recipient::All, event)])
    }

    fn require_running(&self, action: Action) -> Result<(), RoomError> {
        if self.phase != Phase::InProgress || self.game.is_none() {
            return Err(RoomError::InvalidPhaseTransition {
                phase: self.phase,
                action,
            });
        }
        Ok(())
    }

    /// Grades an answer to the current question.
    ///
    /// Answers outside a running game, for a question that is no longer
    /// current, or repeated within a round are rejected with silent errors
    /// and change nothing.
    pub fn submit_answer(
        &mut self,
        id: ConnectionId,
        question_id: &QuestionId,
        answer_index: usize,
        risk: bool,
    ) -> Result<AnswerOutcome, RoomError> {
        self.require_member(id)?;
        self.require_running(Action::Answer)?;
        let live = self.live_ids();
        let game = self
            .game
            .as_mut()
            .ok_or(RoomError::InvalidPhaseTransition {
                phase: self.phase,
                action: Action::Answer,
            })?;
        let graded = game.grade(id, question_id, answer_index, risk, &live)?;

        let mut events = vec![
            (
                Recipient::Player(id),
                ServerEvent::AnswerGraded {
                    question_id: question_id.clone(),
                    correct: graded.correct,
                    correct_option_index: graded.correct_option_index,
                    score: graded.score,
                },
            ),
            (
                Recipient::All,
                ServerEvent::UpdateScores {
                    scores: self.score_entries(),
                },
            ),
        ];
        self.apply_decision(graded.decision, &mut events);
        Ok(AnswerOutcome { graded, events })
    }

    /// Plays the fifty-fifty joker. The result goes to the player alone.
    pub fn use_joker(&mut self, id: ConnectionId, question_id: &QuestionId) -> Result<Outbound, RoomError> {
        self.require_member(id)?;
        self.require_running(Action::Joker)?;
        let Some(game) = self.game.as_mut() else {
            return Ok(Vec::new());
        };
        let removed_options = game.use_joker(id, question_id, &mut self.rng)?;
        Ok(vec![(
            Recipient::Player(id),
            ServerEvent::JokerUsed {
                question_id: question_id.clone(),
                removed_options,
            },
        )])
    }

    fn apply_decision(&mut self, decision: Decision, events: &mut Outbound) {
        match decision {
            Decision::Wait => {}
            Decision::Advance | Decision::Wrap => {
                if let Some(game) = self.game.as_mut() {
                    let question = game.advance(&mut self.rng);
                    let index = game.index();
                    events.push((Recipient::All, ServerEvent::NewQuestion { index, question }));
                }
            }
            Decision::End(reason) => self.finish(reason, events),
        }
    }

    /// Ends the running game with `reason`, broadcasting final scores.
    /// The session is dropped here; its results live on in `finished`.
    fn finish(&mut self, reason: GameOverReason, events: &mut Outbound) {
        let scores = self.score_entries();
        let Some(game) = self.game.take() else {
            return;
        };
        let results = self
            .players
            .iter()
            .map(|p| {
                (
                    p.connection_id,
                    p.identity.clone(),
                    game.score_of(p.connection_id).unwrap_or(0),
                )
            })
            .collect();
        self.finished = Some(FinishedGame {
            deck: game.deck().clone(),
            mode: game.mode(),
            reason,
            results,
        });
        tracing::info!(room_code = %self.code, ?reason, "game over");

        self.transition(Phase::Finished);
        events.push((Recipient::All, ServerEvent::GameOver { reason, scores }));
    }

    /// Host only. Aborts a running game (final scores are still sent) or
    /// leaves the results screen, then returns everyone to the lobby.
    pub fn end(&mut self, id: ConnectionId) -> Result<Outbound, RoomError> {
        self.require_host(id)?;
        let mut events = Vec::new();
        match self.phase {
            Phase::InProgress => self.finish(GameOverReason::EndedByHost, &mut events),
            Phase::Finished => {}
            phase => {
                return Err(RoomError::InvalidPhaseTransition {
                    phase,
                    action: Action::End,
                });
            }
        }
        self.return_to_lobby();
        events.push((
            Recipient::All,
            ServerEvent::ReturnedToLobby {
                players: self.player_views(),
            },
        ));
        Ok(events)
    }

    /// Host only. Takes a finished room back to the lobby.
    pub fn reset(&mut self, id: ConnectionId) -> Result<Outbound, RoomError> {
        self.require_host(id)?;
        if self.phase != Phase::Finished {
            return Err(RoomError::InvalidPhaseTransition {
                phase: self.phase,
                action: Action::Reset,
            });
        }
        self.return_to_lobby();
        Ok(vec![(
            Recipient::All,
            ServerEvent::ReturnedToLobby {
                players: self.player_views(),
            },
        )])
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    /// The speed budget of game `generation` ran out.
    pub fn expire_speed_budget(&mut self, generation: u64) -> Outbound {
        let mut events = Vec::new();
        if self.speed_game() == Some(generation) {
            self.finish(GameOverReason::TimeUp, &mut events);
        }
        events
    }

    /// The lobby countdown ran out. Tells the host if the room can still
    /// start; never starts the game itself.
    pub fn countdown_elapsed(&self) -> Outbound {
        match self.host() {
            Some(host) if self.can_start() => {
                vec![(Recipient::Player(host), ServerEvent::CountdownElapsed)]
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn cid(n: u64) -> ConnectionId {
        ConnectionId::new(n)
    }

    fn guest(name: &str) -> Identity {
        Identity {
            display_name: name.into(),
            user_id: None,
        }
    }

    fn q(id: &str) -> Question {
        Question {
            id: id.into(),
            text: id.into(),
            options: ["a".into(), "b".into(), "c".into(), "d".into()],
            correct_option_index: 2,
        }
    }

    fn room_with(n: u64) -> Room {
        let (mut room, _) = Room::open(
            RoomCode::parse("AB12CD").unwrap(),
            RoomConfig::default(),
            StdRng::seed_from_u64(11),
            cid(1),
            guest("p1"),
        );
        for i in 2..=n {
            room.join(cid(i), guest(&format!("p{i}")));
        }
        room
    }

    fn ready_room(n: u64, mode: GameMode) -> Room {
        let mut room = room_with(n);
        room.select_deck(cid(1), "D1".into()).unwrap();
        room.select_game_mode(cid(1), mode).unwrap();
        for i in 1..=n {
            room.set_ready(cid(i)).unwrap();
        }
        room
    }

    fn started(n: u64, mode: GameMode, questions: usize) -> Room {
        let mut room = ready_room(n, mode);
        let qs = (0..questions).map(|i| q(&format!("q{i}"))).collect();
        room.begin_game(cid(1), qs).unwrap();
        room
    }

    fn current(room: &Room) -> QuestionId {
        room.game().unwrap().current().id.clone()
    }

    fn count<F: Fn(&ServerEvent) -> bool>(events: &Outbound, f: F) -> usize {
        events.iter().filter(|(_, e)| f(e)).count()
    }

    #[test]
    fn test_open_makes_creator_host() {
        let (room, events) = Room::open(
            RoomCode::parse("AB12CD").unwrap(),
            RoomConfig::default(),
            StdRng::seed_from_u64(1),
            cid(7),
            guest("host"),
        );
        assert_eq!(room.host(), Some(cid(7)));
        assert_eq!(room.phase(), Phase::Lobby);
        assert!(matches!(
            events[0],
            (Recipient::Player(id), ServerEvent::RoomCreated { host, .. }) if id == cid(7) && host == cid(7)
        ));
    }

    #[test]
    fn test_join_is_idempotent() {
        let mut room = room_with(2);
        let (snapshot, events) = room.join(cid(2), guest("again"));
        assert_eq!(room.players().len(), 2);
        assert_eq!(snapshot.players.len(), 2);
        assert_eq!(events.len(), 1);
        assert_eq!(room.player(cid(2)).unwrap().identity.display_name, "p2");
    }

    #[test]
    fn test_join_sends_snapshot_to_joiner_and_roster_to_others() {
        let mut room = room_with(1);
        let (_, events) = room.join(cid(2), guest("p2"));
        assert!(matches!(events[0], (Recipient::Player(id), ServerEvent::RoomJoined { .. }) if id == cid(2)));
        assert!(matches!(events[1], (Recipient::AllExcept(id), ServerEvent::UpdatePlayers { .. }) if id == cid(2)));
    }

    #[test]
    fn test_host_leave_promotes_earliest_joiner() {
        let mut room = room_with(3);
        let events = room.leave(cid(1));
        assert_eq!(room.host(), Some(cid(2)));
        assert!(events.iter().any(|(r, e)| *r == Recipient::All
            && *e == ServerEvent::NewHost { host: cid(2) }));
        assert_eq!(room.players().iter().filter(|p| p.is_host).count(), 1);
    }

    #[test]
    fn test_promotion_uses_join_order_not_position() {
        let mut room = room_with(4);
        room.leave(cid(2));
        room.join(cid(2), guest("back"));
        room.leave(cid(1));
        assert_eq!(room.host(), Some(cid(3)));
    }

    #[test]
    fn test_leave_unknown_is_noop() {
        let mut room = room_with(2);
        assert!(room.leave(cid(99)).is_empty());
        assert_eq!(room.players().len(), 2);
    }

    #[test]
    fn test_last_leave_empties_room() {
        let mut room = room_with(2);
        room.leave(cid(1));
        let events = room.leave(cid(2));
        assert!(events.is_empty());
        assert!(room.is_empty());
        assert_eq!(room.host(), None);
    }

    #[test]
    fn test_set_ready_toggles_in_lobby() {
        let mut room = room_with(2);
        assert_eq!(room.phase(), Phase::Lobby);
        assert!(room.set_ready(cid(2)).unwrap().0);
        assert!(!room.set_ready(cid(2)).unwrap().0);
        assert!(matches!(room.set_ready(cid(9)), Err(RoomError::NotInRoom)));
    }

    #[test]
    fn test_first_selection_enters_selecting() {
        let mut room = room_with(2);
        let events = room.select_game_mode(cid(2), GameMode::Risk).unwrap();
        assert_eq!(room.phase(), Phase::Selecting);
        assert_eq!(count(&events, |e| matches!(e, ServerEvent::AllSelectionsMade { .. })), 0);

        let events = room.select_deck(cid(1), "D1".into()).unwrap();
        assert_eq!(count(&events, |e| matches!(e, ServerEvent::AllSelectionsMade { .. })), 1);
        assert_eq!(room.phase(), Phase::Selecting);
    }

    #[test]
    fn test_game_can_start_when_all_ready() {
        let mut room = room_with(2);
        room.select_deck(cid(1), "D1".into()).unwrap();
        room.select_game_mode(cid(2), GameMode::Classic).unwrap();
        let (_, events) = room.set_ready(cid(1)).unwrap();
        assert_eq!(count(&events, |e| *e == ServerEvent::GameCanStart), 0);
        let (_, events) = room.set_ready(cid(2)).unwrap();
        assert_eq!(count(&events, |e| *e == ServerEvent::GameCanStart), 1);
        assert!(room.can_start());
        assert_eq!(room.phase(), Phase::Selecting, "can-start never moves the phase");
    }

    #[test]
    fn test_unready_leaver_unblocks_start() {
        let mut room = room_with(3);
        room.select_deck(cid(1), "D1".into()).unwrap();
        room.select_game_mode(cid(1), GameMode::Classic).unwrap();
        room.set_ready(cid(1)).unwrap();
        room.set_ready(cid(2)).unwrap();
        let events = room.leave(cid(3));
        assert_eq!(count(&events, |e| *e == ServerEvent::GameCanStart), 1);
    }

    #[test]
    fn test_start_checks() {
        let mut room = room_with(2);
        assert!(matches!(room.check_start(cid(2)), Err(RoomError::NotHost)));
        assert!(matches!(room.check_start(cid(1)), Err(RoomError::SelectionIncomplete)));
        room.select_deck(cid(1), "D1".into()).unwrap();
        room.select_game_mode(cid(1), GameMode::Classic).unwrap();
        assert!(matches!(room.check_start(cid(1)), Err(RoomError::NotAllReady)));
        room.set_ready(cid(1)).unwrap();
        room.set_ready(cid(2)).unwrap();
        assert_eq!(
            room.check_start(cid(1)).unwrap(),
            (DeckId::from("D1"), GameMode::Classic)
        );
    }

    #[test]
    fn test_begin_game_with_no_questions_leaves_room_untouched() {
        let mut room = ready_room(2, GameMode::Classic);
        let result = room.begin_game(cid(1), Vec::new());
        assert!(matches!(result, Err(RoomError::InsufficientQuestions(_))));
        assert_eq!(room.phase(), Phase::Selecting);
        assert!(room.game().is_none());
        assert_eq!(room.game_generation(), 0);
    }

    #[test]
    fn test_begin_game_broadcasts_first_question() {
        let mut room = ready_room(2, GameMode::Speed);
        let events = room.begin_game(cid(1), vec![q("a"), q("b")]).unwrap();
        assert_eq!(room.phase(), Phase::InProgress);
        match &events[..] {
            [(Recipient::All, ServerEvent::GameStarted { mode, question_count, time_budget_secs, .. })] => {
                assert_eq!(*mode, GameMode::Speed);
                assert_eq!(*question_count, 2);
                assert_eq!(*time_budget_secs, Some(60));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(room.speed_game(), Some(1));
    }

    #[test]
    fn test_answer_outside_game_is_silent() {
        let mut room = room_with(1);
        let err = room.submit_answer(cid(1), &"q0".into(), 0, false).unwrap_err();
        assert!(err.is_silent());
    }

    #[test]
    fn test_selection_during_game_is_rejected() {
        let mut room = started(2, GameMode::Classic, 3);
        let err = room.select_deck(cid(2), "D2".into()).unwrap_err();
        assert!(matches!(err, RoomError::InvalidPhaseTransition { phase: Phase::InProgress, .. }));
        assert_eq!(room.selected_deck(), Some(&DeckId::from("D1")));
    }

    #[test]
    fn test_round_advances_exactly_once() {
        let mut room = started(2, GameMode::Classic, 3);
        let id = current(&room);
        let first = room.submit_answer(cid(1), &id, 2, false).unwrap();
        assert_eq!(count(&first.events, |e| matches!(e, ServerEvent::NewQuestion { .. })), 0);
        let second = room.submit_answer(cid(2), &id, 2, false).unwrap();
        assert_eq!(count(&second.events, |e| matches!(e, ServerEvent::NewQuestion { .. })), 1);
        assert!(matches!(
            room.submit_answer(cid(2), &id, 2, false),
            Err(RoomError::StaleQuestionReference)
        ));
    }

    #[test]
    fn test_mid_round_leave_advances() {
        let mut room = started(3, GameMode::Classic, 3);
        let id = current(&room);
        room.submit_answer(cid(1), &id, 2, false).unwrap();
        room.submit_answer(cid(2), &id, 2, false).unwrap();
        let events = room.leave(cid(3));
        assert_eq!(count(&events, |e| matches!(e, ServerEvent::NewQuestion { index: 1, .. })), 1);
    }

    #[test]
    fn test_exhaustion_finishes_and_records_results() {
        let mut room = started(1, GameMode::Classic, 1);
        let id = current(&room);
        let outcome = room.submit_answer(cid(1), &id, 2, false).unwrap();
        assert_eq!(room.phase(), Phase::Finished);
        assert!(room.game().is_none());
        assert!(outcome.events.iter().any(|(_, e)| matches!(
            e,
            ServerEvent::GameOver { reason: GameOverReason::Exhausted, scores }
                if scores[0].score == 1
        )));
        let finished = room.take_finished().unwrap();
        assert_eq!(finished.results[0].2, 1);
        assert!(room.take_finished().is_none());
    }

    #[test]
    fn test_end_is_host_only_and_returns_to_lobby() {
        let mut room = started(2, GameMode::Classic, 3);
        assert!(matches!(room.end(cid(2)), Err(RoomError::NotHost)));
        let events = room.end(cid(1)).unwrap();
        assert!(matches!(
            events[0].1,
            ServerEvent::GameOver { reason: GameOverReason::EndedByHost, .. }
        ));
        assert!(matches!(events.last(), Some((_, ServerEvent::ReturnedToLobby { .. }))));
        assert_eq!(room.phase(), Phase::Selecting, "selection is kept");
        assert!(room.players().iter().all(|p| !p.is_ready));
        assert!(room.game().is_none());
        assert!(room.take_finished().is_some());
    }

    #[test]
    fn test_reset_only_from_finished() {
        let mut room = started(1, GameMode::Classic, 1);
        assert!(matches!(
            room.reset(cid(1)),
            Err(RoomError::InvalidPhaseTransition { action: Action::Reset, .. })
        ));
        let id = current(&room);
        room.submit_answer(cid(1), &id, 2, false).unwrap();
        room.reset(cid(1)).unwrap();
        assert_eq!(room.phase(), Phase::Selecting);
        assert!(room.check_start(cid(1)).is_err());
        room.set_ready(cid(1)).unwrap();
        room.begin_game(cid(1), vec![q("x")]).unwrap();
        assert_eq!(room.game_generation(), 2);
    }

    #[test]
    fn test_speed_budget_only_ends_matching_generation() {
        let mut room = started(2, GameMode::Speed, 5);
        assert!(room.expire_speed_budget(7).is_empty());
        assert_eq!(room.phase(), Phase::InProgress);
        let events = room.expire_speed_budget(1);
        assert!(matches!(
            events[0].1,
            ServerEvent::GameOver { reason: GameOverReason::TimeUp, .. }
        ));
        assert_eq!(room.phase(), Phase::Finished);
    }

    #[test]
    fn test_countdown_elapsed_goes_to_host_only_when_startable() {
        let room = ready_room(2, GameMode::Classic);
        let events = room.countdown_elapsed();
        assert_eq!(events, vec![(Recipient::Player(cid(1)), ServerEvent::CountdownElapsed)]);

        let room = room_with(2);
        assert!(room.countdown_elapsed().is_empty());
    }

    #[test]
    fn test_joker_is_unicast() {
        let mut room = started(2, GameMode::Classic, 3);
        let id = current(&room);
        let events = room.use_joker(cid(2), &id).unwrap();
        assert!(matches!(&events[..], [(Recipient::Player(p), ServerEvent::JokerUsed { .. })] if *p == cid(2)));
    }

    #[test]
    fn test_mid_game_join_sees_current_question() {
        let mut room = started(1, GameMode::Classic, 3);
        let (snapshot, _) = room.join(cid(5), guest("late"));
        assert_eq!(snapshot.phase, Phase::InProgress);
        assert_eq!(snapshot.current_question.unwrap().id, current(&room));
    }
}
