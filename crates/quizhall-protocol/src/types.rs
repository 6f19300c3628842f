//! Identifiers and domain values that travel on the wire.
//!
//! These are the nouns of the protocol: room codes, deck and question ids,
//! the fixed game-mode table, question records, and the read-only views of
//! players and scores that clients render.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

pub use quizhall_transport::ConnectionId;

// ---------------------------------------------------------------------------
// RoomCode
// ---------------------------------------------------------------------------

/// A short, human-shareable room code such as `AB12CD`.
///
/// Codes are six ASCII letters or digits and compare case-insensitively:
/// they are normalized to uppercase on the way in, so `ab12cd` and
/// `AB12CD` name the same room.
///
/// Deserialization goes through [`RoomCode::parse`], so a malformed code
/// in a client frame fails to decode instead of reaching the registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Number of characters in a room code.
    pub const LEN: usize = 6;

    /// Characters a generated code is drawn from.
    pub const ALPHABET: &'static [u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

    /// Parses and normalizes a room code.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidRoomCode`] unless the trimmed input
    /// is exactly [`Self::LEN`] ASCII alphanumerics.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let trimmed = raw.trim();
        if trimmed.len() != Self::LEN
            || !trimmed.bytes().all(|b| b.is_ascii_alphanumeric())
        {
            return Err(ProtocolError::InvalidRoomCode(raw.to_string()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Builds a code by drawing [`Self::LEN`] characters from
    /// [`Self::ALPHABET`].
    ///
    /// `pick(n)` must return an index in `0..n`; callers pass their random
    /// source here so generation stays deterministic under test.
    pub fn generate(mut pick: impl FnMut(usize) -> usize) -> Self {
        let code = (0..Self::LEN)
            .map(|_| {
                let idx = pick(Self::ALPHABET.len()) % Self::ALPHABET.len();
                Self::ALPHABET[idx] as char
            })
            .collect();
        Self(code)
    }

    /// Returns the normalized code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomCode {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

impl FromStr for RoomCode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Deck / question ids
// ---------------------------------------------------------------------------

/// Identifier of a quiz deck in the question store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeckId(pub String);

impl fmt::Display for DeckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeckId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a single question record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(pub String);

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QuestionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// GameMode
// ---------------------------------------------------------------------------

/// The fixed table of game modes.
///
/// | mode | correct | incorrect | advance |
/// |---|---|---|---|
/// | classic / shuffle / timeattack | +1 | 0 | all answered |
/// | speed | +1 | 0 | all answered; game ends when the budget expires |
/// | survival | +1 | game ends | all answered, or first wrong answer |
/// | endless | +1 | 0 | wraps and reshuffles instead of ending |
/// | risk | +2 opted in, +1 otherwise | -1 | all answered |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Classic,
    Shuffle,
    TimeAttack,
    Speed,
    Survival,
    Endless,
    Risk,
}

impl GameMode {
    /// Every mode, in table order.
    pub const ALL: [GameMode; 7] = [
        Self::Classic,
        Self::Shuffle,
        Self::TimeAttack,
        Self::Speed,
        Self::Survival,
        Self::Endless,
        Self::Risk,
    ];

    /// The lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classic => "classic",
            Self::Shuffle => "shuffle",
            Self::TimeAttack => "timeattack",
            Self::Speed => "speed",
            Self::Survival => "survival",
            Self::Endless => "endless",
            Self::Risk => "risk",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameMode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == lower)
            .ok_or_else(|| ProtocolError::UnknownGameMode(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Coarse lifecycle stage of a room.
///
/// ```text
/// Lobby → Selecting → InProgress → Finished → Lobby (reset)
/// ```
///
/// `InProgress → Lobby` is also allowed: the host can force-end a running
/// game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Lobby,
    Selecting,
    InProgress,
    Finished,
}

impl Phase {
    /// Returns `true` if transitioning to `target` is allowed.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Lobby, Self::Selecting)
                | (Self::Selecting, Self::InProgress)
                | (Self::InProgress, Self::Finished)
                | (Self::InProgress, Self::Lobby)
                | (Self::Finished, Self::Lobby)
        )
    }

    /// Returns `true` while the room is still assembling a game.
    pub fn is_pregame(self) -> bool {
        matches!(self, Self::Lobby | Self::Selecting)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lobby => write!(f, "Lobby"),
            Self::Selecting => write!(f, "Selecting"),
            Self::InProgress => write!(f, "InProgress"),
            Self::Finished => write!(f, "Finished"),
        }
    }
}

// ---------------------------------------------------------------------------
// Questions
// ---------------------------------------------------------------------------

/// A full question record as supplied by the question store.
///
/// Never sent to clients as-is: use [`Question::view`] so the correct
/// option stays on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub text: String,
    pub options: [String; 4],
    pub correct_option_index: usize,
}

impl Question {
    /// The client-facing projection of this question.
    pub fn view(&self) -> QuestionView {
        QuestionView {
            id: self.id.clone(),
            text: self.text.clone(),
            options: self.options.clone(),
        }
    }

    /// Returns `true` if `answer_index` is the correct option.
    pub fn is_correct(&self, answer_index: usize) -> bool {
        self.correct_option_index == answer_index
    }
}

/// A question as shown to players: text and options, no answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionView {
    pub id: QuestionId,
    pub text: String,
    pub options: [String; 4],
}

// ---------------------------------------------------------------------------
// Player / score views
// ---------------------------------------------------------------------------

/// One roster entry as broadcast to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    pub connection_id: ConnectionId,
    pub display_name: String,
    pub is_host: bool,
    pub is_ready: bool,
}

/// One line of a scoreboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub connection_id: ConnectionId,
    pub display_name: String,
    pub score: i64,
}

/// Everything a joining player needs to render the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_code: RoomCode,
    pub players: Vec<PlayerView>,
    pub host: Option<ConnectionId>,
    pub selected_deck: Option<DeckId>,
    pub selected_mode: Option<GameMode>,
    pub phase: Phase,
    /// The question currently on screen, when joining a running game.
    pub current_question: Option<QuestionView>,
}

/// Why a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameOverReason {
    /// Every question was answered.
    Exhausted,
    /// A wrong answer in survival mode.
    SurvivalMiss,
    /// The speed-mode budget ran out.
    TimeUp,
    /// The host ended the game.
    EndedByHost,
}
