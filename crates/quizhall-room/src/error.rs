//! Error types for the room layer and its collaborators.

use std::fmt;

use quizhall_protocol::{DeckId, Phase, RoomCode};

/// The room operation that hit a phase conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Select,
    Start,
    Answer,
    Joker,
    End,
    Reset,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select => write!(f, "select"),
            Self::Start => write!(f, "start"),
            Self::Answer => write!(f, "answer"),
            Self::Joker => write!(f, "use a joker"),
            Self::End => write!(f, "end the game"),
            Self::Reset => write!(f, "reset"),
        }
    }
}

/// Errors that can occur during room operations.
///
/// Every room operation validates before it mutates, so an `Err` always
/// means the room is unchanged.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("room {0} not found")]
    NotFound(RoomCode),

    #[error("room code {0} is already in use")]
    CodeTaken(RoomCode),

    #[error("only the host can do that")]
    NotHost,

    #[error("cannot {action} while the room is in {phase}")]
    InvalidPhaseTransition { phase: Phase, action: Action },

    #[error("already answered this question")]
    DuplicateAnswer,

    #[error("fifty-fifty joker already used this game")]
    JokerAlreadyUsed,

    #[error("deck {0} has no questions")]
    InsufficientQuestions(DeckId),

    #[error("answer refers to a question that is no longer current")]
    StaleQuestionReference,

    #[error("not a member of this room")]
    NotInRoom,

    #[error("pick a deck and a game mode first")]
    SelectionIncomplete,

    #[error("not every player is ready")]
    NotAllReady,

    #[error("deck {0} is unavailable")]
    DeckUnavailable(DeckId),

    /// The room's actor stopped or its mailbox closed.
    #[error("room {0} is unavailable")]
    Unavailable(RoomCode),
}

impl RoomError {
    /// Returns `true` for errors caused by stale or duplicated client
    /// events. These are dropped without telling the client.
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            Self::DuplicateAnswer
                | Self::StaleQuestionReference
                | Self::JokerAlreadyUsed
                | Self::InvalidPhaseTransition {
                    action: Action::Answer | Action::Joker,
                    ..
                }
        )
    }

    /// HTTP-style status code for the error event sent to the client.
    pub fn code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::NotHost => 403,
            Self::InvalidPhaseTransition { .. }
            | Self::DuplicateAnswer
            | Self::JokerAlreadyUsed
            | Self::StaleQuestionReference
            | Self::NotInRoom
            | Self::CodeTaken(_) => 409,
            Self::InsufficientQuestions(_)
            | Self::SelectionIncomplete
            | Self::NotAllReady
            | Self::DeckUnavailable(_) => 422,
            Self::Unavailable(_) => 503,
        }
    }
}

/// Errors from a [`QuestionSupply`](crate::QuestionSupply).
#[derive(Debug, thiserror::Error)]
pub enum SupplyError {
    #[error("deck {0} not found")]
    DeckNotFound(DeckId),

    #[error("question store unavailable: {0}")]
    Unavailable(String),
}

/// Errors from a [`ScoreStore`](crate::ScoreStore).
#[derive(Debug, thiserror::Error)]
pub enum ScoreError {
    /// A score for this player and deck already exists.
    #[error("score already recorded for {user_id} on deck {deck}")]
    AlreadyRecorded { user_id: String, deck: DeckId },

    #[error("score store unavailable: {0}")]
    Unavailable(String),
}
