//! Client and server events, the envelope that carries them, and the
//! [`Recipient`] routing tag rooms attach to outbound events.

use serde::{Deserialize, Serialize};

use crate::types::{
    ConnectionId, DeckId, GameMode, GameOverReason, PlayerView, QuestionId,
    QuestionView, RoomCode, RoomSnapshot, ScoreEntry,
};

/// Version a client must announce in its `Hello`.
pub const PROTOCOL_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Recipient
// ---------------------------------------------------------------------------

/// Who should receive a server event.
///
/// Room operations return `(Recipient, ServerEvent)` pairs instead of
/// writing to sockets themselves; the room actor resolves the recipient
/// against its member list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// Every member of the room.
    All,
    /// One member.
    Player(ConnectionId),
    /// Every member except one, usually the player who caused the event.
    AllExcept(ConnectionId),
}

impl Recipient {
    /// Returns `true` if a member with `id` should receive the event.
    pub fn includes(&self, id: ConnectionId) -> bool {
        match self {
            Self::All => true,
            Self::Player(target) => *target == id,
            Self::AllExcept(excluded) => *excluded != id,
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Every frame on the wire is an envelope around one event.
///
/// `seq` counts frames per direction per connection. `timestamp` is
/// milliseconds since the server started. Clients may omit both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<P> {
    #[serde(default)]
    pub seq: u64,
    #[serde(default)]
    pub timestamp: u64,
    pub payload: P,
}

impl<P> Envelope<P> {
    pub fn new(seq: u64, timestamp: u64, payload: P) -> Self {
        Self {
            seq,
            timestamp,
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// ClientEvent
// ---------------------------------------------------------------------------

/// Events a client sends.
///
/// Apart from `JoinRoom`, room-scoped events carry no room code: the
/// gateway knows which room the connection is in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// First frame of every connection.
    Hello {
        version: u32,
        #[serde(default)]
        token: Option<String>,
    },

    /// Create a new room with the sender as host.
    CreateRoom {
        #[serde(default)]
        display_name: Option<String>,
    },

    JoinRoom {
        room_code: RoomCode,
        #[serde(default)]
        display_name: Option<String>,
    },

    LeaveRoom,

    /// Toggle the sender's ready flag.
    SetReady,

    SelectDeck { deck_id: DeckId },

    SelectGameMode { mode: GameMode },

    /// Host only.
    StartGame,

    /// Answer the current question. `risk` only matters in risk mode.
    SubmitAnswer {
        question_id: QuestionId,
        answer_index: usize,
        #[serde(default)]
        risk: bool,
    },

    /// Play the fifty-fifty joker on the current question.
    UseJoker { question_id: QuestionId },

    /// Host only: abort the running game and return to the lobby.
    EndGame,

    /// Host only: take a finished room back to the lobby.
    ResetRoom,

    Disconnect {
        #[serde(default)]
        reason: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// ServerEvent
// ---------------------------------------------------------------------------

/// Events the server sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Handshake accepted.
    Welcome {
        connection_id: ConnectionId,
        display_name: String,
    },

    RoomCreated {
        room_code: RoomCode,
        host: ConnectionId,
    },

    /// Initial sync for a player who just joined.
    RoomJoined { room: RoomSnapshot },

    UpdatePlayers {
        players: Vec<PlayerView>,
        host: Option<ConnectionId>,
    },

    UpdateReadyStatus { players: Vec<PlayerView> },

    UpdateDeckSelection { deck_id: DeckId },

    UpdateGameModeSelection { mode: GameMode },

    AllSelectionsMade { deck_id: DeckId, mode: GameMode },

    /// Everyone is ready and both selections are made. The host may start.
    GameCanStart,

    /// The lobby countdown was armed.
    ReadyCountdown { seconds: u64 },

    /// Sent to the host when the lobby countdown runs out while the room
    /// can still start.
    CountdownElapsed,

    GameStarted {
        mode: GameMode,
        question_count: usize,
        /// Whole-game budget in seconds, speed mode only.
        time_budget_secs: Option<u64>,
        question: QuestionView,
    },

    NewQuestion {
        index: usize,
        question: QuestionView,
    },

    /// Private feedback to the player who answered.
    AnswerGraded {
        question_id: QuestionId,
        correct: bool,
        correct_option_index: usize,
        score: i64,
    },

    UpdateScores { scores: Vec<ScoreEntry> },

    JokerUsed {
        question_id: QuestionId,
        removed_options: Vec<usize>,
    },

    GameOver {
        reason: GameOverReason,
        scores: Vec<ScoreEntry>,
    },

    ReturnedToLobby { players: Vec<PlayerView> },

    NewHost { host: ConnectionId },

    /// Outcome of persisting this player's final score.
    ScoreRecorded {
        deck_id: DeckId,
        score: i64,
        accepted: bool,
    },

    /// `code` follows HTTP conventions: 400 malformed, 401 rejected token,
    /// 403 not host, 404 unknown room, 409 wrong phase, 422 not startable,
    /// 503 room unavailable.
    Error { code: u16, message: String },
}

impl ServerEvent {
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}
