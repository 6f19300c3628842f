//! Wire protocol for Quizhall.
//!
//! - **Types**: room codes, deck and question ids, [`GameMode`], question
//!   records and the client-facing views of players and scores.
//! - **Messages**: [`ClientEvent`], [`ServerEvent`], the [`Envelope`] that
//!   carries them and the [`Recipient`] tag rooms use for routing.
//! - **Codec**: the [`Codec`] trait and [`JsonCodec`].
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Session / Room
//! ```

mod codec;
mod error;
mod messages;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use messages::{
    ClientEvent, Envelope, PROTOCOL_VERSION, Recipient, ServerEvent,
};
pub use types::{
    ConnectionId, DeckId, GameMode, GameOverReason, Phase, PlayerView,
    Question, QuestionId, QuestionView, RoomCode, RoomSnapshot, ScoreEntry,
};
