//! # Quizhall
//!
//! Realtime multiplayer quiz rooms over WebSocket.
//!
//! Players connect, say `Hello`, and then create or join a room by its
//! six-character code. The host picks a deck and a game mode, everyone
//! readies up, and the room's actor runs the game: it hands out questions,
//! grades answers, tracks scores and decides when to move on.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use quizhall::prelude::*;
//!
//! # async fn run() -> Result<(), QuizhallError> {
//! quizhall::init_tracing();
//!
//! let questions = InMemoryQuestionSupply::new().with_deck("capitals", Vec::new());
//! let server = QuizhallServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build(GuestAuthenticator, Arc::new(questions), Arc::new(InMemoryScoreStore::new()))
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;

pub use error::QuizhallError;
pub use server::{QuizhallServer, QuizhallServerBuilder};

/// Installs a `tracing` fmt subscriber filtered by `RUST_LOG`
/// (default `info`).
///
/// Calling it twice is harmless; the second call leaves the first
/// subscriber in place.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub mod prelude {
    pub use crate::{QuizhallError, QuizhallServer, QuizhallServerBuilder};
    pub use quizhall_protocol::{
        ClientEvent, Codec, ConnectionId, DeckId, Envelope, GameMode, GameOverReason,
        JsonCodec, PROTOCOL_VERSION, Phase, Question, QuestionId, QuestionView, RoomCode,
        ServerEvent,
    };
    pub use quizhall_room::{
        InMemoryQuestionSupply, InMemoryScoreStore, QuestionSupply, RiskFloor,
        RoomConfig, RoomError, ScoreError, ScoreStore, SupplyError,
    };
    pub use quizhall_session::{
        Authenticator, GuestAuthenticator, Identity, SessionError, TokenAuthenticator,
    };
}
