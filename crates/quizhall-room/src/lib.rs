//! Rooms for Quizhall.
//!
//! Each room runs as an isolated Tokio task (actor) that owns its state
//! machine, its members' outbound channels and its timers.
//!
//! # Key types
//!
//! - [`Room`]: the state machine (roster, host, selection, phase)
//! - [`GameSession`]: question sequencing and grading
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`RoomRegistry`]: code → room table
//! - [`QuestionSupply`] / [`ScoreStore`]: collaborators a room calls out to
//! - [`RoomConfig`]: limits and timer durations

#![allow(async_fn_in_trait)]

mod actor;
mod config;
mod error;
mod registry;
mod room;
mod scorer;
mod supply;

pub use actor::{MemberSender, RoomHandle, RoomInfo};
pub use config::{RiskFloor, RoomConfig};
pub use error::{Action, RoomError, ScoreError, SupplyError};
pub use registry::RoomRegistry;
pub use room::{AnswerOutcome, FinishedGame, Outbound, Player, Room};
pub use scorer::{Decision, GameSession, Graded, points};
pub use supply::{
    InMemoryQuestionSupply, InMemoryScoreStore, QuestionSupply, ScoreRecord,
    ScoreStore,
};
