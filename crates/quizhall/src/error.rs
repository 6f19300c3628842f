//! Unified error type for the Quizhall server.

use quizhall_protocol::ProtocolError;
use quizhall_room::{RoomError, ScoreError, SupplyError};
use quizhall_session::SessionError;
use quizhall_transport::TransportError;

/// Top-level error that wraps every layer's error.
///
/// The `#[from]` attribute on each variant generates the `From` impl,
/// so `?` converts layer errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum QuizhallError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Supply(#[from] SupplyError),

    #[error(transparent)]
    Score(#[from] ScoreError),
}

impl QuizhallError {
    /// The code sent in an `Error` event for this failure.
    pub fn code(&self) -> u16 {
        match self {
            Self::Room(e) => e.code(),
            Self::Protocol(_) => 400,
            Self::Session(SessionError::AuthFailed(_)) => 401,
            Self::Supply(_) | Self::Score(_) => 503,
            Self::Transport(_) | Self::Session(_) => 500,
        }
    }

    /// `true` for errors the client is never told about.
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::Room(e) if e.is_silent())
    }
}
