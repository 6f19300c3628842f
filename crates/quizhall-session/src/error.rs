//! Error types for the session layer.

use quizhall_protocol::ConnectionId;

/// Errors that can occur during session management.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The [`Authenticator`](crate::Authenticator) rejected the token.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// No session exists for the connection.
    #[error("session not found for {0}")]
    NotFound(ConnectionId),

    /// A session is already registered for the connection.
    #[error("{0} already has a session")]
    AlreadyConnected(ConnectionId),
}
