//! Error types for the protocol layer.
//!
//! Each crate in Quizhall defines its own error enum. A `ProtocolError`
//! always means the bytes or values on the wire were wrong, never that a
//! room or connection misbehaved.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, missing fields, or an
    /// unknown event `type`.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message decoded but violates protocol rules, e.g. a `Hello`
    /// with the wrong version or an event sent before the handshake.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A room code that is not six ASCII letters or digits.
    #[error("invalid room code {0:?}")]
    InvalidRoomCode(String),

    /// A game mode name outside the fixed mode table.
    #[error("unknown game mode {0:?}")]
    UnknownGameMode(String),
}
