//! Session types: who is behind a connection and where they are.

use std::time::Instant;

use quizhall_protocol::{ConnectionId, RoomCode};
use rand::Rng;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The player behind a connection, as resolved at handshake time.
///
/// `user_id` is only set for authenticated accounts; scores are persisted
/// for those players alone. Guests play with a generated name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub display_name: String,
    pub user_id: Option<String>,
}

impl Identity {
    /// Upper bound (exclusive) for the numeric suffix of guest names.
    pub const GUEST_SUFFIX_RANGE: u32 = 1000;

    /// An authenticated account.
    pub fn user(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            user_id: Some(user_id.into()),
        }
    }

    /// A guest named `Guest_<n>` with `n` drawn from `rng`.
    pub fn guest(rng: &mut impl Rng) -> Self {
        Self {
            display_name: guest_name(rng),
            user_id: None,
        }
    }

    pub fn is_guest(&self) -> bool {
        self.user_id.is_none()
    }

    /// The same identity under a different display name.
    ///
    /// A blank `name` keeps the current one.
    pub fn renamed(&self, name: Option<&str>) -> Self {
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => Self {
                display_name: name.to_string(),
                user_id: self.user_id.clone(),
            },
            None => self.clone(),
        }
    }
}

/// Builds a `Guest_<n>` display name.
pub(crate) fn guest_name(rng: &mut impl Rng) -> String {
    format!(
        "Guest_{}",
        rng.random_range(0..Identity::GUEST_SUFFIX_RANGE)
    )
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The server's record of one live connection.
///
/// Created after a successful handshake and removed when the connection
/// closes, whatever the cause.
#[derive(Debug, Clone)]
pub struct Session {
    pub connection_id: ConnectionId,
    pub identity: Identity,
    /// The room this connection is currently in, if any.
    pub room: Option<RoomCode>,
    pub connected_at: Instant,
}

impl Session {
    pub fn new(connection_id: ConnectionId, identity: Identity) -> Self {
        Self {
            connection_id,
            identity,
            room: None,
            connected_at: Instant::now(),
        }
    }
}
