//! Room configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RiskFloor
// ---------------------------------------------------------------------------

/// What happens when a risk-mode penalty would push a score below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFloor {
    /// Scores never drop below zero.
    #[default]
    Zero,
    /// Scores may go negative.
    Unbounded,
}

impl RiskFloor {
    /// Applies the floor to a freshly adjusted score.
    pub fn apply(self, score: i64) -> i64 {
        match self {
            Self::Zero => score.max(0),
            Self::Unbounded => score,
        }
    }
}

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Settings shared by every room a registry creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Most questions fetched from a deck when a game starts.
    pub question_limit: usize,

    /// Whole-game wall-clock budget in speed mode.
    pub speed_budget: Duration,

    /// Lobby countdown armed once the room can start.
    pub ready_countdown: Duration,

    pub risk_floor: RiskFloor,

    /// Capacity of each room actor's command channel.
    pub channel_size: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            question_limit: 10,
            speed_budget: Duration::from_secs(60),
            ready_countdown: Duration::from_secs(5),
            risk_floor: RiskFloor::Zero,
            channel_size: 64,
        }
    }
}
