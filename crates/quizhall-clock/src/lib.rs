//! Per-room deadline timers for Quizhall.
//!
//! A room has at most two timed cancellations: the lobby ready countdown
//! and the speed-mode game budget. [`RoomClock`] holds one optional
//! deadline for each [`TimerKind`]. Arming a kind that is already armed
//! replaces the old deadline, so a room can never see two expiries from
//! the same kind of timer.
//!
//! # Integration
//!
//! The clock sits inside a room actor's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         expired = clock.wait_next() => {
//!             /* react to expired.kind */
//!         }
//!     }
//! }
//! ```
//!
//! When nothing is armed, [`RoomClock::wait_next`] pends forever and the
//! command branch is the only one that can make progress.

use std::fmt;
use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace};

// ---------------------------------------------------------------------------
// TimerKind
// ---------------------------------------------------------------------------

/// The timers a room can arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Lobby countdown started once everyone is ready.
    ReadyCountdown,
    /// Whole-game budget in speed mode.
    SpeedBudget,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadyCountdown => write!(f, "ready_countdown"),
            Self::SpeedBudget => write!(f, "speed_budget"),
        }
    }
}

// ---------------------------------------------------------------------------
// Expired
// ---------------------------------------------------------------------------

/// A deadline that fired, returned by [`RoomClock::wait_next`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expired {
    pub kind: TimerKind,
    /// The generation passed to [`RoomClock::arm`].
    pub generation: u64,
    /// How far past the deadline the clock woke up.
    pub late_by: Duration,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Counters for one clock. Mostly useful in tests and debug logs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClockMetrics {
    pub armed: u64,
    /// Deadlines dropped by [`RoomClock::cancel`] or replaced by a re-arm.
    pub cancelled: u64,
    pub fired: u64,
}

// ---------------------------------------------------------------------------
// RoomClock
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    generation: u64,
}

/// One room's timers.
#[derive(Debug, Default)]
pub struct RoomClock {
    ready: Option<Deadline>,
    speed: Option<Deadline>,
    metrics: ClockMetrics,
}

impl RoomClock {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, kind: TimerKind) -> &mut Option<Deadline> {
        match kind {
            TimerKind::ReadyCountdown => &mut self.ready,
            TimerKind::SpeedBudget => &mut self.speed,
        }
    }

    fn peek(&self, kind: TimerKind) -> Option<Deadline> {
        match kind {
            TimerKind::ReadyCountdown => self.ready,
            TimerKind::SpeedBudget => self.speed,
        }
    }

    /// Arms `kind` to fire `duration` from now.
    ///
    /// Any deadline already armed for `kind` is cancelled first. Returns
    /// `true` if one was replaced.
    pub fn arm(&mut self, kind: TimerKind, duration: Duration, generation: u64) -> bool {
        let at = Instant::now() + duration;
        let replaced = self.slot(kind).replace(Deadline { at, generation }).is_some();
        self.metrics.armed += 1;
        if replaced {
            self.metrics.cancelled += 1;
        }
        debug!(
            %kind,
            generation,
            secs = duration.as_secs_f64(),
            replaced,
            "timer armed"
        );
        replaced
    }

    /// Disarms `kind`. Returns `true` if it was armed.
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        let cancelled = self.slot(kind).take().is_some();
        if cancelled {
            self.metrics.cancelled += 1;
            debug!(%kind, "timer cancelled");
        }
        cancelled
    }

    /// Disarms every timer.
    pub fn cancel_all(&mut self) {
        self.cancel(TimerKind::ReadyCountdown);
        self.cancel(TimerKind::SpeedBudget);
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.peek(kind).is_some()
    }

    /// The generation `kind` was armed with, if armed.
    pub fn armed_generation(&self, kind: TimerKind) -> Option<u64> {
        self.peek(kind).map(|d| d.generation)
    }

    /// Time left before `kind` fires, if armed.
    pub fn remaining(&self, kind: TimerKind) -> Option<Duration> {
        self.peek(kind)
            .map(|d| d.at.saturating_duration_since(Instant::now()))
    }

    pub fn metrics(&self) -> &ClockMetrics {
        &self.metrics
    }

    /// The earliest armed deadline. Ties go to the ready countdown.
    fn next_due(&self) -> Option<(TimerKind, Deadline)> {
        let ready = self.ready.map(|d| (TimerKind::ReadyCountdown, d));
        let speed = self.speed.map(|d| (TimerKind::SpeedBudget, d));
        match (ready, speed) {
            (Some(r), Some(s)) => Some(if s.1.at < r.1.at { s } else { r }),
            (r, s) => r.or(s),
        }
    }

    /// Waits for the earliest armed deadline and disarms it.
    ///
    /// Pends forever while nothing is armed. Cancel-safe: dropping the
    /// future before it resolves leaves every deadline in place.
    pub async fn wait_next(&mut self) -> Expired {
        let Some((kind, deadline)) = self.next_due() else {
            return std::future::pending().await;
        };

        time::sleep_until(deadline.at).await;

        let late_by = Instant::now().saturating_duration_since(deadline.at);
        *self.slot(kind) = None;
        self.metrics.fired += 1;
        trace!(%kind, generation = deadline.generation, "timer fired");

        Expired {
            kind,
            generation: deadline.generation,
            late_by,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_remaining_counts_down() {
        let mut clock = RoomClock::new();
        clock.arm(TimerKind::SpeedBudget, Duration::from_secs(60), 1);
        time::advance(Duration::from_secs(15)).await;
        assert_eq!(
            clock.remaining(TimerKind::SpeedBudget),
            Some(Duration::from_secs(45))
        );
        assert_eq!(clock.remaining(TimerKind::ReadyCountdown), None);
    }

    #[test]
    fn test_cancel_unarmed_is_noop() {
        let mut clock = RoomClock::new();
        assert!(!clock.cancel(TimerKind::ReadyCountdown));
        assert_eq!(clock.metrics().cancelled, 0);
    }

    #[test]
    fn test_timer_kind_display() {
        assert_eq!(TimerKind::SpeedBudget.to_string(), "speed_budget");
        assert_eq!(TimerKind::ReadyCountdown.to_string(), "ready_countdown");
    }
}
