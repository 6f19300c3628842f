//! Integration tests for the per-room deadline timers.
//!
//! Every test starts with paused time, so sleeps resolve as soon as the
//! runtime is idle and elapsed durations are exact.

use std::time::Duration;

use quizhall_clock::{RoomClock, TimerKind};
use tokio::time::{self, Instant};

#[tokio::test(start_paused = true)]
async fn test_unarmed_clock_pends_forever() {
    let mut clock = RoomClock::new();
    let result = time::timeout(Duration::from_secs(600), clock.wait_next()).await;
    assert!(result.is_err(), "nothing armed, nothing should fire");
}

#[tokio::test(start_paused = true)]
async fn test_armed_timer_fires_after_duration() {
    let mut clock = RoomClock::new();
    let start = Instant::now();
    clock.arm(TimerKind::ReadyCountdown, Duration::from_secs(5), 1);

    let expired = clock.wait_next().await;
    assert_eq!(expired.kind, TimerKind::ReadyCountdown);
    assert_eq!(expired.generation, 1);
    assert_eq!(start.elapsed(), Duration::from_secs(5));
    assert!(!clock.is_armed(TimerKind::ReadyCountdown));
    assert_eq!(clock.metrics().fired, 1);
}

#[tokio::test(start_paused = true)]
async fn test_rearm_replaces_previous_deadline() {
    let mut clock = RoomClock::new();
    let start = Instant::now();
    assert!(!clock.arm(TimerKind::ReadyCountdown, Duration::from_secs(5), 1));

    time::advance(Duration::from_secs(3)).await;
    assert!(clock.arm(TimerKind::ReadyCountdown, Duration::from_secs(5), 2));

    let expired = clock.wait_next().await;
    assert_eq!(expired.generation, 2);
    assert_eq!(start.elapsed(), Duration::from_secs(8));

    // The replaced deadline must not fire a second time.
    let again = time::timeout(Duration::from_secs(60), clock.wait_next()).await;
    assert!(again.is_err());
    assert_eq!(clock.metrics().cancelled, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_prevents_expiry() {
    let mut clock = RoomClock::new();
    clock.arm(TimerKind::SpeedBudget, Duration::from_secs(60), 7);
    assert!(clock.cancel(TimerKind::SpeedBudget));
    assert_eq!(clock.armed_generation(TimerKind::SpeedBudget), None);

    let result = time::timeout(Duration::from_secs(120), clock.wait_next()).await;
    assert!(result.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_earliest_deadline_fires_first() {
    let mut clock = RoomClock::new();
    let start = Instant::now();
    clock.arm(TimerKind::SpeedBudget, Duration::from_secs(60), 1);
    clock.arm(TimerKind::ReadyCountdown, Duration::from_secs(5), 1);

    let first = clock.wait_next().await;
    assert_eq!(first.kind, TimerKind::ReadyCountdown);
    assert_eq!(start.elapsed(), Duration::from_secs(5));

    let second = clock.wait_next().await;
    assert_eq!(second.kind, TimerKind::SpeedBudget);
    assert_eq!(start.elapsed(), Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_wait_next_is_cancel_safe() {
    let mut clock = RoomClock::new();
    clock.arm(TimerKind::SpeedBudget, Duration::from_secs(10), 3);

    // Drop the wait halfway through, as a select! branch losing would.
    let early = time::timeout(Duration::from_secs(4), clock.wait_next()).await;
    assert!(early.is_err());
    assert_eq!(clock.armed_generation(TimerKind::SpeedBudget), Some(3));
    assert_eq!(
        clock.remaining(TimerKind::SpeedBudget),
        Some(Duration::from_secs(6))
    );

    let expired = clock.wait_next().await;
    assert_eq!(expired.generation, 3);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_all_disarms_both() {
    let mut clock = RoomClock::new();
    clock.arm(TimerKind::SpeedBudget, Duration::from_secs(10), 1);
    clock.arm(TimerKind::ReadyCountdown, Duration::from_secs(5), 1);
    clock.cancel_all();
    assert!(!clock.is_armed(TimerKind::SpeedBudget));
    assert!(!clock.is_armed(TimerKind::ReadyCountdown));
    assert_eq!(clock.metrics().cancelled, 2);
}

#[tokio::test(start_paused = true)]
async fn test_select_with_command_branch() {
    let mut clock = RoomClock::new();
    let (tx, mut rx) = tokio::sync::mpsc::channel::<u32>(4);
    clock.arm(TimerKind::ReadyCountdown, Duration::from_secs(5), 1);
    tx.send(42).await.unwrap();

    // A queued command wins over a deadline that has not passed yet.
    tokio::select! {
        Some(cmd) = rx.recv() => assert_eq!(cmd, 42),
        _ = clock.wait_next() => panic!("timer should not fire before the command"),
    }
    assert!(clock.is_armed(TimerKind::ReadyCountdown));
}
