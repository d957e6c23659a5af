//! Time utilities for the match loop

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Match loop tick rate. A quiz turn is paced in whole seconds; the loop only
/// needs enough resolution to land the sub-second resolution delays.
pub const MATCH_TPS: u32 = 4;
pub const TICK_DURATION_MILLIS: u64 = 1_000 / MATCH_TPS as u64;

/// Delay between an answer being locked in and its resolution (ball flight).
pub const ANSWER_RESOLVE_DELAY: Duration = Duration::from_millis(1_500);
/// How long the celebration state stays up after a six.
pub const CELEBRATION_DURATION: Duration = Duration::from_millis(2_000);
/// Pause on a fallen wicket before the turn rotates.
pub const TURN_SWITCH_DELAY: Duration = Duration::from_millis(1_500);
