//! Bounded exponential backoff for recorder writes.
/// Attempts made per event before declaring the recording degraded.
pub const MAX_WRITE_ATTEMPTS: usize = 5;

/// First backoff step in milliseconds.
pub const BASE_BACKOFF_MS: u64 = 50;

/// Backoff before retry number `attempt` (0-based), doubling per attempt
/// with a capped shift.
pub fn next_backoff_ms(attempt: usize) -> u64 {
    let shift = attempt.min(6);
    BASE_BACKOFF_MS.saturating_mul(1_u64 << shift)
}
