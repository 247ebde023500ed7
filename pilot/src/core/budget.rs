//! Deadline helpers shared by every bounded wait.

use std::time::Duration;

use tokio::time::Instant;

/// Remaining time until `deadline`, or zero once it has passed.
pub fn remaining_budget(deadline: Instant) -> Duration {
    deadline
        .checked_duration_since(Instant::now())
        .unwrap_or(Duration::ZERO)
}

/// The next poll sleep: `interval`, shortened so it never overshoots `deadline`.
pub fn next_poll_delay(deadline: Instant, interval: Duration) -> Duration {
    remaining_budget(deadline).min(interval)
}
