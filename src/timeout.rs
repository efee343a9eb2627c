//! Deadline enforcement for polling loops
//!
//! Build-log tailing and the device handshake both poll on a fixed interval
//! under a wall-clock deadline:
//! - `poll_interval`: sleep between polls
//! - `deadline`: maximum wall-clock time for the whole loop
//!
//! Cancellation is deadline-based only. The deadline is checked before every
//! poll, so once it has passed no further request is issued.

use std::time::{Duration, Instant};

/// Upper bound accepted for any deadline (24 hours)
const MAX_DEADLINE: Duration = Duration::from_secs(86_400);

/// Timing for a polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailTimeouts {
    /// Sleep between polls (default: 2 s)
    pub poll_interval: Duration,

    /// Wall-clock bound on the loop (default: 30 min)
    pub deadline: Duration,
}

impl Default for TailTimeouts {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            deadline: Duration::from_secs(30 * 60),
        }
    }
}

impl TailTimeouts {
    pub fn new(poll_interval: Duration, deadline: Duration) -> Self {
        Self {
            poll_interval,
            deadline,
        }
    }

    /// Validate bounds: deadline in (0, 24h], poll interval no longer than
    /// the deadline
    pub fn validate(&self) -> Result<(), TimeoutValidationError> {
        if self.deadline.is_zero() || self.deadline > MAX_DEADLINE {
            return Err(TimeoutValidationError::DeadlineOutOfBounds {
                value: self.deadline.as_secs(),
            });
        }

        if self.poll_interval.is_zero() {
            return Err(TimeoutValidationError::ZeroInterval);
        }

        if self.poll_interval > self.deadline {
            return Err(TimeoutValidationError::IntervalExceedsDeadline {
                interval_ms: self.poll_interval.as_millis() as u64,
                deadline_secs: self.deadline.as_secs(),
            });
        }

        Ok(())
    }

    /// Start the clock
    pub fn start(&self) -> Deadline {
        Deadline::after(self.deadline)
    }
}

/// Timeout validation errors
#[derive(Debug, thiserror::Error)]
pub enum TimeoutValidationError {
    #[error("deadline_seconds must be in (0, 86400], got {value}")]
    DeadlineOutOfBounds { value: u64 },

    #[error("poll interval must be positive")]
    ZeroInterval,

    #[error("poll interval {interval_ms}ms exceeds deadline {deadline_secs}s")]
    IntervalExceedsDeadline { interval_ms: u64, deadline_secs: u64 },
}

/// A running wall-clock deadline
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    /// When the clock started
    start_time: Instant,

    /// Allowed duration
    limit: Duration,
}

impl Deadline {
    /// Start a deadline `limit` from now
    pub fn after(limit: Duration) -> Self {
        Self {
            start_time: Instant::now(),
            limit,
        }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Time since the clock started
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns true once the limit has passed
    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.limit
    }

    /// Time left before expiry (zero once expired)
    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.elapsed())
    }

    /// Sleep for `interval`, but never past the deadline
    pub fn sleep(&self, interval: Duration) {
        let nap = interval.min(self.remaining());
        if !nap.is_zero() {
            std::thread::sleep(nap);
        }
    }
}

/// Human-readable duration for messages (`30 minutes`, `45 seconds`)
pub fn describe(duration: &Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        let mins = secs / 60;
        format!("{} minute{}", mins, if mins == 1 { "" } else { "s" })
    } else if secs >= 1 {
        format!("{} second{}", secs, if secs == 1 { "" } else { "s" })
    } else {
        format!("{}ms", duration.as_millis())
    }
}
