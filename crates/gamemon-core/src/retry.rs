//! Retry policies for reconnecting transports.

use std::time::Duration;

/// Decides whether and when to try again after a failed attempt
pub trait RetryStrategy {
    /// Delay before attempt `attempt + 1`, or `None` to give up.
    /// `attempt` counts failed attempts so far, starting at 1.
    fn next_delay(&mut self, attempt: u32) -> Option<Duration>;
}

/// Same delay between every attempt, optionally capped
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl FixedDelay {
    /// Retry forever
    pub fn forever(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    /// Give up after `max_attempts` failed attempts
    pub fn limited(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts: Some(max_attempts),
        }
    }
}

impl RetryStrategy for FixedDelay {
    fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
        match self.max_attempts {
            Some(max) if attempt >= max => None,
            _ => Some(self.delay),
        }
    }
}
