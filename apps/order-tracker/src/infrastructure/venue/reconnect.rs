//! Reconnection Policy
//!
//! Fixed-delay, bounded-attempt reconnection for the venue stream.
//! Each consecutive failure consumes one attempt; a successful
//! connection resets the counter. Once the budget is spent the policy
//! yields no further delays and the transport gives up.

use std::time::Duration;

/// Reconnection tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Fixed wait between attempts.
    pub delay: Duration,
    /// Maximum consecutive attempts before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(3000),
            max_attempts: 5,
        }
    }
}

/// Tracks consecutive reconnection attempts against a budget.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a policy from the given configuration.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Consume one attempt and return the delay to wait before it.
    ///
    /// Returns `None` once the attempt budget is exhausted; callers
    /// must stop reconnecting at that point.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt_count >= self.config.max_attempts {
            return None;
        }
        self.attempt_count += 1;
        Some(self.config.delay)
    }

    /// Reset the attempt counter after a successful connection.
    pub fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Number of attempts consumed since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Whether the attempt budget is spent.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.attempt_count >= self.config.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(ReconnectConfig::default())
    }
}

// =============================================================================
// Tests
// =============================================================================
