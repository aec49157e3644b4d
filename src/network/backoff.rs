//! Reconnect delay policy.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded reconnect schedule
///
/// `delay(n)` is `initial * multiplier^n` capped at `max`. A multiplier of
/// 1.0 gives a fixed delay. After `max_attempts` consecutive failures the
/// policy gives up and the client reports the failure instead of retrying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// First delay, in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound on any delay, in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Growth factor per consecutive failure
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Consecutive failures before giving up (0 = retry forever)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_initial_delay_ms() -> u64 {
    5_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_multiplier() -> f64 {
    1.0
}

fn default_max_attempts() -> u32 {
    10
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl BackoffPolicy {
    /// Capped doubling starting at `initial`.
    pub fn exponential(initial: Duration, max: Duration, max_attempts: u32) -> Self {
        BackoffPolicy {
            initial_delay_ms: initial.as_millis() as u64,
            max_delay_ms: max.as_millis() as u64,
            multiplier: 2.0,
            max_attempts,
        }
    }

    /// Same delay every time.
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        BackoffPolicy {
            initial_delay_ms: delay.as_millis() as u64,
            max_delay_ms: delay.as_millis() as u64,
            multiplier: 1.0,
            max_attempts,
        }
    }

    /// Delay before retry number `attempt` (0-based), or `None` when the
    /// attempt budget is spent.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if self.max_attempts != 0 && attempt >= self.max_attempts {
            return None;
        }

        let factor = self.multiplier.max(1.0).powi(attempt.min(64) as i32);
        let millis = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Some(Duration::from_millis(millis as u64))
    }
}

/// Tracks consecutive failures against a policy.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Backoff { policy, attempt: 0 }
    }

    /// Delay before the next attempt; advances the failure count.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let delay = self.policy.delay(self.attempt)?;
        self.attempt += 1;
        Some(delay)
    }

    /// Called once a connection made it through the handshake.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_fixed_five_seconds_ten_attempts() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay(0), Some(Duration::from_secs(5)));
        assert_eq!(policy.delay(9), Some(Duration::from_secs(5)));
        assert_eq!(policy.delay(10), None);
    }

    #[test]
    fn exponential_is_capped() {
        let policy =
            BackoffPolicy::exponential(Duration::from_secs(1), Duration::from_secs(30), 0);
        let delays: Vec<_> = (0..7).map(|n| policy.delay(n).unwrap().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
        assert!(policy.delay(10_000).is_some());
    }

    #[test]
    fn backoff_counts_and_resets() {
        let mut backoff = Backoff::new(BackoffPolicy::fixed(Duration::from_millis(10), 2));
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());
        assert_eq!(backoff.attempts(), 2);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(10)));
    }

    #[test]
    fn deserializes_with_defaults() {
        let policy: BackoffPolicy = toml::from_str("multiplier = 2.0").unwrap();
        assert_eq!(policy.multiplier, 2.0);
        assert_eq!(policy.initial_delay_ms, 5_000);
        assert_eq!(policy.max_attempts, 10);
    }
}
