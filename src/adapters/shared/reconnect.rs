//! Reconnection backoff policy
//!
//! Exponential backoff with symmetric jitter so that many connections
//! dropped at once do not all come back on the same tick.

use std::time::Duration;

use rand::Rng;

/// Backoff configuration for automatic reconnection
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first reconnect attempt
    pub min_delay: Duration,
    /// Cap on the un-jittered delay
    pub max_delay: Duration,
    /// Growth factor applied per attempt
    pub factor: f64,
    /// Fraction of the delay used as +/- jitter amplitude (0.0 disables)
    pub jitter: f64,
    /// Give up after this many attempts (`None` retries forever)
    pub max_attempts: Option<u32>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(30),
            factor: 1.6,
            jitter: 0.2,
            max_attempts: None,
        }
    }
}

impl BackoffPolicy {
    /// Un-jittered delay for a 1-based attempt number:
    /// `min(min_delay * factor^(attempt-1), max_delay)`
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let min_ms = self.min_delay.as_secs_f64() * 1000.0;
        let max_ms = self.max_delay.as_secs_f64() * 1000.0;
        let raw = min_ms * self.factor.max(1.0).powi(exponent);
        let capped = if raw.is_finite() { raw.min(max_ms) } else { max_ms };
        millis_to_duration(capped)
    }

    /// Apply jitter to a base delay given a sample in `[-1, 1]`.
    ///
    /// Result is `base + base * jitter * sample`, floored at zero.
    pub fn jittered(&self, base: Duration, sample: f64) -> Duration {
        let base_ms = base.as_secs_f64() * 1000.0;
        let offset = base_ms * self.jitter.max(0.0) * sample.clamp(-1.0, 1.0);
        millis_to_duration(base_ms + offset)
    }

    /// Delay to wait before the given 1-based attempt, with random jitter
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter <= 0.0 {
            return base;
        }
        let sample = rand::thread_rng().gen_range(-1.0..=1.0);
        self.jittered(base, sample)
    }

    /// Whether the given 1-based attempt exceeds the configured limit
    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempt > max)
    }
}

/// Fractional milliseconds to a Duration, rounded to the microsecond
fn millis_to_duration(ms: f64) -> Duration {
    Duration::from_micros((ms.max(0.0) * 1000.0).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy {
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            factor: 2.0,
            jitter: 0.0,
            max_attempts: Some(3),
        }
    }

    #[test]
    fn test_backoff_defaults() {
        let p = BackoffPolicy::default();
        assert_eq!(p.min_delay, Duration::from_millis(300));
        assert_eq!(p.max_delay, Duration::from_secs(30));
        assert_eq!(p.factor, 1.6);
        assert_eq!(p.jitter, 0.2);
        assert!(p.max_attempts.is_none());
    }

    #[test]
    fn test_base_delay_grows_then_caps() {
        let p = policy();
        assert_eq!(p.base_delay(1), Duration::from_millis(100));
        assert_eq!(p.base_delay(2), Duration::from_millis(200));
        assert_eq!(p.base_delay(4), Duration::from_millis(800));
        assert_eq!(p.base_delay(5), Duration::from_millis(1000));
        assert_eq!(p.base_delay(500), Duration::from_millis(1000));
    }

    #[test]
    fn test_default_policy_sequence() {
        // 300, 480, 768 ms
        let p = BackoffPolicy::default();
        assert_eq!(p.base_delay(1).as_millis(), 300);
        assert_eq!(p.base_delay(2).as_millis(), 480);
        assert_eq!(p.base_delay(3).as_millis(), 768);
    }

    #[test]
    fn test_jitter_bounds() {
        let p = BackoffPolicy {
            jitter: 0.2,
            ..policy()
        };
        let base = Duration::from_millis(1000);
        assert_eq!(p.jittered(base, 1.0).as_millis(), 1200);
        assert_eq!(p.jittered(base, -1.0).as_millis(), 800);
        assert_eq!(p.jittered(base, 0.0).as_millis(), 1000);
    }

    #[test]
    fn test_jitter_never_negative() {
        let p = BackoffPolicy {
            jitter: 5.0,
            ..policy()
        };
        assert_eq!(p.jittered(Duration::from_millis(100), -1.0), Duration::ZERO);
    }

    #[test]
    fn test_exhausted() {
        let p = policy();
        assert!(!p.exhausted(3));
        assert!(p.exhausted(4));
        assert!(!BackoffPolicy::default().exhausted(u32::MAX));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn next_delay_within_jitter_band(attempt in 1u32..40) {
                let p = BackoffPolicy::default();
                let base = p.base_delay(attempt).as_secs_f64();
                let delay = p.next_delay(attempt).as_secs_f64();
                prop_assert!(delay >= base * 0.8 - 1e-6);
                prop_assert!(delay <= base * 1.2 + 1e-6);
                prop_assert!(base <= p.max_delay.as_secs_f64() + 1e-6);
            }
        }
    }
}
