//! # Retry policy for backend submissions.
//!
//! [`RetryPolicy`] bounds how often a backend re-submits one event before
//! giving up and reporting the failure. The core never retries; this policy
//! belongs to backends that talk to unreliable stores.
//!
//! The delay before retry `n` (0-indexed) is `first × factor^n`, clamped to
//! `max`. With `jitter` enabled the delay is drawn uniformly from
//! `[0, delay]` (full jitter). The base is derived from `n` alone, so jitter
//! never feeds back into later delays.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use loadsink::RetryPolicy;
//!
//! let retry = RetryPolicy {
//!     attempts: 4,
//!     first: Duration::from_millis(100),
//!     max: Duration::from_secs(1),
//!     factor: 2.0,
//!     jitter: false,
//! };
//!
//! assert_eq!(retry.delay(0), Duration::from_millis(100));
//! assert_eq!(retry.delay(2), Duration::from_millis(400));
//! assert_eq!(retry.delay(10), Duration::from_secs(1));
//! ```

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Deserializer};

/// Bounded exponential retry.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total submission attempts, including the first (`0` behaves like `1`).
    pub attempts: u32,
    /// Delay before the first retry.
    #[serde(rename = "first_ms", deserialize_with = "millis")]
    pub first: Duration,
    /// Cap for any single delay.
    #[serde(rename = "max_ms", deserialize_with = "millis")]
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
    /// Draw each delay uniformly from `[0, delay]`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    /// Three attempts, 200ms doubling up to 2s, with jitter.
    fn default() -> Self {
        Self {
            attempts: 3,
            first: Duration::from_millis(200),
            max: Duration::from_secs(2),
            factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that submits exactly once.
    pub fn never() -> Self {
        Self {
            attempts: 1,
            ..Self::default()
        }
    }

    /// Number of attempts, never less than one.
    pub fn max_attempts(&self) -> u32 {
        self.attempts.max(1)
    }

    /// Delay before retry `retry` (0-indexed).
    pub fn delay(&self, retry: u32) -> Duration {
        let base = self.ceiling(retry);
        if !self.jitter {
            return base;
        }
        let ms = base.as_millis() as u64;
        if ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=ms))
    }

    /// Longest [`delay`](Self::delay) can return for retry `retry`.
    pub fn ceiling(&self, retry: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = retry.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        if !secs.is_finite() || secs < 0.0 || secs > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Worst-case time for every attempt, each bounded by `per_attempt`,
    /// plus the longest sleep between them.
    pub fn budget(&self, per_attempt: Duration) -> Duration {
        let attempts = self.max_attempts();
        (0..attempts - 1).fold(per_attempt.saturating_mul(attempts), |total, retry| {
            total.saturating_add(self.ceiling(retry))
        })
    }
}

pub(crate) fn millis<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
    u64::deserialize(de).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(first_ms: u64, max_ms: u64, factor: f64) -> RetryPolicy {
        RetryPolicy {
            attempts: 5,
            first: Duration::from_millis(first_ms),
            max: Duration::from_millis(max_ms),
            factor,
            jitter: false,
        }
    }

    #[test]
    fn exponential_growth_without_jitter() {
        let p = plain(100, 30_000, 2.0);
        assert_eq!(p.delay(0), Duration::from_millis(100));
        assert_eq!(p.delay(1), Duration::from_millis(200));
        assert_eq!(p.delay(3), Duration::from_millis(800));
    }

    #[test]
    fn clamps_to_max_even_on_overflow() {
        let p = plain(100, 10_000, 2.0);
        assert_eq!(p.delay(100), Duration::from_secs(10));
        assert_eq!(p.delay(u32::MAX), Duration::from_secs(10));
        assert_eq!(plain(10_000, 5_000, 2.0).delay(0), Duration::from_secs(5));
    }

    #[test]
    fn full_jitter_stays_within_base() {
        let p = RetryPolicy {
            jitter: true,
            ..plain(1_000, 30_000, 1.0)
        };
        for retry in 0..50 {
            assert!(p.delay(retry) <= Duration::from_millis(1_000));
        }
    }

    #[test]
    fn budget_covers_every_attempt_and_the_longest_sleeps() {
        let p = RetryPolicy::default();
        assert_eq!(p.ceiling(1), Duration::from_millis(400));
        assert_eq!(
            p.budget(Duration::from_secs(10)),
            Duration::from_millis(30_600)
        );
        assert_eq!(
            RetryPolicy::never().budget(Duration::from_secs(10)),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn zero_attempts_still_submits_once() {
        let p = RetryPolicy {
            attempts: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(p.max_attempts(), 1);
        assert_eq!(RetryPolicy::never().max_attempts(), 1);
    }

    #[test]
    fn deserializes_with_millisecond_fields_and_defaults() {
        let p: RetryPolicy =
            serde_json::from_str(r#"{ "attempts": 5, "first_ms": 50, "jitter": false }"#).unwrap();
        assert_eq!(p.attempts, 5);
        assert_eq!(p.first, Duration::from_millis(50));
        assert_eq!(p.max, RetryPolicy::default().max);
        assert!(!p.jitter);
    }
}
