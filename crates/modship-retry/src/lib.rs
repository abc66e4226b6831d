//! Backoff schedule for modship publish attempts.
//!
//! The delay depends only on the attempt number, counted per whole publish
//! iteration (not per platform). The default exponential schedule is
//! `base * 2^(attempt-1)`; an optional cap and jitter can be layered on top,
//! but neither is active unless configured.
//!
//! # Example
//!
//! ```
//! use modship_retry::{BackoffConfig, backoff_delay};
//! use std::time::Duration;
//!
//! let config = BackoffConfig::exponential(Duration::from_secs(5));
//! assert_eq!(backoff_delay(&config, 1), Duration::from_secs(5));
//! assert_eq!(backoff_delay(&config, 4), Duration::from_secs(40));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default number of publish attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default base backoff interval.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(5);

/// Strategy type for the delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Delay doubles each attempt (default)
    #[default]
    Exponential,
    /// Same delay every attempt
    Constant,
    /// No delay at all
    Immediate,
}

/// Configuration for the backoff schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Strategy type for calculating the delay.
    #[serde(default)]
    pub strategy: BackoffStrategy,
    /// Maximum number of publish attempts.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay for backoff calculations.
    #[serde(default = "default_base_delay", with = "humantime_serde")]
    pub base_delay: Duration,
    /// Optional cap on a single delay; unbounded when absent.
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub max_delay: Option<Duration>,
    /// Jitter factor for randomized delays (0.0 = none, 1.0 = full).
    #[serde(default)]
    pub jitter: f64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_base_delay() -> Duration {
    DEFAULT_BASE_DELAY
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: None,
            jitter: 0.0,
        }
    }
}

impl BackoffConfig {
    /// Plain exponential schedule with the given base and default attempt budget.
    pub fn exponential(base_delay: Duration) -> Self {
        Self {
            base_delay,
            ..Self::default()
        }
    }

    /// Delay used when no artifact could be selected: one base interval.
    pub fn base_interval(&self) -> Duration {
        match self.strategy {
            BackoffStrategy::Immediate => Duration::ZERO,
            _ => self.base_delay,
        }
    }
}

/// Calculate the delay to sleep after a transient failure in `attempt` (1-indexed).
///
/// # Example
///
/// ```
/// use modship_retry::{BackoffConfig, BackoffStrategy, backoff_delay};
/// use std::time::Duration;
///
/// let config = BackoffConfig {
///     strategy: BackoffStrategy::Constant,
///     base_delay: Duration::from_secs(3),
///     ..Default::default()
/// };
///
/// assert_eq!(backoff_delay(&config, 7), Duration::from_secs(3));
/// ```
pub fn backoff_delay(config: &BackoffConfig, attempt: u32) -> Duration {
    let delay = match config.strategy {
        BackoffStrategy::Immediate => Duration::ZERO,
        BackoffStrategy::Exponential => doubled(config.base_delay, attempt.saturating_sub(1)),
        BackoffStrategy::Constant => config.base_delay,
    };

    let capped = match config.max_delay {
        Some(max) => delay.min(max),
        None => delay,
    };

    if config.jitter > 0.0 {
        apply_jitter(capped, config.jitter)
    } else {
        capped
    }
}

/// `base * 2^pow`, saturating at [`Duration::MAX`].
fn doubled(base: Duration, pow: u32) -> Duration {
    const NANOS_PER_SEC: u128 = 1_000_000_000;

    let nanos = base.as_nanos();
    if nanos == 0 {
        return Duration::ZERO;
    }
    if pow >= nanos.leading_zeros() {
        return Duration::MAX;
    }
    let scaled = nanos << pow;
    match u64::try_from(scaled / NANOS_PER_SEC) {
        Ok(secs) => Duration::new(secs, (scaled % NANOS_PER_SEC) as u32),
        Err(_) => Duration::MAX,
    }
}

/// Sum of the delays for attempts `1..=attempts`, ignoring jitter.
pub fn total_backoff(config: &BackoffConfig, attempts: u32) -> Duration {
    let deterministic = BackoffConfig {
        jitter: 0.0,
        ..config.clone()
    };
    (1..=attempts).fold(Duration::ZERO, |acc, n| {
        acc.saturating_add(backoff_delay(&deterministic, n))
    })
}

/// Jitter factor of 0.5 means delay * (0.5 to 1.5).
fn apply_jitter(delay: Duration, jitter: f64) -> Duration {
    let jitter = jitter.clamp(0.0, 1.0);
    let random_value: f64 = rand::random::<f64>();
    let random_factor = 1.0 - jitter + (random_value * 2.0 * jitter);
    let millis = (delay.as_millis() as f64 * random_factor).round() as u64;
    Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn exp(base_secs: u64) -> BackoffConfig {
        BackoffConfig::exponential(Duration::from_secs(base_secs))
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = BackoffConfig::default();
        assert_eq!(config.strategy, BackoffStrategy::Exponential);
        assert_eq!(config.max_attempts, 10);
        assert_eq!(config.base_delay, Duration::from_secs(5));
        assert_eq!(config.max_delay, None);
        assert_eq!(config.jitter, 0.0);
    }

    #[test]
    fn exponential_doubles_per_attempt() {
        let config = exp(5);
        let delays: Vec<u64> = (1..=4)
            .map(|n| backoff_delay(&config, n).as_secs())
            .collect();
        assert_eq!(delays, vec![5, 10, 20, 40]);
    }

    #[test]
    fn doubling_continues_past_thirty_two_attempts() {
        let config = BackoffConfig::exponential(Duration::from_millis(1));
        assert_eq!(backoff_delay(&config, 33), Duration::from_millis(1 << 32));
        assert_eq!(backoff_delay(&config, 40), Duration::from_millis(1 << 39));
        assert!(backoff_delay(&config, 34) > backoff_delay(&config, 33));
    }

    #[test]
    fn huge_attempt_numbers_saturate() {
        assert_eq!(backoff_delay(&exp(5), 200), Duration::MAX);
        assert_eq!(backoff_delay(&exp(5), u32::MAX), Duration::MAX);
        assert_eq!(backoff_delay(&exp(0), 200), Duration::ZERO);
    }

    #[test]
    fn attempt_zero_is_treated_as_first() {
        assert_eq!(backoff_delay(&exp(5), 0), Duration::from_secs(5));
    }

    #[test]
    fn max_delay_caps_when_configured() {
        let config = BackoffConfig {
            max_delay: Some(Duration::from_secs(30)),
            ..exp(10)
        };
        assert_eq!(backoff_delay(&config, 1), Duration::from_secs(10));
        assert_eq!(backoff_delay(&config, 2), Duration::from_secs(20));
        assert_eq!(backoff_delay(&config, 3), Duration::from_secs(30));
        assert_eq!(backoff_delay(&config, 10), Duration::from_secs(30));
    }

    #[test]
    fn constant_and_immediate() {
        let constant = BackoffConfig {
            strategy: BackoffStrategy::Constant,
            ..exp(2)
        };
        assert_eq!(backoff_delay(&constant, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(&constant, 9), Duration::from_secs(2));

        let immediate = BackoffConfig {
            strategy: BackoffStrategy::Immediate,
            ..exp(2)
        };
        assert_eq!(backoff_delay(&immediate, 3), Duration::ZERO);
        assert_eq!(immediate.base_interval(), Duration::ZERO);
    }

    #[test]
    fn total_backoff_sums_schedule() {
        assert_eq!(total_backoff(&exp(5), 3), Duration::from_secs(5 * (1 + 2 + 4)));
        assert_eq!(total_backoff(&exp(5), 0), Duration::ZERO);
    }

    #[test]
    fn jitter_stays_within_band() {
        let config = BackoffConfig {
            strategy: BackoffStrategy::Constant,
            jitter: 0.5,
            ..exp(10)
        };

        for _ in 0..100 {
            let delay = backoff_delay(&config, 1);
            assert!(delay >= Duration::from_millis(5000));
            assert!(delay <= Duration::from_millis(15000));
        }
    }

    #[test]
    fn deserializes_humantime_durations() {
        let config: BackoffConfig =
            serde_json::from_str(r#"{"base_delay":"2s","max_delay":"1m","max_attempts":3}"#)
                .expect("parse");
        assert_eq!(config.base_delay, Duration::from_secs(2));
        assert_eq!(config.max_delay, Some(Duration::from_secs(60)));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.strategy, BackoffStrategy::Exponential);
    }

    proptest! {
        #[test]
        fn exponential_matches_closed_form(base in 1u64..60, attempt in 1u32..12) {
            let delay = backoff_delay(&exp(base), attempt);
            prop_assert_eq!(delay, Duration::from_secs(base * 2u64.pow(attempt - 1)));
        }

        #[test]
        fn schedule_is_monotonic(base in 1u64..60, attempt in 1u32..40) {
            let config = exp(base);
            prop_assert!(backoff_delay(&config, attempt) <= backoff_delay(&config, attempt + 1));
        }
    }
}
