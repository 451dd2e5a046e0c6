//! Retry policy with exponential backoff for background calculations.

use configuration::WorkerSettings;
use std::time::Duration;

/// Delay strategy between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed {
        delay: Duration,
    },
    /// `base * factor^retry`, capped at `max`.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
    },
}

impl Backoff {
    /// Delay before retry number `retry` (0-based).
    pub fn delay(self, retry: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential { base, factor, max } => {
                let scale = factor.powi(retry.min(i32::MAX as u32) as i32);
                let seconds = (base.as_secs_f64() * scale).min(max.as_secs_f64()).max(0.0);
                Duration::from_secs_f64(seconds)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn from_settings(settings: &WorkerSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            backoff: Backoff::Exponential {
                base: Duration::from_secs(settings.backoff_base_secs),
                factor: settings.backoff_factor,
                max: Duration::from_secs(settings.backoff_max_secs),
            },
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            backoff: Backoff::Fixed { delay: Duration::ZERO },
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        self.backoff.delay(retry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule_doubles_from_a_minute() {
        let policy = RetryPolicy::from_settings(&WorkerSettings::default());
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.delay_for_retry(0), Duration::from_secs(60));
        assert_eq!(policy.delay_for_retry(1), Duration::from_secs(120));
        assert_eq!(policy.delay_for_retry(2), Duration::from_secs(240));
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_secs(1),
        };
        assert_eq!(backoff.delay(3), Duration::from_millis(800));
        assert_eq!(backoff.delay(4), Duration::from_secs(1));
        assert_eq!(backoff.delay(60), Duration::from_secs(1));
    }

    #[test]
    fn test_fixed_backoff() {
        let backoff = Backoff::Fixed {
            delay: Duration::from_millis(5),
        };
        assert_eq!(backoff.delay(0), backoff.delay(9));
        assert_eq!(RetryPolicy::no_retry().max_attempts(), 1);
    }
}
