use std::time::Duration;

use crate::config::TransferSettings;

/// Bounded retry schedule for transfer jobs.
///
/// Attempt `n` (1-based) that fails transiently is followed by
/// `initial_backoff * multiplier^(n-1)`, capped at `max_backoff`, unless
/// `n` already equals `max_attempts`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }
        let factor = self.multiplier.max(1.0).powi(attempt as i32 - 1);
        let delay = self.initial_backoff.mul_f64(factor);
        Some(delay.min(self.max_backoff))
    }

    /// Every delay the policy would wait through, in order.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts)
            .filter_map(|attempt| self.delay_after(attempt))
            .collect()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&TransferSettings::default())
    }
}

impl From<&TransferSettings> for RetryPolicy {
    fn from(settings: &TransferSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            multiplier: settings.backoff_multiplier,
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(
            policy.schedule(),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
        assert_eq!(policy.delay_after(3), None);
    }

    #[test]
    fn delays_are_capped() {
        let policy = RetryPolicy {
            max_attempts: 6,
            initial_backoff: Duration::from_secs(10),
            multiplier: 3.0,
            max_backoff: Duration::from_secs(45),
        };
        assert_eq!(
            policy.schedule(),
            vec![
                Duration::from_secs(10),
                Duration::from_secs(30),
                Duration::from_secs(45),
                Duration::from_secs(45),
                Duration::from_secs(45),
            ]
        );
    }

    #[test]
    fn single_attempt_never_retries() {
        assert!(RetryPolicy::none().schedule().is_empty());
        assert_eq!(RetryPolicy::none().delay_after(1), None);
    }

    #[test]
    fn zero_attempts_from_settings_still_runs_once() {
        let settings = TransferSettings {
            max_attempts: 0,
            ..TransferSettings::default()
        };
        assert_eq!(RetryPolicy::from(&settings).max_attempts, 1);
    }
}
