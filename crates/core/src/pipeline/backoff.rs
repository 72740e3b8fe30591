//! Retry policy for step attempts.

use std::time::Duration;

use rand::Rng;

use crate::settings::Settings;

/// Upper bound of the random jitter, as a fraction of the exponential delay.
pub const MAX_JITTER: f64 = 0.3;

/// Largest exponent applied to the base delay.
const MAX_EXPONENT: u32 = 16;

/// Exponential delay `base × 2^attempt` plus uniform jitter in
/// `[0, MAX_JITTER]` of that delay.
///
/// `attempt` is the zero-based index of the attempt that just failed.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponential = base.saturating_mul(1u32 << attempt.min(MAX_EXPONENT));
    let jitter = rand::thread_rng().gen_range(0.0..=MAX_JITTER);
    exponential.saturating_add(exponential.mul_f64(jitter))
}

/// How often a step is attempted and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per step, at least one.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.max_step_attempts,
            Duration::from_millis(settings.step_base_delay_ms),
        )
    }

    /// Whether another attempt follows after `attempts` have been made.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay before the attempt after the zero-based `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        backoff_delay(self.base_delay, attempt)
    }
}
