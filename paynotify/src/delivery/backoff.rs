//! Exponential backoff with jitter for webhook retries.

use std::time::Duration;

use rand::prelude::RngExt;
use rand::rng;

use crate::config::DeliveryConfig;

/// How long to wait between delivery attempts, and when to stop.
///
/// The wait before retry `n` (0-based) is `initial_interval * multiplier^n`, capped at
/// `max_interval`, then scaled by a random factor in
/// `[1 - randomization_factor, 1 + randomization_factor]`.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub randomization_factor: f64,
    pub max_interval: Duration,
    /// Attempts including the first one.
    pub max_attempts: u32,
    /// Ceiling on the whole sequence, measured from the first attempt.
    pub max_elapsed: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            multiplier: 1.5,
            randomization_factor: 0.5,
            max_interval: Duration::from_secs(60),
            max_attempts: 5,
            max_elapsed: Duration::from_secs(300),
        }
    }
}

impl From<&DeliveryConfig> for BackoffPolicy {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            initial_interval: Duration::from_millis(config.initial_interval_ms),
            multiplier: config.multiplier,
            randomization_factor: config.randomization_factor,
            max_interval: Duration::from_millis(config.max_interval_ms),
            max_attempts: config.max_attempts,
            max_elapsed: Duration::from_secs(config.max_elapsed_secs),
        }
    }
}

impl BackoffPolicy {
    /// Un-jittered wait before retry `retry` (0 is the wait after the first failure).
    pub fn base_interval(&self, retry: u32) -> Duration {
        let max = self.max_interval.as_secs_f64();
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.initial_interval.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= max {
            return self.max_interval;
        }
        Duration::from_secs_f64(secs)
    }

    /// Jittered wait before retry `retry`.
    pub fn next_delay(&self, retry: u32) -> Duration {
        let base = self.base_interval(retry).as_secs_f64();
        if self.randomization_factor.is_nan() || self.randomization_factor <= 0.0 {
            return Duration::from_secs_f64(base);
        }
        let delta = base * self.randomization_factor;
        // Factors above 1.0 would reach below zero
        let low = (base - delta).max(0.0);
        Duration::from_secs_f64(rng().random_range(low..=(base + delta)))
    }

    /// Whether another attempt may follow attempt number `attempts` (1-based) when the next one
    /// would start after `elapsed + delay`.
    pub fn allows_retry(&self, attempts: u32, elapsed: Duration, delay: Duration) -> bool {
        attempts < self.max_attempts && elapsed.saturating_add(delay) <= self.max_elapsed
    }
}
