//! Exponential backoff with a ceiling and optional proportional jitter.
//!
//! ```text
//! attempt    nominal wait (base=500ms, max=30s)
//! ─────────────────────────────────────────────
//!    1          500ms
//!    2            1s
//!    3            2s
//!    ...
//!    8+          30s (ceiling)
//! ```

use std::time::Duration;

use rand::Rng;

use crate::config::RelayConfig;

/// Retry wait schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: f64,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// Forward retry schedule from configuration.
    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.backoff_base, config.backoff_max, config.backoff_jitter)
    }

    /// Wait after failed attempt `attempt` (1-based), before jitter.
    pub fn nominal(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .saturating_mul(2_u32.saturating_pow(exponent))
            .min(self.max)
    }

    /// Wait after failed attempt `attempt`, with jitter applied and capped.
    pub fn delay(&self, attempt: u32) -> Duration {
        let nominal = self.nominal(attempt);
        if self.jitter == 0.0 {
            return nominal;
        }
        let factor: f64 = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        nominal.mul_f64(1.0 + factor).min(self.max)
    }
}
