use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OverlayError, OverlayResult};

/// Capped exponential backoff for container discovery.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MountPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for MountPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl MountPolicy {
    pub fn validate(self) -> OverlayResult<()> {
        if self.max_attempts == 0 {
            return Err(OverlayError::InvalidData(
                "mount policy needs at least one attempt".to_owned(),
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(OverlayError::InvalidData(
                "mount backoff multiplier must be finite and >= 1".to_owned(),
            ));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(OverlayError::InvalidData(
                "mount max delay must be >= initial delay".to_owned(),
            ));
        }
        Ok(())
    }

    /// Delay before attempt `failed_attempts + 1`.
    #[must_use]
    pub fn delay_after(self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(64) as i32;
        let delay = self.initial_delay_ms as f64 * self.multiplier.powi(exponent);
        let capped = if delay.is_finite() {
            delay.min(self.max_delay_ms as f64)
        } else {
            self.max_delay_ms as f64
        };
        Duration::from_millis(capped.max(0.0) as u64)
    }

    #[must_use]
    pub fn has_attempts_left(self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Upper bound on the time spent retrying before a mount is abandoned.
    #[must_use]
    pub fn total_budget(self) -> Duration {
        (1..self.max_attempts).map(|attempt| self.delay_after(attempt)).sum()
    }
}

fn default_max_attempts() -> u32 {
    8
}

fn default_initial_delay_ms() -> u64 {
    50
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    2_000
}
