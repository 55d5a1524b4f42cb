//! Local (in-memory) retry policy for game fetches.

use std::time::Duration;

use crate::config::PipelineConfig;

/// Retry budget for one game within one batch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalRetryPolicy {
    /// Attempts before the failure is recorded durably.
    pub max_attempts: u32,
    /// Backoff after the n-th failed attempt is `base * 2^n`.
    pub base: Duration,
}

impl Default for LocalRetryPolicy {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl LocalRetryPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_attempts: config.local_max_retries,
            base: config.backoff_base,
        }
    }

    /// Delay after `failed_attempts` failures.
    pub fn delay_for_attempt(&self, failed_attempts: u32) -> Duration {
        let factor = 1u32.checked_shl(failed_attempts).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor)
    }

    /// Check if another attempt is allowed after `failed_attempts` failures.
    pub fn should_retry(&self, failed_attempts: u32) -> bool {
        failed_attempts < self.max_attempts
    }
}
