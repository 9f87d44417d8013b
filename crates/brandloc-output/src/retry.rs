//! Retry with exponential backoff for artifact writes

use brandloc_core::Result;
use std::time::Duration;

/// How often and how patiently to retry a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Wait before retrying after failed attempt `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Run `op` until it succeeds or the policy is exhausted.
///
/// Returns whether the write eventually succeeded. Failures are logged,
/// never propagated. There is no wait after the final attempt.
pub fn save_with_retry<F>(label: &str, policy: &RetryPolicy, mut op: F) -> bool
where
    F: FnMut() -> Result<()>,
{
    let attempts = policy.max_attempts.max(1);
    for attempt in 0..attempts {
        match op() {
            Ok(()) => {
                if attempt > 0 {
                    tracing::info!(artifact = label, attempt = attempt + 1, "Saved after retry");
                }
                return true;
            }
            Err(e) if attempt + 1 < attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    artifact = label,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Save failed, retrying"
                );
                std::thread::sleep(delay);
            }
            Err(e) => {
                tracing::error!(
                    artifact = label,
                    attempts,
                    error = %e,
                    "Save failed, giving up"
                );
            }
        }
    }
    false
}
