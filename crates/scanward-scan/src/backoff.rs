//! Exponential backoff under sustained engine unavailability.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use scanward_core::ScanConfig;

/// Largest exponent applied to the base delay.
const MAX_EXPONENT: u32 = 16;

/// Backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay once the threshold is reached.
    pub base: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
    /// Consecutive unavailability results tolerated without delay.
    pub threshold: u32,
}

impl BackoffPolicy {
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            base: config.backoff_base,
            max: config.backoff_max,
            threshold: config.unavailable_threshold,
        }
    }

    /// Delay to apply after `consecutive` unavailability results.
    pub fn delay_for(&self, consecutive: u32) -> Option<Duration> {
        if consecutive == 0 || consecutive < self.threshold {
            return None;
        }
        let exponent = (consecutive - self.threshold).min(MAX_EXPONENT);
        Some(self.base.saturating_mul(1 << exponent).min(self.max))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&ScanConfig::default())
    }
}

/// Shared unavailability tracker consulted by every pool worker.
#[derive(Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    consecutive: AtomicU32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            consecutive: AtomicU32::new(0),
        }
    }

    /// Record an `EngineUnavailable` result.
    pub fn record_unavailable(&self) {
        let count = self.consecutive.fetch_add(1, Ordering::Relaxed) + 1;
        if count == self.policy.threshold.max(1) {
            tracing::warn!(consecutive = count, "engine unavailable, backing off");
        }
    }

    /// Record any result that proves the engine reachable.
    pub fn record_available(&self) {
        let previous = self.consecutive.swap(0, Ordering::Relaxed);
        if previous >= self.policy.threshold.max(1) {
            tracing::info!(after = previous, "engine reachable again");
        }
    }

    /// Delay the next invocation should wait, if any.
    pub fn current_delay(&self) -> Option<Duration> {
        self.policy
            .delay_for(self.consecutive.load(Ordering::Relaxed))
    }

    /// Sleep for the current delay. Returns early when `token` is cancelled.
    pub async fn wait(&self, token: &CancellationToken) {
        let Some(delay) = self.current_delay() else {
            return;
        };
        tracing::debug!(delay_ms = delay.as_millis() as u64, "backoff before invocation");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = token.cancelled() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(100),
            max: Duration::from_millis(1000),
            threshold: 2,
        }
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = policy();
        assert_eq!(policy.delay_for(0), None);
        assert_eq!(policy.delay_for(1), None);
        assert_eq!(policy.delay_for(2), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for(3), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_for(5), Some(Duration::from_millis(800)));
        assert_eq!(policy.delay_for(6), Some(Duration::from_millis(1000)));
        assert_eq!(policy.delay_for(u32::MAX), Some(Duration::from_millis(1000)));
    }

    #[test]
    fn test_success_resets() {
        let backoff = Backoff::new(policy());
        backoff.record_unavailable();
        backoff.record_unavailable();
        assert!(backoff.current_delay().is_some());

        backoff.record_available();
        assert_eq!(backoff.current_delay(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_returns_on_cancel() {
        let backoff = Backoff::new(BackoffPolicy {
            base: Duration::from_secs(3600),
            max: Duration::from_secs(3600),
            threshold: 1,
        });
        backoff.record_unavailable();

        let token = CancellationToken::new();
        token.cancel();
        let started = tokio::time::Instant::now();
        backoff.wait(&token).await;
        assert!(started.elapsed() < Duration::from_secs(3600));
    }
}
