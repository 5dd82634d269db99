//! Configuration for the sync client.

use notesync_core::{ClientId, EntityKind};
use std::time::Duration;

/// Configuration of a [`crate::SyncEngine`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Identity stamped on every pushed change.
    pub client_id: ClientId,
    /// Entries requested per pull page.
    pub page_size: usize,
    /// Maximum changes per push batch.
    pub push_batch_size: usize,
    /// Restrict pulls to these kinds; `None` pulls everything.
    pub entity_kinds: Option<Vec<EntityKind>>,
    /// Retry configuration.
    pub retry: RetryConfig,
}

impl ClientConfig {
    /// Creates a configuration for `client_id`.
    pub fn new(client_id: impl Into<ClientId>) -> Self {
        Self {
            client_id: client_id.into(),
            page_size: 100,
            push_batch_size: 100,
            entity_kinds: None,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the pull page size.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    /// Sets the push batch size.
    pub fn with_push_batch_size(mut self, size: usize) -> Self {
        self.push_batch_size = size;
        self
    }

    /// Restricts pulls to `kinds`.
    pub fn with_entity_kinds(mut self, kinds: Vec<EntityKind>) -> Self {
        self.entity_kinds = Some(kinds);
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound of any delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% jitter.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a configuration with `max_attempts` attempts.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// Delay before attempt `attempt` (0-indexed; attempt 0 has none).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let delay_secs = base.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            Duration::from_secs_f64(delay_secs + delay_secs * 0.25 * jitter_fraction())
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// A fraction in `[0, 1)` taken from the clock's sub-second nanos.
fn jitter_fraction() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_config_builder() {
        let config = ClientConfig::new("phone")
            .with_page_size(25)
            .with_push_batch_size(10)
            .with_entity_kinds(vec![EntityKind::Note]);
        assert_eq!(config.client_id.as_str(), "phone");
        assert_eq!(config.page_size, 25);
        assert_eq!(config.push_batch_size, 10);
        assert_eq!(config.entity_kinds, Some(vec![EntityKind::Note]));
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn retry_delay_grows_exponentially() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_jitter(false);
        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn retry_delay_jitter_is_bounded() {
        let config = RetryConfig::new(5).with_initial_delay(Duration::from_millis(100));
        let delay = config.delay_for_attempt(1);
        assert!(delay >= Duration::from_millis(100));
        assert!(delay <= Duration::from_millis(125));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0);
        assert!(config.delay_for_attempt(5) <= Duration::from_millis(6250));
    }
}
