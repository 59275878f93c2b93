//! Configuration for the sync engine.

use rand::Rng;
use std::time::Duration;
use versync_protocol::RecordType;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Number of items reconciled concurrently in one batch.
    pub batch_size: usize,
    /// Pause between two batches of a full pass.
    pub batch_delay: Duration,
    /// Retry configuration for failed items.
    pub retry: RetryConfig,
    /// Wait after coming online or returning to the foreground before a full pass.
    pub settle_delay: Duration,
    /// Wait after a local mutation before its eager single-item sync.
    pub eager_delay: Duration,
    /// Period of the background full pass.
    pub sync_interval: Duration,
    /// Upper bound for the final sync on shutdown.
    pub teardown_timeout: Duration,
}

impl SyncConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            batch_size: 10,
            batch_delay: Duration::from_millis(500),
            retry: RetryConfig::default(),
            settle_delay: Duration::from_secs(2),
            eager_delay: Duration::from_secs(1),
            sync_interval: Duration::from_secs(5 * 60),
            teardown_timeout: Duration::from_secs(3),
        }
    }

    /// Sets the batch size. Zero is treated as one.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Sets the pause between batches.
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the settle delay applied to connectivity triggers.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Sets the eager sync delay applied to local mutations.
    pub fn with_eager_delay(mut self, delay: Duration) -> Self {
        self.eager_delay = delay;
        self
    }

    /// Sets the background sync interval.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the shutdown timeout.
    pub fn with_teardown_timeout(mut self, timeout: Duration) -> Self {
        self.teardown_timeout = timeout;
        self
    }

    /// Default options for a full pass under this configuration.
    pub fn default_options(&self) -> SyncOptions {
        SyncOptions {
            batch_size: self.batch_size,
            max_retries: self.retry.max_attempts,
            ..SyncOptions::default()
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of consecutive failed attempts per item.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            add_jitter: false,
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
    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.add_jitter = enabled;
        self
    }

    /// Calculates the delay before retrying after the given number of
    /// consecutive failures. Zero failures means no delay.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Up to 25% on top.
            let jitter = delay_secs * 0.25 * rand::thread_rng().gen::<f64>();
            Duration::from_secs_f64(delay_secs + jitter)
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

/// Options for one full sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Consider every non-conflicted item, not just pending and failed ones.
    pub force_all: bool,
    /// Restrict the pass to these record types. Empty means all types.
    pub types: Vec<RecordType>,
    /// Items reconciled concurrently per batch.
    pub batch_size: usize,
    /// Consecutive failures after which an item stops being retried.
    pub max_retries: u32,
}

impl SyncOptions {
    /// Options that consider every non-conflicted item.
    pub fn forced() -> Self {
        Self {
            force_all: true,
            ..Self::default()
        }
    }

    /// Restricts the pass to the given record types.
    pub fn with_types(mut self, types: impl IntoIterator<Item = RecordType>) -> Self {
        self.types = types.into_iter().collect();
        self
    }

    /// Sets the batch size. Zero is treated as one.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Sets the retry bound.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Returns true if items of the given type take part in the pass.
    pub fn includes(&self, record_type: RecordType) -> bool {
        self.types.is_empty() || self.types.contains(&record_type)
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            force_all: false,
            types: Vec::new(),
            batch_size: 10,
            max_retries: 3,
        }
    }
}
