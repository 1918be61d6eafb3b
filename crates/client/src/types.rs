//! Cache options and result types.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Backoff strategy between fetch retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Exponential backoff: base * 2^(attempt - 1)
    #[default]
    Exponential,
    /// Linear backoff: base * attempt
    Linear,
}

/// Delay schedule for retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backoff {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            strategy: BackoffStrategy::Exponential,
        }
    }
}

impl Backoff {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    /// Delay before retry number `attempt` (1-indexed), capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => {
                let factor = 2u32.saturating_pow(attempt - 1);
                self.base_delay.saturating_mul(factor)
            }
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt),
        };
        delay.min(self.max_delay)
    }
}

/// Per-query cache behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// How long a fetched value counts as fresh.
    pub freshness_window: Duration,
    /// How long an unused entry is kept before eviction.
    pub retention_window: Duration,
    /// Retries after the first failed attempt.
    pub retry_count: u32,
    pub backoff: Backoff,
    /// Whether `on_focus` marks the entry stale.
    pub refetch_on_focus: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            freshness_window: Duration::from_secs(5 * 60),
            retention_window: Duration::from_secs(10 * 60),
            retry_count: 1,
            backoff: Backoff::default(),
            refetch_on_focus: false,
        }
    }
}

impl QueryOptions {
    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    pub fn with_retention_window(mut self, window: Duration) -> Self {
        self.retention_window = window;
        self
    }

    pub fn with_retry(mut self, retry_count: u32, backoff: Backoff) -> Self {
        self.retry_count = retry_count;
        self.backoff = backoff;
        self
    }

    pub fn with_refetch_on_focus(mut self, refetch: bool) -> Self {
        self.refetch_on_focus = refetch;
        self
    }
}

/// Freshness of a cached entry as seen by a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    /// Within the freshness window.
    Fresh,
    /// Servable, but due for a refresh.
    Stale,
    /// A fetch is in flight.
    Refreshing,
    /// The last fetch failed after all retries.
    Error,
}

/// Snapshot of a cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedQueryResult<T> {
    pub key: String,
    /// Last successfully fetched value, kept across failures.
    pub value: Option<T>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub state: CacheState,
    pub error: Option<String>,
}

impl<T> CachedQueryResult<T> {
    /// No value yet and a fetch is running.
    pub fn is_loading(&self) -> bool {
        self.value.is_none() && self.state == CacheState::Refreshing
    }
}
