//! Periodic cache eviction.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::ResponseCache;

/// Default time between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Drops expired entries from the response cache on a fixed interval.
pub struct CacheSweeper {
    cache: Arc<ResponseCache>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl CacheSweeper {
    pub fn new(cache: Arc<ResponseCache>) -> Self {
        Self {
            cache,
            interval: DEFAULT_SWEEP_INTERVAL,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Sweep once and return the number of entries removed.
    pub fn sweep_now(&self) -> usize {
        let removed = self.cache.sweep(Instant::now());
        if removed > 0 {
            info!(
                removed,
                cache_size = self.cache.len(),
                "Cleaned expired cache entries"
            );
        }
        removed
    }

    /// Run until the shutdown token is cancelled.
    ///
    /// The first sweep happens one full interval after start.
    pub async fn run(self) {
        debug!(
            interval_ms = self.interval.as_millis() as u64,
            ttl_ms = self.cache.ttl().as_millis() as u64,
            "Cache sweeper started"
        );

        let start = tokio::time::Instant::now() + self.interval;
        let mut interval = tokio::time::interval_at(start, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!("Cache sweeper shutting down");
                    break;
                }
                _ = interval.tick() => {
                    self.sweep_now();
                }
            }
        }
    }
}
