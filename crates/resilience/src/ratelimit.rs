//! Sliding-window rate limiter with adaptive backoff.
//!
//! Prevents API quota exhaustion for provider-bound calls. Each key (one
//! per provider/credential pair) owns a queue of request timestamps, pruned
//! lazily on every check, plus a backoff multiplier that grows on explicit
//! quota-exceeded signals and decays on success. Each key also embeds its
//! own [`CircuitBreaker`] so repeated quota errors stop a single provider
//! without touching the others.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::breaker::{CircuitBreaker, CircuitBreakerConfig};

const BACKOFF_GROWTH: f64 = 1.5;
const BACKOFF_DECAY: f64 = 0.8;
const BACKOFF_MIN: f64 = 1.0;
const BACKOFF_MAX: f64 = 10.0;
const JITTER_RANGE: std::ops::RangeInclusive<f64> = 0.8..=1.2;

struct KeyWindow {
    timestamps: VecDeque<Instant>,
    backoff_multiplier: f64,
    last_quota_hit: Option<Instant>,
    breaker: Arc<CircuitBreaker>,
}

impl KeyWindow {
    fn new(key: &str, breaker_config: CircuitBreakerConfig) -> Self {
        Self {
            timestamps: VecDeque::new(),
            backoff_multiplier: BACKOFF_MIN,
            last_quota_hit: None,
            breaker: Arc::new(CircuitBreaker::new(
                format!("rate_limit:{key}"),
                breaker_config,
            )),
        }
    }

    /// Drop timestamps that fell out of the trailing window.
    fn prune(&mut self, window: Duration) {
        let now = Instant::now();
        while let Some(oldest) = self.timestamps.front() {
            if now.duration_since(*oldest) > window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Time until the oldest recorded request leaves the window.
    fn time_until_slot(&self, window: Duration) -> Duration {
        match self.timestamps.front() {
            Some(oldest) => window.saturating_sub(oldest.elapsed()) + Duration::from_millis(100),
            None => Duration::ZERO,
        }
    }
}

/// Sliding-window admission control, one window per key.
///
/// Keys are created lazily on first use and live for the process lifetime.
pub struct RateLimiter {
    keys: Mutex<HashMap<String, KeyWindow>>,
    breaker_config: CircuitBreakerConfig,
}

impl RateLimiter {
    pub fn new(breaker_config: CircuitBreakerConfig) -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
            breaker_config,
        }
    }

    /// Check whether a request is admitted and record it if so.
    ///
    /// Only timestamps within the trailing `window` count toward the quota.
    pub async fn is_allowed(&self, key: &str, max_requests: usize, window: Duration) -> bool {
        let mut keys = self.keys.lock().await;
        let entry = self.entry(&mut keys, key);
        entry.prune(window);

        if entry.timestamps.len() < max_requests {
            entry.timestamps.push_back(Instant::now());
            true
        } else {
            false
        }
    }

    /// Sleep until a slot should be free when the quota is exhausted.
    ///
    /// The wait is `base * multiplier * jitter`: `base` is the time until
    /// the oldest request expires, the multiplier reflects recent quota
    /// pressure, and the jitter (uniform in [0.8, 1.2]) de-synchronizes
    /// concurrent retries. Returns the duration actually slept, if any.
    pub async fn wait_if_needed(
        &self,
        key: &str,
        max_requests: usize,
        window: Duration,
    ) -> Option<Duration> {
        if self.is_allowed(key, max_requests, window).await {
            return None;
        }

        let wait = {
            let mut keys = self.keys.lock().await;
            let entry = self.entry(&mut keys, key);
            let base = entry.time_until_slot(window);
            let jitter: f64 = rand::rng().random_range(JITTER_RANGE);
            base.mul_f64(entry.backoff_multiplier * jitter)
        };

        if wait > Duration::ZERO {
            info!(key = %key, wait_secs = wait.as_secs_f64(), "Rate limit hit, waiting");
            tokio::time::sleep(wait).await;
        }

        // Record the admission the caller is about to use.
        self.is_allowed(key, max_requests, window).await;
        Some(wait)
    }

    /// Remaining quota in the current window. Pure read apart from pruning.
    pub async fn get_remaining_requests(
        &self,
        key: &str,
        max_requests: usize,
        window: Duration,
    ) -> usize {
        let mut keys = self.keys.lock().await;
        let entry = self.entry(&mut keys, key);
        entry.prune(window);
        max_requests.saturating_sub(entry.timestamps.len())
    }

    /// Decay the key's backoff multiplier after a successful call.
    /// The multiplier shrinks gradually toward 1.0; it never snaps back.
    pub async fn record_success(&self, key: &str) {
        let mut keys = self.keys.lock().await;
        let entry = self.entry(&mut keys, key);
        entry.backoff_multiplier = (entry.backoff_multiplier * BACKOFF_DECAY).max(BACKOFF_MIN);
        entry.breaker.record_success();
    }

    /// Grow the key's backoff multiplier after an explicit quota-exceeded
    /// signal (HTTP 429 class) and feed the key's breaker.
    pub async fn record_quota_exceeded(&self, key: &str) {
        let mut keys = self.keys.lock().await;
        let entry = self.entry(&mut keys, key);
        entry.backoff_multiplier = (entry.backoff_multiplier * BACKOFF_GROWTH).min(BACKOFF_MAX);
        entry.last_quota_hit = Some(Instant::now());
        entry.breaker.record_failure();
        debug!(
            key = %key,
            multiplier = entry.backoff_multiplier,
            "Quota exceeded, backoff multiplier raised"
        );
    }

    /// The breaker embedded in this key's window. Opens after repeated
    /// quota errors, independent of every other key.
    pub async fn breaker_for(&self, key: &str) -> Arc<CircuitBreaker> {
        let mut keys = self.keys.lock().await;
        self.entry(&mut keys, key).breaker.clone()
    }

    /// Current backoff multiplier, for introspection.
    pub async fn backoff_multiplier(&self, key: &str) -> f64 {
        let mut keys = self.keys.lock().await;
        self.entry(&mut keys, key).backoff_multiplier
    }

    fn entry<'a>(&self, keys: &'a mut HashMap<String, KeyWindow>, key: &str) -> &'a mut KeyWindow {
        keys.entry(key.to_string())
            .or_insert_with(|| KeyWindow::new(key, self.breaker_config.clone()))
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
