//! Circuit breaker implementation for resilient operations.
//!
//! A breaker monitors failures of one named operation and opens when the
//! failure threshold is exceeded, failing fast instead of hammering a
//! broken dependency. After the recovery timeout it admits a single probe
//! call (half-open); one success closes the circuit again.
//!
//! Lock discipline: each breaker owns a `std::sync::Mutex` over its small
//! state struct, scoped to the check/record transitions and never held
//! across an `.await`. Breakers never share locks, so unrelated operations
//! cannot contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use ironloop_config::ResilienceConfig;
use ironloop_core::error::ResilienceError;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Calls fail fast without reaching the wrapped operation.
    Open,
    /// Cooldown elapsed; the next call is a recovery probe.
    HalfOpen,
}

/// Configuration for one circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long the circuit stays open before admitting a probe.
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&ResilienceConfig> for CircuitBreakerConfig {
    fn from(cfg: &ResilienceConfig) -> Self {
        Self {
            failure_threshold: cfg.failure_threshold,
            recovery_timeout: Duration::from_secs_f64(cfg.recovery_timeout_secs),
        }
    }
}

/// Error returned by [`CircuitBreaker::call`].
#[derive(Debug, thiserror::Error)]
pub enum CircuitError<E> {
    /// The circuit is open; the wrapped operation was not invoked.
    #[error("Circuit breaker '{0}' is open")]
    Open(String),

    /// The wrapped operation ran and failed.
    #[error(transparent)]
    Inner(E),
}

struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// Read-only view of a breaker, for telemetry and the CLI.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    /// Seconds since the most recent failure, if any.
    pub last_failure_age_secs: Option<f64>,
}

/// A failure gate for one named operation.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Admission check. Returns `Err` while the circuit is open and the
    /// recovery timeout has not elapsed; transitions Open → HalfOpen when
    /// it has.
    pub fn check(&self) -> Result<(), ResilienceError> {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        if inner.state == CircuitState::Open {
            let recovered = inner
                .last_failure
                .is_none_or(|t| t.elapsed() >= self.config.recovery_timeout);
            if recovered {
                inner.state = CircuitState::HalfOpen;
                info!(breaker = %self.name, "Circuit breaker transitioning to half-open");
            } else {
                return Err(ResilienceError::CircuitOpen {
                    name: self.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Record a successful call: reset the failure count and force Closed.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        if inner.state != CircuitState::Closed {
            info!(breaker = %self.name, "Circuit breaker reset to closed");
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
    }

    /// Record a failed call. A half-open probe failure reopens immediately;
    /// otherwise the circuit opens once the threshold is crossed.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());

        let should_open = inner.state == CircuitState::HalfOpen
            || inner.failure_count >= self.config.failure_threshold;
        if should_open && inner.state != CircuitState::Open {
            inner.state = CircuitState::Open;
            warn!(
                breaker = %self.name,
                failures = inner.failure_count,
                "Circuit breaker opened"
            );
        }
    }

    /// Execute an operation under this breaker: fail fast while open,
    /// record the outcome otherwise. The breaker lock is not held while
    /// the future runs.
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if self.check().is_err() {
            debug!(breaker = %self.name, "Call rejected, circuit open");
            return Err(CircuitError::Open(self.name.clone()));
        }

        match op().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(CircuitError::Inner(e))
            }
        }
    }

    /// Operator action: force the breaker back to closed.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure = None;
        info!(breaker = %self.name, "Circuit breaker manually reset");
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("breaker lock poisoned").state
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock().expect("breaker lock poisoned");
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            last_failure_age_secs: inner.last_failure.map(|t| t.elapsed().as_secs_f64()),
        }
    }
}

/// Owns all breakers, keyed by operation name.
///
/// `get_or_create` is idempotent: repeated calls with the same name return
/// the same instance. The registry map lock is released before any breaker
/// is used, so breakers for independent operations never contend.
pub struct CircuitBreakerRegistry {
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
    defaults: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    pub fn new(defaults: CircuitBreakerConfig) -> Self {
        Self {
            breakers: Mutex::new(HashMap::new()),
            defaults,
        }
    }

    /// Get the breaker for `name`, creating it with the default
    /// configuration on first use.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_or_create_with(name, None)
    }

    /// Get the breaker for `name`, creating it with `config` (or the
    /// defaults) on first use. An existing breaker keeps its original
    /// configuration.
    pub fn get_or_create_with(
        &self,
        name: &str,
        config: Option<CircuitBreakerConfig>,
    ) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().expect("registry lock poisoned");
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(breaker = %name, "Created circuit breaker");
                Arc::new(CircuitBreaker::new(
                    name,
                    config.unwrap_or_else(|| self.defaults.clone()),
                ))
            })
            .clone()
    }

    /// Operator action: reset every breaker.
    pub fn reset_all(&self) {
        let breakers = self.breakers.lock().expect("registry lock poisoned");
        for breaker in breakers.values() {
            breaker.reset();
        }
    }

    /// Snapshot of every breaker, for telemetry and the CLI.
    pub fn status(&self) -> Vec<BreakerSnapshot> {
        let breakers = self.breakers.lock().expect("registry lock poisoned");
        let mut snapshots: Vec<_> = breakers.values().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
