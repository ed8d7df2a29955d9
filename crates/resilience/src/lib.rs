//! Fault isolation primitives for Ironloop.
//!
//! Two building blocks keep a flaky tool or provider from taking down the
//! whole agent:
//!
//! - [`CircuitBreaker`] — a per-named-operation gate that fails fast after
//!   repeated failures and probes for recovery after a cooldown.
//! - [`RateLimiter`] — sliding-window admission control with adaptive
//!   backoff and a per-key embedded breaker for quota errors.
//!
//! Both are plain values passed as explicit dependencies; there are no
//! global singletons.

pub mod breaker;
pub mod ratelimit;

pub use breaker::{
    BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitError,
    CircuitState,
};
pub use ratelimit::RateLimiter;
