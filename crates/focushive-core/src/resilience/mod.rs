//! Cross-cutting wrapper for every outbound dependency call: rate-limiter,
//! bulkhead, time-limiter, circuit-breaker, retry, and fallback, composed
//! in that order around the primary call.

pub mod bulkhead;
pub mod circuit_breaker;
pub mod classify;
pub mod fabric;
pub mod retry;
pub mod time_limiter;

pub use bulkhead::Bulkhead;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerRegistry, CircuitState};
pub use classify::Classify;
pub use fabric::{DependencyFabric, FabricRegistry, Fallback, NoFallback};
pub use retry::RetryExecutor;
pub use time_limiter::TimeLimiter;
