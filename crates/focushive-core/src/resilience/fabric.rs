//! Wraps a downstream dependency call with, outermost first: rate-limiter,
//! bulkhead, time-limiter, circuit-breaker, retry, primary call, fallback
//! on terminal failure. One [`DependencyFabric`] instance exists per
//! downstream dependency (identity, notification, buddy).

use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{Quota, RateLimiter};
use governor::state::{InMemoryState, NotKeyed};
use governor::clock::{QuantaClock, QuantaInstant};
use tracing::{debug, warn};

use crate::config::ResilienceConfig;
use crate::error::{CoreError, DependencyUnavailableError};
use crate::kernel::Clock;

use super::bulkhead::Bulkhead;
use super::circuit_breaker::CircuitBreaker;
use super::classify::Classify;
use super::retry::RetryExecutor;
use super::time_limiter::TimeLimiter;

type GovernorLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// A degraded response returned when the primary call fails terminally
/// (breaker open, or retries exhausted with a fallback configured).
#[async_trait::async_trait]
pub trait Fallback<T>: Send + Sync {
    async fn fallback(&self, error: &CoreError) -> Option<T>;
}

/// A fallback that never substitutes a value -- the error always
/// propagates.
pub struct NoFallback;

#[async_trait::async_trait]
impl<T: Send + Sync> Fallback<T> for NoFallback {
    async fn fallback(&self, _error: &CoreError) -> Option<T> {
        None
    }
}

pub struct DependencyFabric {
    dependency: String,
    config: ResilienceConfig,
    bulkhead: Bulkhead,
    time_limiter: TimeLimiter,
    breaker: Arc<CircuitBreaker>,
    retry: RetryExecutor,
    rate_limiter: Option<GovernorLimiter>,
}

impl DependencyFabric {
    pub fn new(dependency: impl Into<String>, config: ResilienceConfig, clock: Arc<dyn Clock>) -> Self {
        let dependency = dependency.into();
        let rate_limiter = config.rate_limit_per_hour.and_then(|n| {
            NonZeroU32::new(n).map(|n| RateLimiter::direct(Quota::per_hour(n)))
        });
        Self {
            bulkhead: Bulkhead::new(dependency.clone(), config.bulkhead_capacity),
            time_limiter: TimeLimiter::new(dependency.clone(), config.call_timeout),
            breaker: Arc::new(CircuitBreaker::new(dependency.clone(), config.clone(), clock)),
            retry: RetryExecutor::new(dependency.clone(), config.clone()),
            rate_limiter,
            dependency,
            config,
        }
    }

    /// Run `call` through the full layering, substituting `fallback`'s
    /// result if the call fails terminally and a fallback is configured.
    pub async fn execute<F, Fut, T, Fb>(&self, call: F, fallback: &Fb) -> Result<T, CoreError>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, CoreError>> + Send,
        T: Send,
        Fb: Fallback<T>,
    {
        if let Some(limiter) = &self.rate_limiter {
            if limiter.check().is_err() {
                let err = CoreError::DependencyUnavailable(DependencyUnavailableError::Other {
                    dependency: self.dependency.clone(),
                    message: "rate limit exceeded".to_string(),
                });
                return match fallback.fallback(&err).await {
                    Some(value) => Ok(value),
                    None => Err(err),
                };
            }
        }

        let _permit = match self.bulkhead.try_acquire() {
            Ok(permit) => permit,
            Err(err) => {
                return match fallback.fallback(&err).await {
                    Some(value) => Ok(value),
                    None => Err(err),
                };
            }
        };

        let breaker = self.breaker.clone();
        let dependency = self.dependency.clone();
        let time_limiter = &self.time_limiter;

        let result = self
            .retry
            .execute(|| async {
                let permit = match breaker.guard() {
                    Ok(permit) => permit,
                    Err(super::circuit_breaker::Rejection::Open) => {
                        return Err(CoreError::DependencyUnavailable(
                            DependencyUnavailableError::CircuitOpen {
                                dependency: dependency.clone(),
                            },
                        ));
                    }
                    Err(super::circuit_breaker::Rejection::HalfOpenExhausted) => {
                        return Err(CoreError::DependencyUnavailable(
                            DependencyUnavailableError::HalfOpenRejected {
                                dependency: dependency.clone(),
                            },
                        ));
                    }
                };

                let outcome = time_limiter.run(call()).await;
                let was_timeout = outcome.as_ref().err().map(|e| e.is_timeout()).unwrap_or(false);
                breaker.record(permit, outcome.is_ok(), was_timeout);
                outcome
            })
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                warn!(dependency = %self.dependency, error = %err, "dependency call failed terminally");
                match fallback.fallback(&err).await {
                    Some(value) => {
                        debug!(dependency = %self.dependency, "fallback satisfied the call");
                        Ok(value)
                    }
                    None => Err(err),
                }
            }
        }
    }

    pub fn breaker_state(&self) -> super::circuit_breaker::CircuitState {
        self.breaker.state()
    }
}

/// Owns one [`DependencyFabric`] per downstream dependency name.
pub struct FabricRegistry {
    clock: Arc<dyn Clock>,
    fabrics: dashmap::DashMap<String, Arc<DependencyFabric>>,
}

impl FabricRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            fabrics: dashmap::DashMap::new(),
        }
    }

    pub fn get_or_create(&self, dependency: &str) -> Arc<DependencyFabric> {
        self.fabrics
            .entry(dependency.to_string())
            .or_insert_with(|| {
                Arc::new(DependencyFabric::new(
                    dependency,
                    ResilienceConfig::for_dependency(dependency),
                    self.clock.clone(),
                ))
            })
            .clone()
    }
}
