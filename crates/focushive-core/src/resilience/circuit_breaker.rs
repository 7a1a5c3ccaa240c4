//! Sliding-window circuit breaker. Reuses the state-machine shape of a
//! per-endpoint breaker but is generic over the wrapped call's error type
//! via [`Classify`](super::classify::Classify), so one implementation
//! serves every downstream dependency instead of duplicating the wrapper
//! per endpoint.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::ResilienceConfig;
use crate::kernel::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
enum CallOutcome {
    Success,
    Failure,
    Slow,
}

struct Inner {
    state: CircuitState,
    window: VecDeque<CallOutcome>,
    opened_at: Option<chrono::DateTime<chrono::Utc>>,
    half_open_attempts: usize,
    half_open_successes: usize,
}

/// One instance per downstream dependency. Call [`CircuitBreaker::guard`]
/// before attempting a call, and [`CircuitBreaker::record`] with its
/// outcome afterwards.
pub struct CircuitBreaker {
    name: String,
    config: ResilienceConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

/// Returned by [`CircuitBreaker::guard`] when the breaker currently admits
/// a call.
pub struct Permit {
    pub is_probe: bool,
}

/// Why [`CircuitBreaker::guard`] refused to admit a call. The two cases
/// carry different retry semantics upstream: a fully open breaker fails
/// fast and should not be retried; a half-open probe-quota rejection may
/// succeed shortly once in-flight probes resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Open,
    HalfOpenExhausted,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: ResilienceConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                window: VecDeque::new(),
                opened_at: None,
                half_open_attempts: 0,
                half_open_successes: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Returns `Ok(Permit)` if a call should proceed, `Err(Rejection)` if
    /// the breaker refuses admission -- distinguishing a fully open breaker
    /// (fail fast, do not retry) from an exhausted half-open probe quota
    /// (retryable; a concurrent probe may close the breaker shortly).
    pub fn guard(&self) -> Result<Permit, Rejection> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(Permit { is_probe: false }),
            CircuitState::Open => {
                let opened_at = inner.opened_at.unwrap_or_else(|| self.clock.now());
                if self.clock.now() - opened_at >= self.config.open_wait {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_attempts = 0;
                    inner.half_open_successes = 0;
                    inner.half_open_attempts += 1;
                    Ok(Permit { is_probe: true })
                } else {
                    Err(Rejection::Open)
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_attempts < self.config.half_open_probes {
                    inner.half_open_attempts += 1;
                    Ok(Permit { is_probe: true })
                } else {
                    Err(Rejection::HalfOpenExhausted)
                }
            }
        }
    }

    /// Record the outcome of a call admitted by [`CircuitBreaker::guard`].
    /// `was_slow` marks a call that breached the time-limiter's deadline
    /// but still completed -- those count toward the slow-call rate.
    pub fn record(&self, permit: Permit, success: bool, was_slow: bool) {
        let mut inner = self.inner.lock();

        if permit.is_probe {
            if success {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.half_open_probes {
                    inner.state = CircuitState::Closed;
                    inner.window.clear();
                    inner.opened_at = None;
                    return;
                }
                if inner.half_open_attempts >= self.config.half_open_probes {
                    // ran out of probes without reaching the success threshold
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(self.clock.now());
                }
                return;
            } else {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(self.clock.now());
                return;
            }
        }

        let outcome = match (success, was_slow) {
            (true, true) => CallOutcome::Slow,
            (true, false) => CallOutcome::Success,
            (false, _) => CallOutcome::Failure,
        };
        inner.window.push_back(outcome);
        if inner.window.len() > self.config.window_size {
            inner.window.pop_front();
        }

        if inner.window.len() >= self.config.window_size {
            let total = inner.window.len() as f64;
            let failures = inner
                .window
                .iter()
                .filter(|o| matches!(o, CallOutcome::Failure))
                .count() as f64;
            let slow = inner
                .window
                .iter()
                .filter(|o| matches!(o, CallOutcome::Slow))
                .count() as f64;

            if failures / total >= self.config.failure_rate_threshold
                || slow / total >= self.config.slow_call_rate_threshold
            {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(self.clock.now());
                inner.window.clear();
            }
        }
    }
}

/// Keeps one [`CircuitBreaker`] per downstream dependency name, created
/// lazily on first use.
pub struct CircuitBreakerRegistry {
    clock: Arc<dyn Clock>,
    breakers: dashmap::DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            breakers: dashmap::DashMap::new(),
        }
    }

    pub fn get_or_create(&self, dependency: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(dependency.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    dependency,
                    ResilienceConfig::for_dependency(dependency),
                    self.clock.clone(),
                ))
            })
            .clone()
    }
}
