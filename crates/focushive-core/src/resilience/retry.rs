//! Retry with exponential backoff and jitter. Retries only on errors that
//! report themselves retryable via [`Classify`] -- authn/authz/validation
//! failures propagate immediately.

use std::future::Future;

use rand::Rng;

use crate::config::ResilienceConfig;
use crate::error::{CoreError, TransientFailure};

use super::classify::Classify;

pub struct RetryExecutor {
    dependency: String,
    config: ResilienceConfig,
}

impl RetryExecutor {
    pub fn new(dependency: impl Into<String>, config: ResilienceConfig) -> Self {
        Self {
            dependency: dependency.into(),
            config,
        }
    }

    /// Execute `f`, retrying up to `max_retries` additional times on
    /// retryable failures with exponential backoff (`base * multiplier^n`,
    /// ±`jitter` fraction), surfacing `RetriesExhausted` after the last
    /// attempt fails.
    pub async fn execute<F, Fut, T>(&self, mut f: F) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let mut delay = self.config.retry_base_delay;
        let mut last_error: Option<CoreError> = None;

        for attempt in 0..=self.config.max_retries {
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    if attempt >= self.config.max_retries {
                        last_error = Some(err);
                        break;
                    }
                    last_error = Some(err);

                    let jitter_fraction = rand::thread_rng()
                        .gen_range(-self.config.retry_jitter..=self.config.retry_jitter);
                    let jittered_ms =
                        (delay.as_millis() as f64) * (1.0 + jitter_fraction);
                    tokio::time::sleep(std::time::Duration::from_millis(jittered_ms.max(0.0) as u64))
                        .await;

                    let next_ms = (delay.as_millis() as f64) * self.config.retry_multiplier;
                    delay = std::time::Duration::from_millis(next_ms as u64);
                }
            }
        }

        Err(CoreError::Transient(TransientFailure::RetriesExhausted {
            dependency: self.dependency.clone(),
            attempts: self.config.max_retries + 1,
            last_error: last_error.map(|e| e.to_string()).unwrap_or_default(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn retries_transient_failures_up_to_the_configured_max() {
        let mut config = ResilienceConfig::for_dependency("buddy");
        config.retry_base_delay = std::time::Duration::from_millis(1);
        config.max_retries = 2;
        let executor = RetryExecutor::new("buddy", config);

        let attempts = Arc::new(AtomicU32::new(0));
        let a = attempts.clone();
        let result: Result<(), CoreError> = executor
            .execute(|| {
                let a = a.clone();
                async move {
                    a.fetch_add(1, Ordering::SeqCst);
                    Err(CoreError::Transient(TransientFailure::Timeout {
                        dependency: "buddy".into(),
                        elapsed_ms: 10,
                    }))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_retryable_failures() {
        let config = ResilienceConfig::for_dependency("buddy");
        let executor = RetryExecutor::new("buddy", config);
        let attempts = Arc::new(AtomicU32::new(0));
        let a = attempts.clone();

        let result: Result<(), CoreError> = executor
            .execute(|| {
                let a = a.clone();
                async move {
                    a.fetch_add(1, Ordering::SeqCst);
                    Err(CoreError::Validation(crate::error::ValidationFailure::InvalidValue {
                        field: "x".into(),
                        message: "bad".into(),
                    }))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
