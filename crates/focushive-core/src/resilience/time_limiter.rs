//! Per-call wall-clock deadline. On breach, the in-flight future is
//! dropped (cancelled) at the await point.

use std::future::Future;
use std::time::Duration;

use crate::error::{CoreError, TransientFailure};

pub struct TimeLimiter {
    dependency: String,
    deadline: Duration,
}

impl TimeLimiter {
    pub fn new(dependency: impl Into<String>, deadline: Duration) -> Self {
        Self {
            dependency: dependency.into(),
            deadline,
        }
    }

    pub async fn run<F, T>(&self, fut: F) -> Result<T, CoreError>
    where
        F: Future<Output = Result<T, CoreError>>,
    {
        match tokio::time::timeout(self.deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::Transient(TransientFailure::Timeout {
                dependency: self.dependency.clone(),
                elapsed_ms: self.deadline.as_millis() as u64,
            })),
        }
    }
}
