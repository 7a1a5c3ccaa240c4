//! Bulkhead: caps concurrent in-flight calls per dependency. Excess calls
//! fail fast instead of queueing, per the fabric's layering contract.

use std::sync::Arc;

use tokio::sync::{Semaphore, TryAcquireError};

use crate::error::{CoreError, DependencyUnavailableError};

pub struct Bulkhead {
    dependency: String,
    semaphore: Arc<Semaphore>,
}

impl Bulkhead {
    pub fn new(dependency: impl Into<String>, capacity: usize) -> Self {
        Self {
            dependency: dependency.into(),
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Acquire a slot or fail immediately if the bulkhead is at capacity.
    pub fn try_acquire(&self) -> Result<tokio::sync::SemaphorePermit<'_>, CoreError> {
        self.semaphore.try_acquire().map_err(|err| match err {
            TryAcquireError::NoPermits => {
                CoreError::DependencyUnavailable(DependencyUnavailableError::Other {
                    dependency: self.dependency.clone(),
                    message: "bulkhead at capacity".to_string(),
                })
            }
            TryAcquireError::Closed => {
                CoreError::DependencyUnavailable(DependencyUnavailableError::Other {
                    dependency: self.dependency.clone(),
                    message: "bulkhead closed".to_string(),
                })
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_once_capacity_is_exhausted() {
        let bulkhead = Bulkhead::new("identity", 1);
        let _first = bulkhead.try_acquire().unwrap();
        assert!(bulkhead.try_acquire().is_err());
    }
}
