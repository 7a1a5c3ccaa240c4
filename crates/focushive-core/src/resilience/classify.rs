/// Lets the fabric reason about an error without depending on every
/// downstream dependency's concrete error type.
pub trait Classify {
    /// Whether a retry is worth attempting (transient failures, timeouts,
    /// breaker-half-open rejections). Authn/authz/validation failures must
    /// return `false`.
    fn is_retryable(&self) -> bool;

    /// Whether the failure was a time-limiter breach, counted distinctly
    /// from other transient failures for circuit-breaker slow-call
    /// accounting.
    fn is_timeout(&self) -> bool {
        false
    }
}

impl Classify for crate::error::CoreError {
    fn is_retryable(&self) -> bool {
        use crate::error::DependencyUnavailableError;
        match self {
            crate::error::CoreError::Transient(_) => true,
            // A fully open breaker fails fast on purpose -- retrying it would
            // just recreate the retry storm the breaker exists to prevent.
            // A half-open rejection (probe quota spent, not failing) may
            // succeed on a later attempt once in-flight probes resolve.
            crate::error::CoreError::DependencyUnavailable(DependencyUnavailableError::HalfOpenRejected {
                ..
            }) => true,
            crate::error::CoreError::DependencyUnavailable(_) => false,
            _ => false,
        }
    }

    fn is_timeout(&self) -> bool {
        matches!(
            self,
            crate::error::CoreError::Transient(crate::error::TransientFailure::Timeout { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CoreError, DependencyUnavailableError, TransientFailure, ValidationFailure};

    #[test]
    fn transient_failures_and_half_open_rejections_are_retryable() {
        let timeout = CoreError::Transient(TransientFailure::Timeout {
            dependency: "identity".into(),
            elapsed_ms: 500,
        });
        assert!(timeout.is_retryable());
        assert!(timeout.is_timeout());

        let half_open = CoreError::DependencyUnavailable(DependencyUnavailableError::HalfOpenRejected {
            dependency: "identity".into(),
        });
        assert!(half_open.is_retryable());
        assert!(!half_open.is_timeout());
    }

    #[test]
    fn a_fully_open_circuit_fails_fast_without_retry() {
        let circuit_open = CoreError::DependencyUnavailable(DependencyUnavailableError::CircuitOpen {
            dependency: "identity".into(),
        });
        assert!(!circuit_open.is_retryable(), "retrying an open breaker recreates a retry storm");
    }

    #[test]
    fn validation_failures_are_never_retried() {
        let err = CoreError::Validation(ValidationFailure::SelfReference("user".into()));
        assert!(!err.is_retryable());
        assert!(!err.is_timeout());
    }
}
