//! Core error types for focushive-core.
//!
//! This module defines the error hierarchy using thiserror: one top-level
//! enum wraps narrower sub-errors with `#[from]`, mirroring the taxonomy
//! every downstream crate in this workspace raises.

use thiserror::Error;

use crate::kernel::KvError;

/// Top-level error type for focushive-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Missing/invalid/expired/revoked credential. Surfaced as
    /// unauthenticated; never retried.
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthenticationFailure),

    /// Role or ownership check denied. Surfaced as forbidden; audited.
    #[error("authorization failed: {0}")]
    Authorization(#[from] AuthorizationFailure),

    /// Malformed input or invariant violation.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationFailure),

    /// Optimistic lock loss or uniqueness violation.
    #[error("conflict: {0}")]
    Conflict(#[from] ConflictError),

    /// Entity absent.
    #[error("not found: {0}")]
    NotFound(#[from] NotFoundError),

    /// Downstream dependency failing and no fallback configured.
    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(#[from] DependencyUnavailableError),

    /// Retryable failure, surfaced only after the retry layer exhausts its
    /// attempts.
    #[error("transient failure: {0}")]
    Transient(#[from] TransientFailure),

    /// Programmer error or internally violated invariant.
    #[error("internal error: {0}")]
    Fatal(String),

    /// JSON (de)serialization errors surfacing from delta payload handling.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Authentication-specific errors.
#[derive(Error, Debug)]
pub enum AuthenticationFailure {
    #[error("credential expired at {exp}")]
    Expired { exp: chrono::DateTime<chrono::Utc> },
    #[error("signature verification failed")]
    InvalidSignature,
    #[error("token '{jti}' has been revoked")]
    Revoked { jti: String },
    #[error("credential malformed: {0}")]
    Malformed(String),
    #[error("no credential presented")]
    Missing,
}

/// Authorization-specific errors.
#[derive(Error, Debug)]
pub enum AuthorizationFailure {
    #[error("role {required} required, caller has {actual:?}")]
    MissingRole { required: String, actual: Vec<String> },
    #[error("caller is not the owner of {resource}")]
    NotOwner { resource: String },
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationFailure {
    #[error("invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
    #[error("self-reference not allowed: {0}")]
    SelfReference(String),
    #[error("invariant violated: {0}")]
    InvariantViolated(String),
}

/// Conflict errors: optimistic-lock loss or a uniqueness violation.
#[derive(Error, Debug)]
pub enum ConflictError {
    #[error("optimistic lock lost on {entity} {id}: expected version {expected}, found {found}")]
    StaleVersion {
        entity: String,
        id: String,
        expected: u64,
        found: u64,
    },
    #[error("duplicate {entity}: {detail}")]
    Duplicate { entity: String, detail: String },
}

/// Entity-not-found errors.
#[derive(Error, Debug)]
pub enum NotFoundError {
    #[error("{entity} '{id}' not found")]
    Entity { entity: String, id: String },
}

/// Downstream-dependency errors raised by the resilience fabric when the
/// breaker is open and no fallback is configured.
#[derive(Error, Debug)]
pub enum DependencyUnavailableError {
    /// The breaker is fully OPEN and failing fast. Never retried -- retrying
    /// every fast-failed call during the open window is exactly the retry
    /// storm §4.B's breaker exists to prevent.
    #[error("'{dependency}' circuit is open")]
    CircuitOpen { dependency: String },
    /// The breaker is HALF_OPEN and its probe quota for this window is
    /// already spent. Retryable: a later attempt may land in CLOSED once
    /// the in-flight probes resolve.
    #[error("'{dependency}' half-open probe quota exhausted")]
    HalfOpenRejected { dependency: String },
    #[error("'{dependency}' unavailable: {message}")]
    Other { dependency: String, message: String },
}

/// Retryable errors, absorbed by the retry layer and surfaced only after
/// exhaustion.
#[derive(Error, Debug)]
pub enum TransientFailure {
    #[error("'{dependency}' call timed out after {elapsed_ms} ms")]
    Timeout { dependency: String, elapsed_ms: u64 },
    #[error("'{dependency}' returned a retryable error: {message}")]
    Retryable { dependency: String, message: String },
    #[error("retries exhausted for '{dependency}' after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        dependency: String,
        attempts: u32,
        last_error: String,
    },
}

impl From<KvError> for CoreError {
    fn from(err: KvError) -> Self {
        match err {
            KvError::VersionConflict { expected, found } => {
                CoreError::Conflict(ConflictError::StaleVersion {
                    entity: "record".to_string(),
                    id: String::new(),
                    expected: expected.unwrap_or(0),
                    found: found.unwrap_or(0),
                })
            }
            KvError::Unavailable(message) => {
                CoreError::DependencyUnavailable(DependencyUnavailableError::Other {
                    dependency: "kv_store".to_string(),
                    message,
                })
            }
        }
    }
}

/// Result type alias for CoreError.
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
