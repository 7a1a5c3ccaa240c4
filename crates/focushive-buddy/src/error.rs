//! Error taxonomy for the buddy crate. Mirrors `focushive_core::error`'s
//! shape (one top-level enum wrapping narrower sub-errors) but stays a
//! separate type since this crate is modeled as the extracted buddy
//! service and should not need `focushive-core`'s presence/timer variants.

use thiserror::Error;

/// Top-level error type for focushive-buddy.
#[derive(Error, Debug)]
pub enum BuddyError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationFailure),

    #[error("conflict: {0}")]
    Conflict(#[from] ConflictError),

    #[error("not found: {0}")]
    NotFound(#[from] NotFoundError),

    #[error("internal error: {0}")]
    Fatal(String),
}

#[derive(Error, Debug)]
pub enum ValidationFailure {
    #[error("invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
    #[error("self-reference not allowed: {0}")]
    SelfReference(String),
    #[error("invariant violated: {0}")]
    InvariantViolated(String),
}

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

#[derive(Error, Debug)]
pub enum NotFoundError {
    #[error("{entity} '{id}' not found")]
    Entity { entity: String, id: String },
}

impl From<focushive_core::KvError> for BuddyError {
    fn from(err: focushive_core::KvError) -> Self {
        match err {
            focushive_core::KvError::VersionConflict { expected, found } => {
                BuddyError::Conflict(ConflictError::StaleVersion {
                    entity: "record".to_string(),
                    id: String::new(),
                    expected: expected.unwrap_or(0),
                    found: found.unwrap_or(0),
                })
            }
            focushive_core::KvError::Unavailable(message) => BuddyError::Fatal(message),
        }
    }
}

pub type Result<T, E = BuddyError> = std::result::Result<T, E>;
