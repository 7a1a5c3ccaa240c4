//! # FocusHive Buddy
//!
//! Partnership & accountability engine: matching, partnership lifecycle,
//! check-in streaks, goal/milestone progression, and health/accountability
//! scoring. Depends on `focushive-core` for its shared kernel (clock, store,
//! delta publishing) but owns its own error taxonomy and record types, the
//! way an extracted service would.

pub mod error;
pub mod goals;
pub mod health;
pub mod matching;
pub mod partnership;
pub mod streak;
pub mod types;

pub use error::{BuddyError, ConflictError, NotFoundError, Result, ValidationFailure};
pub use partnership::PartnershipEngine;
pub use types::{
    AccountabilityScore, Checkin, CheckinKind, Goal, GoalStatus, MatchCandidate, MatchProfile, Milestone, Mood,
    Partnership, PartnershipStatus,
};
