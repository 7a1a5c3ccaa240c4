//! Pure goal-progress rules: derivation from milestone completion, and the
//! monotonic rule manual progress updates must obey.

use crate::error::{BuddyError, ValidationFailure};

/// `floor(completedMilestones * 100 / totalMilestones)`.
pub fn progress_from_milestones(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((completed * 100) / total).min(100) as u8
}

/// `newProgress >= oldProgress` unless `allow_regression` is set.
pub fn apply_manual_progress(old_progress: u8, new_progress: u8, allow_regression: bool) -> Result<u8, BuddyError> {
    if new_progress > 100 {
        return Err(BuddyError::Validation(ValidationFailure::InvalidValue {
            field: "progressPct".to_string(),
            message: "must be in [0, 100]".to_string(),
        }));
    }
    if new_progress < old_progress && !allow_regression {
        return Err(BuddyError::Validation(ValidationFailure::InvariantViolated(format!(
            "progress cannot regress from {old_progress} to {new_progress} without allowRegression"
        ))));
    }
    Ok(new_progress)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_from_milestones_floors_the_fraction() {
        assert_eq!(progress_from_milestones(1, 3), 33);
        assert_eq!(progress_from_milestones(0, 0), 0);
        assert_eq!(progress_from_milestones(3, 3), 100);
    }

    #[test]
    fn manual_regression_is_rejected_unless_allowed() {
        assert!(apply_manual_progress(50, 40, false).is_err());
        assert_eq!(apply_manual_progress(50, 40, true).unwrap(), 40);
        assert_eq!(apply_manual_progress(50, 60, false).unwrap(), 60);
    }
}
