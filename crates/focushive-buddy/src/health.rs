//! Health score and per-user accountability score. Both are convex
//! combinations of inputs the partnership engine gathers; kept as pure
//! functions so the weighting can be unit- and property-tested without a
//! store.

/// `healthScore ∈ [0, 1]`: both users' recent completion rates (0.4),
/// average mood score over the last 7 days normalized to [0, 1] (0.2),
/// streak factor `min(1, currentStreak / 14)` (0.2), and goal-progress
/// trend (0.2).
pub fn health_score(
    user1_completion_rate: f64,
    user2_completion_rate: f64,
    avg_mood_score_7d: f64,
    current_streak_days: u32,
    goal_progress_trend: f64,
) -> f64 {
    let completion = ((user1_completion_rate + user2_completion_rate) / 2.0).clamp(0.0, 1.0);
    let mood = (avg_mood_score_7d / 10.0).clamp(0.0, 1.0);
    let streak_factor = (current_streak_days as f64 / 14.0).min(1.0);
    let trend = goal_progress_trend.clamp(0.0, 1.0);

    (0.4 * completion + 0.2 * mood + 0.2 * streak_factor + 0.2 * trend).clamp(0.0, 1.0)
}

/// Per-`(partnershipId, userId)` score: own completion rate (0.5), own
/// current streak factor (0.3), own milestone-completion count this
/// partnership (0.2, saturating at 5 milestones).
pub fn accountability_score(completion_rate: f64, current_streak_days: u32, completed_milestones: u32) -> f64 {
    let streak_factor = (current_streak_days as f64 / 14.0).min(1.0);
    let milestone_factor = (completed_milestones as f64 / 5.0).min(1.0);

    (0.5 * completion_rate.clamp(0.0, 1.0) + 0.3 * streak_factor + 0.2 * milestone_factor).clamp(0.0, 1.0)
}
