//! `findMatches`: scores candidates by compatibility over shared focus
//! areas, goals, preferred focus times, timezone proximity, and skill
//! level. Stable and ordered descending; ties broken by candidate id.

use focushive_core::Identifier;

use crate::types::{MatchCandidate, MatchProfile};

fn jaccard(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let set_a: std::collections::HashSet<&String> = a.iter().collect();
    let set_b: std::collections::HashSet<&String> = b.iter().collect();
    let intersection = set_a.intersection(&set_b).count() as f64;
    let union = set_a.union(&set_b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

fn hour_overlap(a: &[u8], b: &[u8]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let set_b: std::collections::HashSet<&u8> = b.iter().collect();
    let shared = a.iter().filter(|h| set_b.contains(h)).count() as f64;
    shared / a.len().max(b.len()) as f64
}

/// Compatibility in [0, 1] between two profiles.
pub fn compatibility(a: &MatchProfile, b: &MatchProfile) -> f64 {
    let shared_focus = jaccard(&a.focus_areas, &b.focus_areas);
    let shared_goals = jaccard(&a.goals, &b.goals);
    let hours = hour_overlap(&a.preferred_focus_hours, &b.preferred_focus_hours);
    let tz_gap_minutes = (a.timezone_offset_minutes - b.timezone_offset_minutes).unsigned_abs() as f64;
    let tz_proximity = 1.0 - (tz_gap_minutes / 720.0).min(1.0);
    let skill_gap = (a.skill_level as i32 - b.skill_level as i32).unsigned_abs() as f64;
    let skill_closeness = 1.0 - (skill_gap / 10.0).min(1.0);

    (0.30 * shared_focus + 0.25 * shared_goals + 0.20 * hours + 0.15 * tz_proximity + 0.10 * skill_closeness)
        .clamp(0.0, 1.0)
}

/// Scores every candidate in `pool` against `target`, excluding `target`
/// itself, and returns the top `max_k` descending by score with ties
/// broken by candidate id.
pub fn find_matches(target: &MatchProfile, pool: &[MatchProfile], max_k: usize) -> Vec<MatchCandidate> {
    let mut scored: Vec<MatchCandidate> = pool
        .iter()
        .filter(|candidate| candidate.user_id != target.user_id)
        .map(|candidate| MatchCandidate {
            user_id: candidate.user_id,
            score: compatibility(target, candidate),
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    scored.truncate(max_k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(user_id: Identifier, focus: &[&str], hours: &[u8], tz: i32, skill: u8) -> MatchProfile {
        MatchProfile {
            user_id,
            focus_areas: focus.iter().map(|s| s.to_string()).collect(),
            goals: vec![],
            preferred_focus_hours: hours.to_vec(),
            timezone_offset_minutes: tz,
            skill_level: skill,
        }
    }

    #[test]
    fn identical_profiles_score_higher_than_a_dissimilar_one() {
        let target = profile(Identifier::new(), &["rust", "writing"], &[9, 10, 11], 0, 5);
        let close = profile(Identifier::new(), &["rust", "writing"], &[9, 10, 11], 0, 5);
        let far = profile(Identifier::new(), &["painting"], &[22, 23], 660, 1);

        assert!(compatibility(&target, &close) > compatibility(&target, &far));
    }

    #[test]
    fn results_are_ordered_descending_and_reproducible() {
        let target = profile(Identifier::new(), &["rust"], &[9], 0, 5);
        let a = profile(Identifier::new(), &["rust"], &[9], 0, 5);
        let b = profile(Identifier::new(), &["rust"], &[9], 0, 5);
        let pool = vec![a.clone(), b.clone()];

        let first = find_matches(&target, &pool, 2);
        let second = find_matches(&target, &pool, 2);
        assert_eq!(
            first.iter().map(|m| m.user_id).collect::<Vec<_>>(),
            second.iter().map(|m| m.user_id).collect::<Vec<_>>()
        );
    }

    #[test]
    fn target_never_matches_itself() {
        let target = profile(Identifier::new(), &["rust"], &[9], 0, 5);
        let pool = vec![target.clone()];
        assert!(find_matches(&target, &pool, 5).is_empty());
    }
}
