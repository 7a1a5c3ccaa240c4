//! End-to-end scenarios against `PartnershipEngine`'s public API: unordered-
//! pair uniqueness under a concurrent second request, and a full
//! accept -> check-in -> goal/milestone -> health-score arc.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;

use focushive_core::config::PartnershipConfig;
use focushive_core::delta::NullPublisher;
use focushive_core::kernel::{FakeClock, InMemoryTxnalStore};
use focushive_buddy::{BuddyError, ConflictError, GoalStatus, PartnershipEngine, PartnershipStatus};
use focushive_buddy::{CheckinKind, Mood};

fn engine(clock: Arc<FakeClock>) -> PartnershipEngine {
    PartnershipEngine::new(
        PartnershipConfig {
            pending_ttl: StdDuration::from_secs(72 * 3600),
            checkin_gap_tolerance: StdDuration::ZERO,
        },
        Arc::new(InMemoryTxnalStore::default()),
        Arc::new(InMemoryTxnalStore::default()),
        Arc::new(InMemoryTxnalStore::default()),
        Arc::new(InMemoryTxnalStore::default()),
        Arc::new(NullPublisher),
        clock,
    )
}

/// Scenario 4: requesting (A, B) succeeds; a concurrent (B, A) request
/// fails with `ConflictError`; after the first ends, a new (A, B) may form.
#[tokio::test]
async fn partnership_uniqueness_across_argument_order() {
    let clock = Arc::new(FakeClock::new(chrono::Utc::now()));
    let engine = engine(clock);
    let a = focushive_core::Identifier::new();
    let b = focushive_core::Identifier::new();

    let first = engine.request(a, b, 0.8).await.unwrap();

    let err = engine.request(b, a, 0.8).await.unwrap_err();
    assert!(matches!(err, BuddyError::Conflict(ConflictError::Duplicate { .. })));

    engine.end(first.id, "drifted_apart").await.unwrap();
    let second = engine.request(a, b, 0.8).await.unwrap();
    assert_ne!(first.id, second.id);
}

/// A full arc: accept a partnership, check in daily for four days with one
/// gap, create a goal with three milestones, complete them all, and
/// confirm the goal auto-completes and the health score stays in bounds
/// throughout.
#[tokio::test]
async fn full_partnership_arc_drives_goal_completion_and_health() {
    let clock = Arc::new(FakeClock::new(chrono::Utc::now()));
    let engine = engine(clock.clone());
    let a = focushive_core::Identifier::new();
    let b = focushive_core::Identifier::new();

    let partnership = engine.request(a, b, 0.9).await.unwrap();
    let partnership = engine.accept(partnership.id).await.unwrap();
    assert_eq!(partnership.status, PartnershipStatus::Active);

    let start = clock.now().date_naive();
    for offset in [-4i64, -3, -1, 0] {
        let at = start + Duration::days(offset);
        clock.set(at.and_hms_opt(9, 0, 0).unwrap().and_utc());
        engine
            .record_checkin(partnership.id, a, CheckinKind::Daily, "focused today".into(), Mood::Motivated, Some(8))
            .await
            .unwrap();
    }

    let streak = engine.current_daily_streak(partnership.id, a, start).await.unwrap();
    assert_eq!(streak, 2, "the d-2 gap breaks the streak, leaving d-1..d");

    let goal = engine
        .create_goal(
            partnership.id,
            "Finish the onboarding course".into(),
            "three modules, end to end".into(),
            start + Duration::days(21),
            a,
        )
        .await
        .unwrap();

    let milestones = [
        engine.add_milestone(goal.id, "module 1".into(), start, 1).await.unwrap(),
        engine.add_milestone(goal.id, "module 2".into(), start, 2).await.unwrap(),
        engine.add_milestone(goal.id, "module 3".into(), start, 3).await.unwrap(),
    ];

    let mut last_goal = goal;
    for milestone in &milestones {
        let (_, goal) = engine.complete_milestone(milestone.id, b).await.unwrap();
        last_goal = goal;
    }

    assert_eq!(last_goal.progress_pct, 100);
    assert_eq!(last_goal.status, GoalStatus::Completed);
    assert!(last_goal.completed_at.is_some());

    let current = engine.get(partnership.id).await.unwrap();
    assert!((0.0..=1.0).contains(&current.health_score));
    assert!(current.health_score > 0.3, "a completed goal and an active streak should lift health well off zero");
}
