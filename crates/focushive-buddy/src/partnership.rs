//! Partnership engine: lifecycle state machine, uniqueness enforcement,
//! check-ins, goal/milestone progression, and health scoring. One instance
//! owns all partnership state for the process; no ambient singleton.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::mapref::entry::Entry as DashEntry;
use dashmap::DashMap;
use serde_json::json;
use tracing::{debug, info};

use focushive_core::config::PartnershipConfig;
use focushive_core::delta::{DeltaEvent, DeltaPublisher, GoalDeltaKind, PartnershipDeltaKind, Topic};
use focushive_core::{Clock, Identifier, TxnalStore};

use crate::error::{BuddyError, ConflictError, NotFoundError, ValidationFailure};
use crate::goals;
use crate::health;
use crate::matching;
use crate::streak;
use crate::types::{
    AccountabilityScore, Checkin, CheckinKind, Goal, GoalStatus, MatchCandidate, MatchProfile, Milestone, Mood,
    Partnership, PartnershipStatus,
};

pub struct PartnershipEngine {
    config: PartnershipConfig,
    store: Arc<dyn TxnalStore<Identifier, Partnership>>,
    checkins: Arc<dyn TxnalStore<Identifier, Checkin>>,
    goals: Arc<dyn TxnalStore<Identifier, Goal>>,
    milestones: Arc<dyn TxnalStore<Identifier, Milestone>>,
    publisher: Arc<dyn DeltaPublisher>,
    clock: Arc<dyn Clock>,
    /// Tracks the unordered pair for every non-ENDED partnership so
    /// uniqueness can be enforced without a full table scan.
    pair_index: DashMap<(Identifier, Identifier), Identifier>,
}

impl PartnershipEngine {
    pub fn new(
        config: PartnershipConfig,
        store: Arc<dyn TxnalStore<Identifier, Partnership>>,
        checkins: Arc<dyn TxnalStore<Identifier, Checkin>>,
        goals: Arc<dyn TxnalStore<Identifier, Goal>>,
        milestones: Arc<dyn TxnalStore<Identifier, Milestone>>,
        publisher: Arc<dyn DeltaPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            store,
            checkins,
            goals,
            milestones,
            publisher,
            clock,
            pair_index: DashMap::new(),
        }
    }

    async fn publish_partnership(&self, partnership: &Partnership, kind: PartnershipDeltaKind) {
        self.publisher
            .publish(
                Topic::Partnership(partnership.id),
                DeltaEvent::PartnershipDelta {
                    kind,
                    partnership_id: partnership.id,
                    payload: json!({ "status": format!("{:?}", partnership.status) }),
                },
            )
            .await;
    }

    async fn publish_goal(&self, goal: &Goal, kind: GoalDeltaKind) {
        self.publisher
            .publish(
                Topic::Partnership(goal.partnership_id),
                DeltaEvent::GoalDelta {
                    kind,
                    goal_id: goal.id,
                    partnership_id: goal.partnership_id,
                    payload: json!({ "progressPct": goal.progress_pct, "status": format!("{:?}", goal.status) }),
                },
            )
            .await;
    }

    async fn read(&self, id: Identifier) -> Result<(u64, Partnership), BuddyError> {
        self.store
            .find_versioned(&id)
            .await
            .map_err(BuddyError::from)?
            .ok_or_else(|| {
                BuddyError::NotFound(NotFoundError::Entity {
                    entity: "partnership".to_string(),
                    id: id.to_string(),
                })
            })
    }

    /// Requests a new partnership between two users. Fails with
    /// `ConflictError::Duplicate` if a non-ENDED partnership already
    /// exists for this unordered pair.
    pub async fn request(
        &self,
        user1_id: Identifier,
        user2_id: Identifier,
        compatibility_score: f64,
    ) -> Result<Partnership, BuddyError> {
        if user1_id == user2_id {
            return Err(BuddyError::Validation(ValidationFailure::SelfReference(
                "a partnership cannot be formed with oneself".to_string(),
            )));
        }

        let key = Partnership::pair_key(user1_id, user2_id);
        let id = Identifier::new();
        match self.pair_index.entry(key) {
            DashEntry::Occupied(_) => {
                return Err(BuddyError::Conflict(ConflictError::Duplicate {
                    entity: "partnership".to_string(),
                    detail: format!("{}-{}", key.0, key.1),
                }));
            }
            DashEntry::Vacant(vacant) => {
                vacant.insert(id);
            }
        }

        let now = self.clock.now();
        let partnership = Partnership {
            id,
            user1_id,
            user2_id,
            status: PartnershipStatus::Pending,
            started_at: None,
            ended_at: None,
            end_reason: None,
            duration_days: 0,
            compatibility_score: compatibility_score.clamp(0.0, 1.0),
            health_score: 0.0,
            last_interaction_at: now,
            created_at: now,
            version: 1,
        };

        if let Err(err) = self.store.insert(id, partnership.clone()).await {
            self.pair_index.remove(&key);
            return Err(BuddyError::from(err));
        }

        info!(%user1_id, %user2_id, partnership_id = %id, "partnership requested");
        self.publish_partnership(&partnership, PartnershipDeltaKind::Requested).await;
        Ok(partnership)
    }

    /// PENDING -> ACTIVE. Accepting an already-accepted partnership is a
    /// no-op; re-activating ENDED is a hard validation failure.
    pub async fn accept(&self, partnership_id: Identifier) -> Result<Partnership, BuddyError> {
        let (version, mut partnership) = self.read(partnership_id).await?;
        match partnership.status {
            PartnershipStatus::Active => return Ok(partnership),
            PartnershipStatus::Ended => {
                return Err(BuddyError::Validation(ValidationFailure::InvariantViolated(
                    "cannot reactivate an ended partnership".to_string(),
                )))
            }
            PartnershipStatus::Pending => {}
            PartnershipStatus::Paused => {
                return Err(BuddyError::Validation(ValidationFailure::InvariantViolated(
                    "accept is only valid from PENDING".to_string(),
                )))
            }
        }

        let now = self.clock.now();
        partnership.status = PartnershipStatus::Active;
        partnership.started_at = Some(now);
        partnership.last_interaction_at = now;
        self.store
            .update_if_version(&partnership_id, version, partnership.clone())
            .await
            .map_err(BuddyError::from)?;
        self.publish_partnership(&partnership, PartnershipDeltaKind::Accepted).await;
        Ok(partnership)
    }

    /// PENDING -> ENDED with `endReason = "rejected"`.
    pub async fn reject(&self, partnership_id: Identifier) -> Result<Partnership, BuddyError> {
        self.end_from(partnership_id, "rejected", &[PartnershipStatus::Pending])
            .await
    }

    /// ACTIVE -> PAUSED. Idempotent if already PAUSED.
    pub async fn pause(&self, partnership_id: Identifier) -> Result<Partnership, BuddyError> {
        let (version, mut partnership) = self.read(partnership_id).await?;
        if partnership.status == PartnershipStatus::Paused {
            return Ok(partnership);
        }
        if partnership.status != PartnershipStatus::Active {
            return Err(BuddyError::Validation(ValidationFailure::InvariantViolated(
                "pause is only valid from ACTIVE".to_string(),
            )));
        }
        partnership.status = PartnershipStatus::Paused;
        partnership.last_interaction_at = self.clock.now();
        self.store
            .update_if_version(&partnership_id, version, partnership.clone())
            .await
            .map_err(BuddyError::from)?;
        self.publish_partnership(&partnership, PartnershipDeltaKind::Paused).await;
        Ok(partnership)
    }

    /// PAUSED -> ACTIVE. Idempotent if already ACTIVE; reactivating ENDED
    /// is a hard validation failure.
    pub async fn resume(&self, partnership_id: Identifier) -> Result<Partnership, BuddyError> {
        let (version, mut partnership) = self.read(partnership_id).await?;
        match partnership.status {
            PartnershipStatus::Active => return Ok(partnership),
            PartnershipStatus::Ended => {
                return Err(BuddyError::Validation(ValidationFailure::InvariantViolated(
                    "cannot reactivate an ended partnership".to_string(),
                )))
            }
            PartnershipStatus::Paused => {}
            PartnershipStatus::Pending => {
                return Err(BuddyError::Validation(ValidationFailure::InvariantViolated(
                    "resume is only valid from PAUSED".to_string(),
                )))
            }
        }
        partnership.status = PartnershipStatus::Active;
        partnership.last_interaction_at = self.clock.now();
        self.store
            .update_if_version(&partnership_id, version, partnership.clone())
            .await
            .map_err(BuddyError::from)?;
        self.publish_partnership(&partnership, PartnershipDeltaKind::Resumed).await;
        Ok(partnership)
    }

    /// Any non-ENDED status -> ENDED. Idempotent if already ENDED.
    pub async fn end(&self, partnership_id: Identifier, reason: &str) -> Result<Partnership, BuddyError> {
        self.end_from(
            partnership_id,
            reason,
            &[PartnershipStatus::Pending, PartnershipStatus::Active, PartnershipStatus::Paused],
        )
        .await
    }

    async fn end_from(
        &self,
        partnership_id: Identifier,
        reason: &str,
        allowed_from: &[PartnershipStatus],
    ) -> Result<Partnership, BuddyError> {
        let (version, mut partnership) = self.read(partnership_id).await?;
        if partnership.status == PartnershipStatus::Ended {
            return Ok(partnership);
        }
        if !allowed_from.contains(&partnership.status) {
            return Err(BuddyError::Validation(ValidationFailure::InvariantViolated(format!(
                "cannot end a partnership from state {:?}",
                partnership.status
            ))));
        }

        let now = self.clock.now();
        partnership.status = PartnershipStatus::Ended;
        partnership.ended_at = Some(now);
        partnership.end_reason = Some(reason.to_string());
        self.store
            .update_if_version(&partnership_id, version, partnership.clone())
            .await
            .map_err(BuddyError::from)?;
        self.pair_index
            .remove(&Partnership::pair_key(partnership.user1_id, partnership.user2_id));
        self.publish_partnership(&partnership, PartnershipDeltaKind::Ended).await;
        Ok(partnership)
    }

    /// Scheduled sweep: PENDING partnerships older than the configured TTL
    /// auto-expire to ENDED with reason `"request_expired"`.
    pub async fn sweep_expired_pending(&self) -> Result<usize, BuddyError> {
        let now = self.clock.now();
        let all = self.store.scan().await.map_err(BuddyError::from)?;
        let mut count = 0;
        for partnership in all {
            if partnership.status == PartnershipStatus::Pending {
                let age = chrono::Duration::from_std(self.config.pending_ttl).unwrap_or_default();
                if now - partnership.created_at >= age {
                    self.end_from(partnership.id, "request_expired", &[PartnershipStatus::Pending])
                        .await?;
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    /// Lookup by unordered pair -- returns the same record regardless of
    /// argument order.
    pub async fn find_by_pair(&self, a: Identifier, b: Identifier) -> Result<Option<Partnership>, BuddyError> {
        let key = Partnership::pair_key(a, b);
        match self.pair_index.get(&key) {
            Some(id) => Ok(self.store.find(&id).await.map_err(BuddyError::from)?),
            None => Ok(None),
        }
    }

    pub async fn get(&self, partnership_id: Identifier) -> Result<Partnership, BuddyError> {
        Ok(self.read(partnership_id).await?.1)
    }

    /// Records a check-in, refreshes `lastInteractionAt`, and recomputes
    /// the partnership's health score.
    pub async fn record_checkin(
        &self,
        partnership_id: Identifier,
        user_id: Identifier,
        kind: CheckinKind,
        content: String,
        mood: Mood,
        productivity_rating: Option<u8>,
    ) -> Result<Checkin, BuddyError> {
        let (version, mut partnership) = self.read(partnership_id).await?;
        if !partnership.involves(user_id) {
            return Err(BuddyError::Validation(ValidationFailure::InvalidValue {
                field: "userId".to_string(),
                message: "user is not part of this partnership".to_string(),
            }));
        }
        if partnership.status == PartnershipStatus::Ended {
            return Err(BuddyError::Validation(ValidationFailure::InvariantViolated(
                "cannot check in to an ended partnership".to_string(),
            )));
        }

        let now = self.clock.now();
        let checkin = Checkin {
            id: Identifier::new(),
            partnership_id,
            user_id,
            kind,
            content,
            mood,
            productivity_rating,
            created_at: now,
        };
        self.checkins
            .insert(checkin.id, checkin.clone())
            .await
            .map_err(BuddyError::from)?;

        partnership.last_interaction_at = now;
        self.store
            .update_if_version(&partnership_id, version, partnership.clone())
            .await
            .map_err(BuddyError::from)?;

        self.publisher
            .publish(
                Topic::Partnership(partnership_id),
                DeltaEvent::PartnershipDelta {
                    kind: PartnershipDeltaKind::CheckinRecorded,
                    partnership_id,
                    payload: json!({ "userId": user_id.to_string(), "kind": format!("{:?}", kind) }),
                },
            )
            .await;

        self.recompute_health(partnership_id).await?;
        Ok(checkin)
    }

    async fn checkin_dates(&self, partnership_id: Identifier, user_id: Identifier) -> Result<BTreeSet<chrono::NaiveDate>, BuddyError> {
        let all = self.checkins.scan().await.map_err(BuddyError::from)?;
        Ok(all
            .into_iter()
            .filter(|c| c.partnership_id == partnership_id && c.user_id == user_id && c.kind == CheckinKind::Daily)
            .map(|c| c.date())
            .collect())
    }

    /// `currentDailyStreak(partnershipId, userId, asOf)`.
    pub async fn current_daily_streak(
        &self,
        partnership_id: Identifier,
        user_id: Identifier,
        as_of: chrono::NaiveDate,
    ) -> Result<u32, BuddyError> {
        let dates = self.checkin_dates(partnership_id, user_id).await?;
        Ok(streak::current_daily_streak(&dates, as_of))
    }

    pub async fn longest_daily_streak(&self, partnership_id: Identifier, user_id: Identifier) -> Result<u32, BuddyError> {
        let dates = self.checkin_dates(partnership_id, user_id).await?;
        Ok(streak::longest_daily_streak(&dates))
    }

    pub async fn missed_days(
        &self,
        partnership_id: Identifier,
        user_id: Identifier,
        from: chrono::NaiveDate,
        to: chrono::NaiveDate,
    ) -> Result<i64, BuddyError> {
        let dates = self.checkin_dates(partnership_id, user_id).await?;
        Ok(streak::missed_days(&dates, from, to))
    }

    /// Distinct check-in days / partnership-active days, in [0, 1].
    pub async fn completion_rate(&self, partnership_id: Identifier, user_id: Identifier) -> Result<f64, BuddyError> {
        let partnership = self.get(partnership_id).await?;
        let dates = self.checkin_dates(partnership_id, user_id).await?;
        let now = self.clock.now();
        let since = partnership.started_at.unwrap_or(partnership.created_at);
        let active_days = (now.date_naive() - since.date_naive()).num_days() + 1;
        Ok(streak::completion_rate(dates.len(), active_days))
    }

    /// Recomputes `healthScore` from both users' recent completion rates,
    /// average mood over the last 7 days, the partnership's current
    /// streak (the longer of the two users'), and a goal-progress trend
    /// derived from recent milestone/goal completions.
    async fn recompute_health(&self, partnership_id: Identifier) -> Result<f64, BuddyError> {
        let (version, mut partnership) = self.read(partnership_id).await?;
        let now = self.clock.now();

        let user1_rate = self.completion_rate(partnership_id, partnership.user1_id).await?;
        let user2_rate = self.completion_rate(partnership_id, partnership.user2_id).await?;

        let all_checkins = self.checkins.scan().await.map_err(BuddyError::from)?;
        let recent: Vec<_> = all_checkins
            .iter()
            .filter(|c| c.partnership_id == partnership_id && now - c.created_at <= chrono::Duration::days(7))
            .collect();
        let avg_mood = if recent.is_empty() {
            5.0
        } else {
            recent.iter().map(|c| c.mood.emotional_score() as f64).sum::<f64>() / recent.len() as f64
        };

        let streak1 = streak::current_daily_streak(&self.checkin_dates(partnership_id, partnership.user1_id).await?, now.date_naive());
        let streak2 = streak::current_daily_streak(&self.checkin_dates(partnership_id, partnership.user2_id).await?, now.date_naive());
        let current_streak = streak1.max(streak2);

        let goals = self.goals.scan().await.map_err(BuddyError::from)?;
        let partnership_goals: Vec<_> = goals.into_iter().filter(|g| g.partnership_id == partnership_id).collect();
        let milestones = self.milestones.scan().await.map_err(BuddyError::from)?;
        let recent_progress_events = partnership_goals
            .iter()
            .filter(|g| {
                g.completed_at.map(|at| now - at <= chrono::Duration::days(7)).unwrap_or(false)
                    || milestones.iter().any(|m| {
                        m.goal_id == g.id && m.completed_at.map(|at| now - at <= chrono::Duration::days(7)).unwrap_or(false)
                    })
            })
            .count();
        let goal_progress_trend = if partnership_goals.is_empty() {
            0.5
        } else {
            recent_progress_events as f64 / partnership_goals.len() as f64
        };

        let score = health::health_score(user1_rate, user2_rate, avg_mood, current_streak, goal_progress_trend);
        partnership.health_score = score;
        self.store
            .update_if_version(&partnership_id, version, partnership.clone())
            .await
            .map_err(BuddyError::from)?;
        debug!(%partnership_id, score, "health score recomputed");
        Ok(score)
    }

    /// Per-`(partnershipId, userId)` accountability score.
    pub async fn accountability_score(&self, partnership_id: Identifier, user_id: Identifier) -> Result<AccountabilityScore, BuddyError> {
        let completion_rate = self.completion_rate(partnership_id, user_id).await?;
        let dates = self.checkin_dates(partnership_id, user_id).await?;
        let current_streak = streak::current_daily_streak(&dates, self.clock.now().date_naive());

        let milestones = self.milestones.scan().await.map_err(BuddyError::from)?;
        let goals = self.goals.scan().await.map_err(BuddyError::from)?;
        let goal_ids: Vec<Identifier> = goals
            .iter()
            .filter(|g| g.partnership_id == partnership_id)
            .map(|g| g.id)
            .collect();
        let completed_milestones = milestones
            .iter()
            .filter(|m| goal_ids.contains(&m.goal_id) && m.completed_by == Some(user_id) && m.is_completed())
            .count() as u32;

        Ok(AccountabilityScore {
            partnership_id,
            user_id,
            score: health::accountability_score(completion_rate, current_streak, completed_milestones),
        })
    }

    /// Creates a new goal scoped to a partnership.
    pub async fn create_goal(
        &self,
        partnership_id: Identifier,
        title: String,
        description: String,
        target_date: chrono::NaiveDate,
        created_by: Identifier,
    ) -> Result<Goal, BuddyError> {
        self.read(partnership_id).await?;
        let goal = Goal {
            id: Identifier::new(),
            partnership_id,
            title,
            description,
            progress_pct: 0,
            status: GoalStatus::InProgress,
            target_date,
            created_by,
            completed_at: None,
            version: 1,
        };
        self.goals.insert(goal.id, goal.clone()).await.map_err(BuddyError::from)?;
        self.publish_goal(&goal, GoalDeltaKind::Created).await;
        Ok(goal)
    }

    async fn read_goal(&self, goal_id: Identifier) -> Result<(u64, Goal), BuddyError> {
        self.goals
            .find_versioned(&goal_id)
            .await
            .map_err(BuddyError::from)?
            .ok_or_else(|| {
                BuddyError::NotFound(NotFoundError::Entity {
                    entity: "goal".to_string(),
                    id: goal_id.to_string(),
                })
            })
    }

    async fn goal_milestones(&self, goal_id: Identifier) -> Result<Vec<Milestone>, BuddyError> {
        let all = self.milestones.scan().await.map_err(BuddyError::from)?;
        Ok(all.into_iter().filter(|m| m.goal_id == goal_id).collect())
    }

    /// Manually sets progress, subject to the monotonic rule, unless the
    /// goal has milestones -- in which case progress is always derived
    /// from milestone completion and `new_progress` is ignored.
    pub async fn update_goal_progress(
        &self,
        goal_id: Identifier,
        new_progress: u8,
        allow_regression: bool,
    ) -> Result<Goal, BuddyError> {
        let (version, mut goal) = self.read_goal(goal_id).await?;
        let milestones = self.goal_milestones(goal_id).await?;

        let progress = if milestones.is_empty() {
            goals::apply_manual_progress(goal.progress_pct, new_progress, allow_regression)?
        } else {
            let completed = milestones.iter().filter(|m| m.is_completed()).count();
            goals::progress_from_milestones(completed, milestones.len())
        };

        goal.progress_pct = progress;
        let reached_completion = progress == 100 && goal.status != GoalStatus::Completed;
        let left_completion = progress < 100 && goal.status == GoalStatus::Completed;
        if reached_completion {
            goal.status = GoalStatus::Completed;
            goal.completed_at = Some(self.clock.now());
        } else if left_completion {
            goal.status = GoalStatus::InProgress;
            goal.completed_at = None;
        }

        self.goals
            .update_if_version(&goal_id, version, goal.clone())
            .await
            .map_err(BuddyError::from)?;

        let kind = if reached_completion {
            GoalDeltaKind::Completed
        } else {
            GoalDeltaKind::ProgressUpdated
        };
        self.publish_goal(&goal, kind).await;
        if reached_completion {
            self.recompute_health(goal.partnership_id).await?;
        }
        Ok(goal)
    }

    pub async fn add_milestone(&self, goal_id: Identifier, title: String, target_date: chrono::NaiveDate, ordinal: u32) -> Result<Milestone, BuddyError> {
        self.read_goal(goal_id).await?;
        let milestone = Milestone {
            id: Identifier::new(),
            goal_id,
            title,
            target_date,
            completed_at: None,
            completed_by: None,
            ordinal,
        };
        self.milestones
            .insert(milestone.id, milestone.clone())
            .await
            .map_err(BuddyError::from)?;
        Ok(milestone)
    }

    /// Completes a milestone and re-derives its parent goal's progress.
    pub async fn complete_milestone(&self, milestone_id: Identifier, completed_by: Identifier) -> Result<(Milestone, Goal), BuddyError> {
        let (version, mut milestone) = self
            .milestones
            .find_versioned(&milestone_id)
            .await
            .map_err(BuddyError::from)?
            .ok_or_else(|| {
                BuddyError::NotFound(NotFoundError::Entity {
                    entity: "milestone".to_string(),
                    id: milestone_id.to_string(),
                })
            })?;

        if milestone.is_completed() {
            let goal = self.read_goal(milestone.goal_id).await?.1;
            return Ok((milestone, goal));
        }

        milestone.completed_at = Some(self.clock.now());
        milestone.completed_by = Some(completed_by);
        self.milestones
            .update_if_version(&milestone_id, version, milestone.clone())
            .await
            .map_err(BuddyError::from)?;

        let goal = self.update_goal_progress(milestone.goal_id, 0, true).await?;

        self.publisher
            .publish(
                Topic::Partnership(goal.partnership_id),
                DeltaEvent::PartnershipDelta {
                    kind: PartnershipDeltaKind::MilestoneCompleted,
                    partnership_id: goal.partnership_id,
                    payload: json!({ "milestoneId": milestone_id.to_string(), "goalId": goal.id.to_string() }),
                },
            )
            .await;
        self.recompute_health(goal.partnership_id).await?;

        Ok((milestone, goal))
    }

    /// Scores `pool` against `target_id`'s profile and returns the top
    /// `max_k` candidates, descending, ties broken by candidate id.
    pub fn find_matches(&self, target: &MatchProfile, pool: &[MatchProfile], max_k: usize) -> Vec<MatchCandidate> {
        matching::find_matches(target, pool, max_k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use focushive_core::delta::NullPublisher;
    use focushive_core::kernel::{FakeClock, InMemoryTxnalStore};

    fn engine() -> (PartnershipEngine, Arc<FakeClock>) {
        let clock = Arc::new(FakeClock::new(chrono::Utc::now()));
        let engine = PartnershipEngine::new(
            PartnershipConfig {
                pending_ttl: std::time::Duration::from_secs(72 * 3600),
                checkin_gap_tolerance: std::time::Duration::ZERO,
            },
            Arc::new(InMemoryTxnalStore::default()),
            Arc::new(InMemoryTxnalStore::default()),
            Arc::new(InMemoryTxnalStore::default()),
            Arc::new(InMemoryTxnalStore::default()),
            Arc::new(NullPublisher),
            clock.clone(),
        );
        (engine, clock)
    }

    #[tokio::test]
    async fn self_partnership_is_rejected() {
        let (engine, _clock) = engine();
        let user = Identifier::new();
        let err = engine.request(user, user, 0.5).await.unwrap_err();
        assert!(matches!(
            err,
            BuddyError::Validation(ValidationFailure::SelfReference(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_request_conflicts_regardless_of_argument_order() {
        let (engine, _clock) = engine();
        let a = Identifier::new();
        let b = Identifier::new();

        engine.request(a, b, 0.7).await.unwrap();
        let err = engine.request(b, a, 0.7).await.unwrap_err();
        assert!(matches!(err, BuddyError::Conflict(ConflictError::Duplicate { .. })));

        let found = engine.find_by_pair(b, a).await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn a_new_partnership_may_form_after_the_prior_one_ends() {
        let (engine, _clock) = engine();
        let a = Identifier::new();
        let b = Identifier::new();

        let first = engine.request(a, b, 0.7).await.unwrap();
        engine.end(first.id, "no_longer_interested").await.unwrap();

        let second = engine.request(a, b, 0.7).await.unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn accept_is_idempotent_and_reactivating_ended_is_forbidden() {
        let (engine, _clock) = engine();
        let a = Identifier::new();
        let b = Identifier::new();
        let partnership = engine.request(a, b, 0.5).await.unwrap();

        let accepted = engine.accept(partnership.id).await.unwrap();
        assert_eq!(accepted.status, PartnershipStatus::Active);

        let accepted_again = engine.accept(partnership.id).await.unwrap();
        assert_eq!(accepted_again.status, PartnershipStatus::Active);
        assert_eq!(accepted_again.version, accepted.version, "no-op must not bump the version");

        engine.end(partnership.id, "ended_for_test").await.unwrap();
        let err = engine.accept(partnership.id).await.unwrap_err();
        assert!(matches!(
            err,
            BuddyError::Validation(ValidationFailure::InvariantViolated(_))
        ));
    }

    #[tokio::test]
    async fn pause_and_resume_are_idempotent() {
        let (engine, _clock) = engine();
        let a = Identifier::new();
        let b = Identifier::new();
        let partnership = engine.request(a, b, 0.5).await.unwrap();
        engine.accept(partnership.id).await.unwrap();

        let paused = engine.pause(partnership.id).await.unwrap();
        assert_eq!(paused.status, PartnershipStatus::Paused);
        let paused_again = engine.pause(partnership.id).await.unwrap();
        assert_eq!(paused_again.status, PartnershipStatus::Paused);

        let resumed = engine.resume(partnership.id).await.unwrap();
        assert_eq!(resumed.status, PartnershipStatus::Active);
        let resumed_again = engine.resume(partnership.id).await.unwrap();
        assert_eq!(resumed_again.status, PartnershipStatus::Active);
    }

    #[tokio::test]
    async fn pending_partnership_expires_at_exactly_the_configured_ttl() {
        let (engine, clock) = engine();
        let a = Identifier::new();
        let b = Identifier::new();
        let partnership = engine.request(a, b, 0.5).await.unwrap();

        clock.advance(chrono::Duration::hours(72) - chrono::Duration::seconds(1));
        let expired = engine.sweep_expired_pending().await.unwrap();
        assert_eq!(expired, 0, "not yet at the TTL boundary");

        clock.advance(chrono::Duration::seconds(1));
        let expired = engine.sweep_expired_pending().await.unwrap();
        assert_eq!(expired, 1, "exactly at the 72h boundary must expire");

        let current = engine.get(partnership.id).await.unwrap();
        assert_eq!(current.status, PartnershipStatus::Ended);
        assert_eq!(current.end_reason.as_deref(), Some("request_expired"));
    }

    #[tokio::test]
    async fn checkin_from_a_non_member_is_rejected() {
        let (engine, _clock) = engine();
        let a = Identifier::new();
        let b = Identifier::new();
        let outsider = Identifier::new();
        let partnership = engine.request(a, b, 0.5).await.unwrap();
        engine.accept(partnership.id).await.unwrap();

        let err = engine
            .record_checkin(partnership.id, outsider, CheckinKind::Daily, "hi".into(), Mood::Motivated, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BuddyError::Validation(ValidationFailure::InvalidValue { .. })));
    }

    #[tokio::test]
    async fn streak_with_a_gap_matches_across_the_engine_boundary() {
        let (engine, clock) = engine();
        let a = Identifier::new();
        let b = Identifier::new();
        let partnership = engine.request(a, b, 0.5).await.unwrap();
        engine.accept(partnership.id).await.unwrap();

        let start = clock.now().date_naive();
        for offset in [-4i64, -3, -1, 0] {
            let target = start + chrono::Duration::days(offset);
            clock.set(target.and_hms_opt(12, 0, 0).unwrap().and_utc());
            engine
                .record_checkin(partnership.id, a, CheckinKind::Daily, "done".into(), Mood::Focused, Some(7))
                .await
                .unwrap();
        }

        let current = engine.current_daily_streak(partnership.id, a, start).await.unwrap();
        let longest = engine.longest_daily_streak(partnership.id, a).await.unwrap();
        let missed = engine
            .missed_days(partnership.id, a, start - chrono::Duration::days(4), start)
            .await
            .unwrap();
        assert_eq!(current, 2);
        assert_eq!(longest, 2);
        assert_eq!(missed, 1);
        assert!(current <= longest);
    }

    #[tokio::test]
    async fn checkin_recomputes_health_score_within_bounds() {
        let (engine, _clock) = engine();
        let a = Identifier::new();
        let b = Identifier::new();
        let partnership = engine.request(a, b, 0.5).await.unwrap();
        engine.accept(partnership.id).await.unwrap();

        engine
            .record_checkin(partnership.id, a, CheckinKind::Daily, "done".into(), Mood::Accomplished, Some(9))
            .await
            .unwrap();

        let current = engine.get(partnership.id).await.unwrap();
        assert!((0.0..=1.0).contains(&current.health_score));
        assert!(current.health_score > 0.0, "a positive check-in should lift health off zero");
    }

    #[tokio::test]
    async fn goal_without_milestones_obeys_the_monotonic_progress_rule() {
        let (engine, clock) = engine();
        let a = Identifier::new();
        let b = Identifier::new();
        let partnership = engine.request(a, b, 0.5).await.unwrap();
        engine.accept(partnership.id).await.unwrap();

        let goal = engine
            .create_goal(
                partnership.id,
                "Ship the feature".into(),
                "end to end".into(),
                clock.now().date_naive() + chrono::Duration::days(14),
                a,
            )
            .await
            .unwrap();

        let updated = engine.update_goal_progress(goal.id, 50, false).await.unwrap();
        assert_eq!(updated.progress_pct, 50);

        let err = engine.update_goal_progress(goal.id, 30, false).await.unwrap_err();
        assert!(matches!(err, BuddyError::Validation(ValidationFailure::InvariantViolated(_))));

        let regressed = engine.update_goal_progress(goal.id, 30, true).await.unwrap();
        assert_eq!(regressed.progress_pct, 30);
    }

    #[tokio::test]
    async fn goal_auto_completes_when_all_milestones_finish() {
        let (engine, clock) = engine();
        let a = Identifier::new();
        let b = Identifier::new();
        let partnership = engine.request(a, b, 0.5).await.unwrap();
        engine.accept(partnership.id).await.unwrap();

        let goal = engine
            .create_goal(
                partnership.id,
                "Finish the course".into(),
                "three modules".into(),
                clock.now().date_naive() + chrono::Duration::days(30),
                a,
            )
            .await
            .unwrap();

        let m1 = engine.add_milestone(goal.id, "module 1".into(), clock.now().date_naive(), 1).await.unwrap();
        let m2 = engine.add_milestone(goal.id, "module 2".into(), clock.now().date_naive(), 2).await.unwrap();
        let m3 = engine.add_milestone(goal.id, "module 3".into(), clock.now().date_naive(), 3).await.unwrap();

        let (_, goal) = engine.complete_milestone(m1.id, a).await.unwrap();
        assert_eq!(goal.progress_pct, 33);
        let (_, goal) = engine.complete_milestone(m2.id, b).await.unwrap();
        assert_eq!(goal.progress_pct, 66);
        let (_, goal) = engine.complete_milestone(m3.id, a).await.unwrap();
        assert_eq!(goal.progress_pct, 100);
        assert_eq!(goal.status, GoalStatus::Completed);
        assert!(goal.completed_at.is_some());

        // Completing an already-completed milestone is a no-op.
        let (milestone_again, goal_again) = engine.complete_milestone(m3.id, a).await.unwrap();
        assert_eq!(milestone_again.completed_at, m3_completed_at(&engine, m3.id).await);
        assert_eq!(goal_again.progress_pct, 100);
    }

    #[tokio::test]
    async fn accountability_score_reflects_streak_and_milestones() {
        let (engine, clock) = engine();
        let a = Identifier::new();
        let b = Identifier::new();
        let partnership = engine.request(a, b, 0.5).await.unwrap();
        engine.accept(partnership.id).await.unwrap();

        let score_before = engine.accountability_score(partnership.id, a).await.unwrap();
        assert_eq!(score_before.score, 0.0);

        engine
            .record_checkin(partnership.id, a, CheckinKind::Daily, "done".into(), Mood::Motivated, Some(8))
            .await
            .unwrap();
        let score_after = engine.accountability_score(partnership.id, a).await.unwrap();
        assert!(score_after.score > score_before.score);
    }

    async fn m3_completed_at(engine: &PartnershipEngine, milestone_id: Identifier) -> Option<chrono::DateTime<chrono::Utc>> {
        engine.milestones.find(&milestone_id).await.unwrap().and_then(|m| m.completed_at)
    }
}
