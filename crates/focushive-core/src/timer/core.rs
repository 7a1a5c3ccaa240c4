//! Timer core: owns the `FocusSession` state machine, drives scheduled
//! expiry, computes productivity scores, and broadcasts `TimerDelta`s.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::TimerConfig;
use crate::delta::{DeltaEvent, DeltaPublisher, Topic, TimerDeltaKind};
use crate::error::{CoreError, NotFoundError, ValidationFailure};
use crate::kernel::{Clock, Identifier, Scheduler, TaskHandle, TxnalStore};

use super::types::{FocusSession, SessionState, SessionType};

fn topic_for(session: &FocusSession) -> Topic {
    match session.hive_id {
        Some(hive_id) => Topic::Hive(hive_id),
        None => Topic::User(session.user_id),
    }
}

/// `base_completion` (elapsed focus time / planned duration, unclamped)
/// against distraction count and pause count: 5% penalty per distraction
/// (capped at 50%) and a focus-quality multiplier in `[0.8, 1.2]` that
/// falls 5% per pause. Pulled out of [`TimerCore::finish`] as a pure
/// function so the weighting can be property-tested without a store.
fn productivity_score(base_completion: f64, distraction_count: u32, pause_count: u32) -> u8 {
    let distraction_penalty = (distraction_count as f64 * 0.05).min(0.5);
    let focus_quality = (1.1 - 0.05 * pause_count as f64).clamp(0.8, 1.2);
    let raw_score = base_completion.min(1.0).max(0.0) * 100.0 * (1.0 - distraction_penalty) * focus_quality;
    raw_score.round().clamp(0.0, 100.0) as u8
}

/// Owns timer state for the process. Holds no ambient singleton; the
/// scheduling callback closes over an `Arc<TimerCore>` handed to it at
/// construction time via [`TimerCore::spawn`].
pub struct TimerCore {
    config: TimerConfig,
    store: Arc<dyn TxnalStore<Identifier, FocusSession>>,
    publisher: Arc<dyn DeltaPublisher>,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn Scheduler>,
    topic_sequence: DashMap<Topic, AtomicU64>,
    scheduled: DashMap<Identifier, TaskHandle>,
}

impl TimerCore {
    pub fn new(
        config: TimerConfig,
        store: Arc<dyn TxnalStore<Identifier, FocusSession>>,
        publisher: Arc<dyn DeltaPublisher>,
        clock: Arc<dyn Clock>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            publisher,
            clock,
            scheduler,
            topic_sequence: DashMap::new(),
            scheduled: DashMap::new(),
        })
    }

    fn next_sequence(&self, topic: &Topic) -> u64 {
        self.topic_sequence
            .entry(topic.clone())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::SeqCst)
            + 1
    }

    async fn publish(&self, session: &FocusSession, kind: TimerDeltaKind) {
        let topic = topic_for(session);
        let sequence_no = self.next_sequence(&topic);
        self.publisher
            .publish(
                topic,
                DeltaEvent::TimerDelta {
                    kind,
                    session_id: session.id,
                    payload: json!({
                        "sequenceNo": sequence_no,
                        "state": format!("{:?}", session.state),
                        "remainingSec": session.remaining_sec,
                    }),
                },
            )
            .await;
    }

    async fn read(&self, session_id: Identifier) -> Result<(u64, FocusSession), CoreError> {
        self.store
            .find_versioned(&session_id)
            .await
            .map_err(CoreError::from)?
            .ok_or_else(|| {
                CoreError::NotFound(NotFoundError::Entity {
                    entity: "focus_session".to_string(),
                    id: session_id.to_string(),
                })
            })
    }

    /// Replaces any prior expiry task for this session with one firing at
    /// `expires_at`; scheduling is therefore idempotent per-session.
    fn reschedule(self: &Arc<Self>, session_id: Identifier, expires_at: chrono::DateTime<chrono::Utc>) {
        if let Some((_, old)) = self.scheduled.remove(&session_id) {
            self.scheduler.cancel(old);
        }
        let core = self.clone();
        let handle = self.scheduler.schedule_at(
            expires_at,
            Box::pin(async move {
                if let Err(err) = core.fire_expiry(session_id).await {
                    warn!(%session_id, error = %err, "scheduled timer expiry failed");
                }
            }),
        );
        self.scheduled.insert(session_id, handle);
    }

    fn cancel_schedule(&self, session_id: Identifier) {
        if let Some((_, handle)) = self.scheduled.remove(&session_id) {
            self.scheduler.cancel(handle);
        }
    }

    /// Starts a new focus session. `hive_id` set ⇒ `HIVE_SHARED`.
    pub async fn start(
        self: &Arc<Self>,
        user_id: Identifier,
        hive_id: Option<Identifier>,
        template_id: Option<Identifier>,
        session_type: SessionType,
        planned_duration_sec: u32,
    ) -> Result<FocusSession, CoreError> {
        if planned_duration_sec == 0 || planned_duration_sec as u64 > self.config.max_duration.as_secs() {
            return Err(CoreError::Validation(ValidationFailure::InvalidValue {
                field: "plannedDurationSec".to_string(),
                message: format!(
                    "must be in (0, {}]",
                    self.config.max_duration.as_secs()
                ),
            }));
        }

        let now = self.clock.now();
        let session = FocusSession::new(
            Identifier::new(),
            user_id,
            hive_id,
            template_id,
            session_type,
            planned_duration_sec,
            now,
        );
        self.store
            .insert(session.id, session.clone())
            .await
            .map_err(CoreError::from)?;

        self.reschedule(session.id, session.expires_at);
        info!(session_id = %session.id, %user_id, "focus session started");
        self.publish(&session, TimerDeltaKind::Started).await;
        Ok(session)
    }

    /// `remainingSec = max(0, expiresAt - now)`; only valid from RUNNING.
    pub async fn pause(self: &Arc<Self>, session_id: Identifier) -> Result<FocusSession, CoreError> {
        let (version, mut session) = self.read(session_id).await?;
        if session.state != SessionState::Running {
            return Err(CoreError::Validation(ValidationFailure::InvariantViolated(format!(
                "cannot pause a session in state {:?}",
                session.state
            ))));
        }

        let now = self.clock.now();
        let remaining = (session.expires_at - now).num_seconds().max(0) as u32;
        session.remaining_sec = remaining;
        session.paused_at = Some(now);
        session.resumes_at = None;
        session.pause_count += 1;
        session.state = SessionState::Paused;

        self.store
            .update_if_version(&session_id, version, session.clone())
            .await
            .map_err(CoreError::from)?;
        self.cancel_schedule(session_id);
        self.publish(&session, TimerDeltaKind::Paused).await;
        Ok(session)
    }

    /// Re-enters RUNNING with `expiresAt = now + remainingSec`.
    pub async fn resume(self: &Arc<Self>, session_id: Identifier) -> Result<FocusSession, CoreError> {
        let (version, mut session) = self.read(session_id).await?;
        if session.state != SessionState::Paused {
            return Err(CoreError::Validation(ValidationFailure::InvariantViolated(format!(
                "cannot resume a session in state {:?}",
                session.state
            ))));
        }

        let now = self.clock.now();
        session.expires_at = now + chrono::Duration::seconds(session.remaining_sec as i64);
        session.paused_at = None;
        session.resumes_at = Some(now);
        session.state = SessionState::Running;

        self.store
            .update_if_version(&session_id, version, session.clone())
            .await
            .map_err(CoreError::from)?;
        self.reschedule(session_id, session.expires_at);
        self.publish(&session, TimerDeltaKind::Resumed).await;
        Ok(session)
    }

    /// Cancels from RUNNING or PAUSED. Idempotent: cancelling an
    /// already-terminal session is a no-op that returns the existing state.
    pub async fn cancel(self: &Arc<Self>, session_id: Identifier) -> Result<FocusSession, CoreError> {
        let (version, mut session) = self.read(session_id).await?;
        if session.state.is_terminal() {
            return Ok(session);
        }

        session.state = SessionState::Cancelled;
        self.store
            .update_if_version(&session_id, version, session.clone())
            .await
            .map_err(CoreError::from)?;
        self.cancel_schedule(session_id);
        self.publish(&session, TimerDeltaKind::Cancelled).await;
        Ok(session)
    }

    pub async fn record_distraction(self: &Arc<Self>, session_id: Identifier) -> Result<FocusSession, CoreError> {
        let (version, mut session) = self.read(session_id).await?;
        if session.state.is_terminal() {
            return Ok(session);
        }
        session.distraction_count += 1;
        self.store
            .update_if_version(&session_id, version, session.clone())
            .await
            .map_err(CoreError::from)?;
        Ok(session)
    }

    /// Explicit completion request (e.g. the caller ends the session
    /// early). Shares the scoring/terminal-state logic with scheduled
    /// expiry firing.
    pub async fn complete(self: &Arc<Self>, session_id: Identifier) -> Result<FocusSession, CoreError> {
        let (version, session) = self.read(session_id).await?;
        self.finish(session_id, version, session).await
    }

    /// Invoked by the scheduler at `expiresAt`. Re-reads state since
    /// another node may have paused or cancelled the session in the
    /// meantime; only finishes if still RUNNING and actually due.
    async fn fire_expiry(self: &Arc<Self>, session_id: Identifier) -> Result<(), CoreError> {
        let (version, session) = self.read(session_id).await?;
        if session.state != SessionState::Running {
            return Ok(());
        }
        if session.expires_at > self.clock.now() {
            return Ok(());
        }
        self.finish(session_id, version, session).await?;
        Ok(())
    }

    /// Startup reconciliation: completes any session left RUNNING past its
    /// `expiresAt`, in case a scheduled firing was missed across a restart.
    pub async fn reconcile_overdue(self: &Arc<Self>) -> Result<usize, CoreError> {
        let now = self.clock.now();
        let all = self.store.scan().await.map_err(CoreError::from)?;
        let mut reconciled = 0;
        for session in all {
            if session.state == SessionState::Running && session.expires_at < now {
                if let Ok((version, current)) = self.read(session.id).await {
                    self.finish(session.id, version, current).await?;
                    reconciled += 1;
                }
            } else if session.state == SessionState::Running {
                self.reschedule(session.id, session.expires_at);
            }
        }
        Ok(reconciled)
    }

    /// Terminal transition shared by explicit `complete` and scheduled
    /// expiry: idempotently rejects a duplicate completion on an
    /// already-terminal session, otherwise computes the productivity
    /// score and lands on COMPLETED (goal reached) or EXPIRED.
    async fn finish(
        self: &Arc<Self>,
        session_id: Identifier,
        version: u64,
        mut session: FocusSession,
    ) -> Result<FocusSession, CoreError> {
        if session.state.is_terminal() {
            return Ok(session);
        }

        let now = self.clock.now();
        if session.state == SessionState::Running {
            session.remaining_sec = (session.expires_at - now).num_seconds().max(0) as u32;
        }

        let base_completion =
            session.elapsed_focus_sec() as f64 / session.planned_duration_sec.max(1) as f64;
        let score = productivity_score(base_completion, session.distraction_count, session.pause_count);

        session.productivity_score = Some(score);
        let (kind, new_state) = if base_completion >= 1.0 {
            (TimerDeltaKind::Completed, SessionState::Completed)
        } else {
            (TimerDeltaKind::Expired, SessionState::Expired)
        };
        session.state = new_state;

        self.store
            .update_if_version(&session_id, version, session.clone())
            .await
            .map_err(CoreError::from)?;
        self.cancel_schedule(session_id);
        debug!(%session_id, ?new_state, score, "focus session finished");
        self.publish(&session, kind).await;
        Ok(session)
    }

    pub async fn get(&self, session_id: Identifier) -> Result<FocusSession, CoreError> {
        Ok(self.read(session_id).await?.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::NullPublisher;
    use crate::kernel::{FakeClock, InMemoryTxnalStore, TokioScheduler};

    fn core() -> (Arc<TimerCore>, Arc<FakeClock>) {
        let clock = Arc::new(FakeClock::new(chrono::Utc::now()));
        let store: Arc<dyn TxnalStore<Identifier, FocusSession>> =
            Arc::new(InMemoryTxnalStore::default());
        let core = TimerCore::new(
            TimerConfig {
                max_duration: std::time::Duration::from_secs(4 * 3600),
                reconcile_interval: std::time::Duration::from_secs(60),
            },
            store,
            Arc::new(NullPublisher),
            clock.clone(),
            Arc::new(TokioScheduler::new()),
        );
        (core, clock)
    }

    #[tokio::test]
    async fn pause_then_resume_preserves_remaining_time() {
        let (core, clock) = core();
        let user = Identifier::new();
        let session = core
            .start(user, None, None, SessionType::Individual, 1500)
            .await
            .unwrap();

        clock.advance(chrono::Duration::seconds(300));
        let paused = core.pause(session.id).await.unwrap();
        assert_eq!(paused.remaining_sec, 1200);

        clock.advance(chrono::Duration::seconds(700));
        let resumed = core.resume(session.id).await.unwrap();
        assert_eq!(resumed.expires_at, clock.now() + chrono::Duration::seconds(1200));
    }

    #[tokio::test]
    async fn completes_at_expiry_with_high_score_when_no_distractions() {
        let (core, clock) = core();
        let user = Identifier::new();
        let session = core
            .start(user, None, None, SessionType::Individual, 1500)
            .await
            .unwrap();

        clock.advance(chrono::Duration::seconds(300));
        let paused = core.pause(session.id).await.unwrap();
        assert_eq!(paused.remaining_sec, 1200);

        clock.advance(chrono::Duration::seconds(700));
        core.resume(session.id).await.unwrap();

        clock.advance(chrono::Duration::seconds(1200));
        let (version, current) = core.read(session.id).await.unwrap();
        let finished = core.finish(session.id, version, current).await.unwrap();
        assert_eq!(finished.state, SessionState::Completed);
        assert!(finished.productivity_score.unwrap() >= 90);
    }

    #[tokio::test]
    async fn duplicate_completion_is_a_no_op() {
        let (core, clock) = core();
        let user = Identifier::new();
        let session = core
            .start(user, None, None, SessionType::Individual, 600)
            .await
            .unwrap();
        clock.advance(chrono::Duration::seconds(600));

        let first = core.complete(session.id).await.unwrap();
        let second = core.complete(session.id).await.unwrap();
        assert_eq!(first.state, second.state);
        assert_eq!(first.productivity_score, second.productivity_score);
    }

    #[tokio::test]
    async fn early_complete_before_goal_reached_lands_on_expired() {
        let (core, _clock) = core();
        let user = Identifier::new();
        let session = core
            .start(user, None, None, SessionType::Individual, 1500)
            .await
            .unwrap();

        let finished = core.complete(session.id).await.unwrap();
        assert_eq!(finished.state, SessionState::Expired);
    }

    #[tokio::test]
    async fn productivity_score_clamps_with_many_distractions() {
        let (core, clock) = core();
        let user = Identifier::new();
        let session = core
            .start(user, None, None, SessionType::Individual, 600)
            .await
            .unwrap();
        for _ in 0..20 {
            core.record_distraction(session.id).await.unwrap();
        }
        clock.advance(chrono::Duration::seconds(600));
        let finished = core.complete(session.id).await.unwrap();
        assert_eq!(finished.state, SessionState::Completed);
        assert!(finished.productivity_score.unwrap() >= 0);
        assert!(finished.productivity_score.unwrap() <= 100);
    }

    #[tokio::test]
    async fn reconcile_overdue_completes_sessions_missed_across_a_restart() {
        let (core, clock) = core();
        let user = Identifier::new();
        let session = core
            .start(user, None, None, SessionType::Individual, 600)
            .await
            .unwrap();
        clock.advance(chrono::Duration::seconds(900));

        let reconciled = core.reconcile_overdue().await.unwrap();
        assert_eq!(reconciled, 1);
        let current = core.get(session.id).await.unwrap();
        assert_eq!(current.state, SessionState::Completed);
    }
}

#[cfg(test)]
mod scoring_proptests {
    use proptest::prelude::*;

    use super::productivity_score;

    proptest! {
        #[test]
        fn productivity_score_never_leaves_its_documented_range(
            base_completion in -1.0f64..2.0,
            distraction_count in 0u32..200,
            pause_count in 0u32..200,
        ) {
            let score = productivity_score(base_completion, distraction_count, pause_count);
            prop_assert!(score <= 100);
        }

        #[test]
        fn more_distractions_never_improve_the_score(
            base_completion in 0.0f64..1.5,
            low in 0u32..20,
            extra in 0u32..20,
            pause_count in 0u32..20,
        ) {
            let high = low + extra;
            let a = productivity_score(base_completion, low, pause_count);
            let b = productivity_score(base_completion, high, pause_count);
            prop_assert!(b <= a);
        }
    }
}
