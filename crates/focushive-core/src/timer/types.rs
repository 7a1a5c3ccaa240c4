use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::kernel::Identifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionType {
    Individual,
    HiveShared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Running,
    Paused,
    Completed,
    Cancelled,
    Expired,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Cancelled | SessionState::Expired
        )
    }
}

/// A timer template: the planned focus/break cadence a session is started
/// from. System templates are immutable and shared across users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerTemplate {
    pub id: Identifier,
    pub owner_user_id: Option<Identifier>,
    pub name: String,
    pub focus_sec: u32,
    pub short_break_sec: u32,
    pub long_break_sec: u32,
    pub cycles: u32,
    pub is_system: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FocusSession {
    pub id: Identifier,
    pub user_id: Identifier,
    pub hive_id: Option<Identifier>,
    pub template_id: Option<Identifier>,
    pub session_type: SessionType,
    pub state: SessionState,
    pub planned_duration_sec: u32,
    pub remaining_sec: u32,
    pub started_at: DateTime<Utc>,
    pub paused_at: Option<DateTime<Utc>>,
    pub resumes_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub distraction_count: u32,
    pub pause_count: u32,
    pub productivity_score: Option<u8>,
}

impl FocusSession {
    pub fn new(
        id: Identifier,
        user_id: Identifier,
        hive_id: Option<Identifier>,
        template_id: Option<Identifier>,
        session_type: SessionType,
        planned_duration_sec: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            hive_id,
            template_id,
            session_type,
            state: SessionState::Running,
            planned_duration_sec,
            remaining_sec: planned_duration_sec,
            started_at: now,
            paused_at: None,
            resumes_at: None,
            expires_at: now + chrono::Duration::seconds(planned_duration_sec as i64),
            distraction_count: 0,
            pause_count: 0,
            productivity_score: None,
        }
    }

    pub fn elapsed_focus_sec(&self) -> u32 {
        self.planned_duration_sec.saturating_sub(self.remaining_sec)
    }
}
