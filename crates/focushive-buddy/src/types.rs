use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use focushive_core::Identifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartnershipStatus {
    Pending,
    Active,
    Paused,
    Ended,
}

impl PartnershipStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PartnershipStatus::Ended)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partnership {
    pub id: Identifier,
    pub user1_id: Identifier,
    pub user2_id: Identifier,
    pub status: PartnershipStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_reason: Option<String>,
    pub duration_days: u32,
    pub compatibility_score: f64,
    pub health_score: f64,
    pub last_interaction_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub version: u64,
}

impl Partnership {
    /// The unordered key two users share a partnership under, so lookup by
    /// either argument order returns the same record.
    pub fn pair_key(a: Identifier, b: Identifier) -> (Identifier, Identifier) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub fn involves(&self, user_id: Identifier) -> bool {
        self.user1_id == user_id || self.user2_id == user_id
    }

    pub fn other(&self, user_id: Identifier) -> Option<Identifier> {
        if self.user1_id == user_id {
            Some(self.user2_id)
        } else if self.user2_id == user_id {
            Some(self.user1_id)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckinKind {
    Daily,
    Weekly,
    Milestone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mood {
    Motivated,
    Focused,
    Stressed,
    Tired,
    Excited,
    Neutral,
    Frustrated,
    Accomplished,
}

impl Mood {
    /// Derived emotional score in [1, 10].
    pub fn emotional_score(self) -> u8 {
        match self {
            Mood::Accomplished => 10,
            Mood::Excited => 9,
            Mood::Motivated => 8,
            Mood::Focused => 7,
            Mood::Neutral => 5,
            Mood::Tired => 4,
            Mood::Stressed => 3,
            Mood::Frustrated => 2,
        }
    }

    pub fn negative(self) -> bool {
        matches!(self, Mood::Stressed | Mood::Tired | Mood::Frustrated)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkin {
    pub id: Identifier,
    pub partnership_id: Identifier,
    pub user_id: Identifier,
    pub kind: CheckinKind,
    pub content: String,
    pub mood: Mood,
    pub productivity_rating: Option<u8>,
    pub created_at: DateTime<Utc>,
}

impl Checkin {
    pub fn date(&self) -> NaiveDate {
        self.created_at.date_naive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoalStatus {
    InProgress,
    Completed,
    Paused,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: Identifier,
    pub partnership_id: Identifier,
    pub title: String,
    pub description: String,
    pub progress_pct: u8,
    pub status: GoalStatus,
    pub target_date: NaiveDate,
    pub created_by: Identifier,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub id: Identifier,
    pub goal_id: Identifier,
    pub title: String,
    pub target_date: NaiveDate,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<Identifier>,
    pub ordinal: u32,
}

impl Milestone {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Derived per `(partnershipId, userId)` from check-in completion, streak
/// length, and milestone completions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountabilityScore {
    pub partnership_id: Identifier,
    pub user_id: Identifier,
    pub score: f64,
}

/// A candidate surfaced by `findMatches`, scored and ordered descending;
/// ties broken by candidate id for reproducibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub user_id: Identifier,
    pub score: f64,
}

/// The inputs `findMatches`'s compatibility function scores over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchProfile {
    pub user_id: Identifier,
    pub focus_areas: Vec<String>,
    pub goals: Vec<String>,
    pub preferred_focus_hours: Vec<u8>,
    pub timezone_offset_minutes: i32,
    pub skill_level: u8,
}
