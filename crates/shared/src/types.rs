//! Common types used across Supportly

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Platform role of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    SupportAgent,
    Admin,
}

impl Default for Role {
    fn default() -> Self {
        Self::Customer
    }
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::SupportAgent => "support_agent",
            Self::Admin => "admin",
        }
    }

    /// Only support agents are eligible to be assigned to sessions
    pub fn can_take_sessions(&self) -> bool {
        matches!(self, Self::SupportAgent)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "support_agent" => Ok(Self::SupportAgent),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Lifecycle status of a support session
///
/// ```text
/// pending ──> active ──> resolved | closed | escalated
///    │                                  │
///    └──> closed          escalated ──> active | resolved | closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Active,
    Resolved,
    Closed,
    Escalated,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
            Self::Escalated => "escalated",
        }
    }

    /// Check whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Pending, Active)
                | (Pending, Closed)
                | (Active, Resolved)
                | (Active, Closed)
                | (Active, Escalated)
                | (Escalated, Active)
                | (Escalated, Resolved)
                | (Escalated, Closed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Closed)
    }

    /// A live session can still be joined and still holds a team slot
    pub fn is_live(&self) -> bool {
        !self.is_terminal()
    }

    /// Statuses a call may end in
    pub fn is_call_outcome(&self) -> bool {
        matches!(self, Self::Resolved | Self::Closed | Self::Escalated)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of entries written to a session's timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TimelineEvent {
    Booked,
    AgentAssigned,
    StatusChanged,
    CallStarted,
    ParticipantJoined,
    ParticipantLeft,
    CallEnded,
}

// =============================================================================
// Records
// =============================================================================

/// Platform user
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub team_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Support team with an availability window and a concurrent-session capacity
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    /// First UTC hour (0-23) the team takes sessions
    pub available_from_hour: i16,
    /// UTC hour (0-23) the window closes, exclusive; may be lower than
    /// `available_from_hour` for windows that wrap past midnight
    pub available_until_hour: i16,
    pub max_concurrent_sessions: i32,
    pub active_sessions: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Team {
    /// Whether the team's availability window covers the hour of `at` (UTC)
    pub fn is_open_at(&self, at: OffsetDateTime) -> bool {
        let hour = i16::from(at.to_offset(time::UtcOffset::UTC).hour());
        let (from, until) = (self.available_from_hour, self.available_until_hour);

        if from == until {
            // Equal bounds means round-the-clock coverage
            true
        } else if from < until {
            hour >= from && hour < until
        } else {
            hour >= from || hour < until
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.active_sessions < self.max_concurrent_sessions
    }

    pub fn free_slots(&self) -> i32 {
        (self.max_concurrent_sessions - self.active_sessions).max(0)
    }
}

/// Pick the team that should take a session starting at `at`.
///
/// Only teams open at `at` with spare capacity qualify; the one with the most
/// free slots wins, ties broken by name.
pub fn select_team(teams: &[Team], at: OffsetDateTime) -> Option<&Team> {
    teams
        .iter()
        .filter(|t| t.is_open_at(at) && t.has_capacity())
        .max_by(|a, b| {
            a.free_slots()
                .cmp(&b.free_slots())
                .then_with(|| b.name.cmp(&a.name))
        })
}

/// Video-call sub-record of a session
#[derive(Debug, Clone, Default, Serialize)]
pub struct VideoCall {
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub ended_at: Option<OffsetDateTime>,
    pub summary: Option<String>,
}

impl VideoCall {
    pub fn duration_seconds(&self) -> Option<i64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) if end >= start => Some((end - start).whole_seconds()),
            _ => None,
        }
    }
}

/// A booked support engagement between a customer and an agent
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub customer_id: Uuid,
    pub agent_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub status: SessionStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_at: OffsetDateTime,
    pub duration_minutes: i32,
    pub video_call: Option<VideoCall>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Session {
    /// Whether `user_id` is the customer or the assigned agent
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.customer_id == user_id || self.agent_id == Some(user_id)
    }

    /// Customer and agent IDs, agent omitted if unassigned
    pub fn participant_ids(&self) -> Vec<Uuid> {
        let mut ids = vec![self.customer_id];
        ids.extend(self.agent_id);
        ids
    }
}

/// Database row backing [`Session`]
#[derive(Debug, FromRow)]
pub struct SessionRow {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub customer_id: Uuid,
    pub agent_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub status: SessionStatus,
    pub scheduled_at: OffsetDateTime,
    pub duration_minutes: i32,
    pub call_started_at: Option<OffsetDateTime>,
    pub call_ended_at: Option<OffsetDateTime>,
    pub call_summary: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        let video_call = if row.call_started_at.is_some() || row.call_ended_at.is_some() {
            Some(VideoCall {
                started_at: row.call_started_at,
                ended_at: row.call_ended_at,
                summary: row.call_summary,
            })
        } else {
            None
        };

        Session {
            id: row.id,
            title: row.title,
            description: row.description,
            customer_id: row.customer_id,
            agent_id: row.agent_id,
            team_id: row.team_id,
            status: row.status,
            scheduled_at: row.scheduled_at,
            duration_minutes: row.duration_minutes,
            video_call,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Chat message pushed onto a session
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SessionMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Append-only timeline entry
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TimelineEntry {
    pub id: Uuid,
    pub session_id: Uuid,
    pub event: TimelineEvent,
    pub actor_id: Option<Uuid>,
    pub detail: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Transcribed speech segment
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TranscriptEntry {
    pub id: Uuid,
    pub session_id: Uuid,
    pub speaker_id: Uuid,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn team(name: &str, from: i16, until: i16, max: i32, active: i32) -> Team {
        Team {
            id: Uuid::new_v4(),
            name: name.to_string(),
            available_from_hour: from,
            available_until_hour: until,
            max_concurrent_sessions: max,
            active_sessions: active,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn test_status_transitions() {
        use SessionStatus::*;

        assert!(Pending.can_transition_to(Active));
        assert!(Pending.can_transition_to(Closed));
        assert!(Active.can_transition_to(Escalated));
        assert!(Escalated.can_transition_to(Resolved));

        assert!(!Pending.can_transition_to(Resolved));
        assert!(!Resolved.can_transition_to(Active));
        assert!(!Closed.can_transition_to(Pending));
        assert!(!Active.can_transition_to(Active));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(SessionStatus::Resolved.is_terminal());
        assert!(SessionStatus::Closed.is_terminal());
        assert!(SessionStatus::Escalated.is_live());
        assert!(!SessionStatus::Pending.is_call_outcome());
    }

    #[test]
    fn test_team_window_daytime() {
        let t = team("day", 9, 17, 3, 0);
        assert!(t.is_open_at(datetime!(2025-03-03 09:00 UTC)));
        assert!(t.is_open_at(datetime!(2025-03-03 16:59 UTC)));
        assert!(!t.is_open_at(datetime!(2025-03-03 17:00 UTC)));
        assert!(!t.is_open_at(datetime!(2025-03-03 03:00 UTC)));
    }

    #[test]
    fn test_team_window_wraps_midnight() {
        let t = team("night", 22, 6, 3, 0);
        assert!(t.is_open_at(datetime!(2025-03-03 23:30 UTC)));
        assert!(t.is_open_at(datetime!(2025-03-03 02:00 UTC)));
        assert!(!t.is_open_at(datetime!(2025-03-03 12:00 UTC)));
    }

    #[test]
    fn test_team_window_uses_utc_hour() {
        let t = team("day", 9, 17, 3, 0);
        // 10:00 at +05:00 is 05:00 UTC
        assert!(!t.is_open_at(datetime!(2025-03-03 10:00 +5)));
    }

    #[test]
    fn test_select_team_prefers_free_capacity() {
        let teams = vec![
            team("alpha", 0, 0, 4, 3),
            team("bravo", 0, 0, 4, 1),
            team("full", 0, 0, 2, 2),
        ];
        let picked = select_team(&teams, datetime!(2025-03-03 12:00 UTC)).unwrap();
        assert_eq!(picked.name, "bravo");
    }

    #[test]
    fn test_select_team_skips_closed_and_full() {
        let teams = vec![team("closed", 9, 17, 4, 0), team("full", 0, 0, 1, 1)];
        assert!(select_team(&teams, datetime!(2025-03-03 20:00 UTC)).is_none());
    }

    #[test]
    fn test_select_team_tie_breaks_by_name() {
        let teams = vec![team("zulu", 0, 0, 2, 0), team("echo", 0, 0, 2, 0)];
        let picked = select_team(&teams, datetime!(2025-03-03 12:00 UTC)).unwrap();
        assert_eq!(picked.name, "echo");
    }

    #[test]
    fn test_video_call_duration() {
        let call = VideoCall {
            started_at: Some(datetime!(2025-03-03 12:00 UTC)),
            ended_at: Some(datetime!(2025-03-03 12:25:30 UTC)),
            summary: None,
        };
        assert_eq!(call.duration_seconds(), Some(1530));
        assert_eq!(VideoCall::default().duration_seconds(), None);
    }

    #[test]
    fn test_role_parsing_and_eligibility() {
        assert_eq!("support_agent".parse::<Role>().unwrap(), Role::SupportAgent);
        assert!("superuser".parse::<Role>().is_err());
        assert!(Role::SupportAgent.can_take_sessions());
        assert!(!Role::Admin.can_take_sessions());
    }

    #[test]
    fn test_status_serde_lowercase() {
        let json = serde_json::to_string(&SessionStatus::Escalated).unwrap();
        assert_eq!(json, r#""escalated""#);
        let status: SessionStatus = serde_json::from_str(r#""resolved""#).unwrap();
        assert_eq!(status, SessionStatus::Resolved);
    }
}
