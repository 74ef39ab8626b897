//! Support session routes
//!
//! Booking picks a team that is open at the requested time and has a free
//! slot, reserves that slot, assigns the least busy agent of the team and
//! schedules the confirmation and reminder emails.

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use supportly_shared::{
    queue::reminder_run_at, select_team, store, store::NewSession, JobKind, Role, Session,
    SessionMessage, SessionStatus, TimelineEntry, TranscriptEntry,
};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
    websocket::{events::ServerEvent, handler::validate_chat_content},
};

pub const MIN_DURATION_MINUTES: i32 = 15;
pub const MAX_DURATION_MINUTES: i32 = 240;
const MAX_TITLE_LENGTH: usize = 200;
const MAX_DESCRIPTION_LENGTH: usize = 4000;

/// Attempts at reserving a team slot when concurrent bookings take the
/// selected team's last slot first
const RESERVE_ATTEMPTS: usize = 3;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct BookSessionRequest {
    pub title: String,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_at: OffsetDateTime,
    pub duration_minutes: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: SessionStatus,
}

#[derive(Debug, Deserialize)]
pub struct AssignAgentRequest {
    pub agent_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct SessionDetailResponse {
    #[serde(flatten)]
    pub session: Session,
    pub messages: Vec<SessionMessage>,
    pub timeline: Vec<TimelineEntry>,
    pub transcript: Vec<TranscriptEntry>,
}

// =============================================================================
// Handlers
// =============================================================================

/// List sessions visible to the caller
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Session>>> {
    let sessions = store::list_sessions_for(&state.pool, auth_user.user_id, auth_user.role).await?;
    Ok(Json(sessions))
}

/// Book a new support session
pub async fn book_session(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<BookSessionRequest>,
) -> ApiResult<(StatusCode, Json<Session>)> {
    auth_user.require_role(&[Role::Customer, Role::Admin])?;

    let now = OffsetDateTime::now_utc();
    let (title, description) = validate_booking(&req, now)?;

    let team_id = reserve_team(&state, req.scheduled_at).await?;

    let agent_id = match store::pick_agent(&state.pool, team_id).await {
        Ok(agent_id) => agent_id,
        Err(e) => {
            release_slot(&state, team_id).await;
            return Err(e.into());
        }
    };

    let new_session = NewSession {
        title,
        description,
        customer_id: auth_user.user_id,
        agent_id,
        team_id: Some(team_id),
        scheduled_at: req.scheduled_at,
        duration_minutes: req.duration_minutes,
    };

    let session = match store::insert_session(&state.pool, new_session).await {
        Ok(session) => session,
        Err(e) => {
            release_slot(&state, team_id).await;
            return Err(e.into());
        }
    };

    if agent_id.is_none() {
        tracing::warn!(
            session_id = %session.id,
            team_id = %team_id,
            "Team has no support agents; session booked unassigned"
        );
    }

    tracing::info!(
        session_id = %session.id,
        customer_id = %auth_user.user_id,
        team_id = %team_id,
        scheduled_at = %session.scheduled_at,
        "Session booked"
    );

    schedule_booking_jobs(&state, &session, now).await;

    Ok((StatusCode::CREATED, Json(session)))
}

/// Session with its chat, timeline and transcript
pub async fn get_session(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<SessionDetailResponse>> {
    let session = load_visible_session(&state, &auth_user, session_id).await?;

    let pool = &state.pool;
    let (messages, timeline, transcript) = tokio::try_join!(
        store::list_messages(pool, session_id),
        store::list_timeline(pool, session_id),
        store::list_transcript(pool, session_id),
    )?;

    Ok(Json(SessionDetailResponse {
        session,
        messages,
        timeline,
        transcript,
    }))
}

/// Move a session to a new status
///
/// Agents and admins manage status; a customer may only close their own
/// session. Ending a session with a call in progress disconnects both
/// participants.
pub async fn update_status(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> ApiResult<Json<Session>> {
    let session = load_visible_session(&state, &auth_user, session_id).await?;

    if auth_user.role == Role::Customer && req.status != SessionStatus::Closed {
        return Err(ApiError::Forbidden);
    }

    let updated = store::set_status(&state.pool, session.id, req.status, Some(auth_user.user_id)).await?;

    tracing::info!(
        session_id = %session_id,
        from = %session.status,
        to = %updated.status,
        actor = %auth_user.user_id,
        "Session status changed"
    );

    if updated.status.is_terminal() {
        state.ws_state.close_session(&updated).await;
    }

    Ok(Json(updated))
}

/// Assign (or reassign) the support agent of a session
pub async fn assign_agent(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<AssignAgentRequest>,
) -> ApiResult<Json<Session>> {
    auth_user.require_admin()?;

    let session =
        store::assign_agent(&state.pool, session_id, req.agent_id, Some(auth_user.user_id)).await?;

    tracing::info!(
        session_id = %session_id,
        agent_id = %req.agent_id,
        "Session agent assigned"
    );

    Ok(Json(session))
}

/// Append a chat message outside the call
pub async fn post_message(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<PostMessageRequest>,
) -> ApiResult<(StatusCode, Json<SessionMessage>)> {
    let session = load_visible_session(&state, &auth_user, session_id).await?;

    let content = validate_chat_content(&req.content)
        .map_err(|reason| ApiError::Validation(reason.to_string()))?;

    let message = store::append_message(&state.pool, session.id, auth_user.user_id, content).await?;

    if session.status.is_live() {
        state
            .ws_state
            .rooms
            .broadcast(
                &session.id,
                ServerEvent::ChatMessage {
                    message: message.clone(),
                },
            )
            .await;
    }

    Ok((StatusCode::CREATED, Json(message)))
}

// =============================================================================
// Helpers
// =============================================================================

/// Check booking input, returning the trimmed title and description
fn validate_booking(
    req: &BookSessionRequest,
    now: OffsetDateTime,
) -> ApiResult<(String, Option<String>)> {
    let title = req.title.trim();
    if title.is_empty() || title.chars().count() > MAX_TITLE_LENGTH {
        return Err(ApiError::Validation(format!(
            "Title must be between 1 and {MAX_TITLE_LENGTH} characters"
        )));
    }

    let description = req
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty());
    if description.is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_LENGTH) {
        return Err(ApiError::Validation(format!(
            "Description must be at most {MAX_DESCRIPTION_LENGTH} characters"
        )));
    }

    if req.scheduled_at <= now {
        return Err(ApiError::Validation(
            "Session must be scheduled in the future".to_string(),
        ));
    }

    if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&req.duration_minutes) {
        return Err(ApiError::Validation(format!(
            "Duration must be between {MIN_DURATION_MINUTES} and {MAX_DURATION_MINUTES} minutes"
        )));
    }

    Ok((title.to_string(), description.map(str::to_string)))
}

/// Select a team for `scheduled_at` and take one of its slots
async fn reserve_team(state: &AppState, scheduled_at: OffsetDateTime) -> ApiResult<Uuid> {
    for _ in 0..RESERVE_ATTEMPTS {
        let teams = store::list_teams(&state.pool).await?;
        let Some(team) = select_team(&teams, scheduled_at) else {
            return Err(ApiError::NoCapacity(
                "No support team is available at that time".to_string(),
            ));
        };

        if store::reserve_team_slot(&state.pool, team.id).await? {
            return Ok(team.id);
        }

        tracing::debug!(team_id = %team.id, "Team slot taken concurrently, retrying");
    }

    Err(ApiError::NoCapacity(
        "All support teams are fully booked".to_string(),
    ))
}

async fn release_slot(state: &AppState, team_id: Uuid) {
    if let Err(e) = store::release_team_slot(&state.pool, team_id).await {
        tracing::error!(team_id = %team_id, error = %e, "Failed to release team slot");
    }
}

/// Queue the confirmation email now and the reminder 15 minutes before start.
///
/// The booking stands even if the queue is unreachable.
async fn schedule_booking_jobs(state: &AppState, session: &Session, now: OffsetDateTime) {
    let session_id = session.id;

    if let Err(e) = state
        .queue
        .enqueue_now(JobKind::BookingConfirmation { session_id })
        .await
    {
        tracing::error!(session_id = %session_id, error = %e, "Failed to enqueue booking confirmation");
    }

    match reminder_run_at(session.scheduled_at, now) {
        Some(run_at) => {
            if let Err(e) = state
                .queue
                .enqueue(JobKind::SessionReminder { session_id }, run_at)
                .await
            {
                tracing::error!(session_id = %session_id, error = %e, "Failed to enqueue session reminder");
            }
        }
        None => {
            tracing::debug!(session_id = %session_id, "Session starts too soon for a reminder");
        }
    }
}

/// Load a session the caller may see: participants and admins
async fn load_visible_session(
    state: &AppState,
    auth_user: &AuthUser,
    session_id: Uuid,
) -> ApiResult<Session> {
    let session = store::fetch_session(&state.pool, session_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    if !session.is_participant(auth_user.user_id) && !auth_user.role.is_admin() {
        // Hide existence from outsiders
        return Err(ApiError::NotFound);
    }

    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use time::Duration;

    const NOW: OffsetDateTime = datetime!(2025-03-03 10:00 UTC);

    fn request(scheduled_at: OffsetDateTime, duration_minutes: i32) -> BookSessionRequest {
        BookSessionRequest {
            title: "  Printer offline  ".to_string(),
            description: Some("   ".to_string()),
            scheduled_at,
            duration_minutes,
        }
    }

    #[test]
    fn test_valid_booking_trims_input() {
        let (title, description) =
            validate_booking(&request(NOW + Duration::hours(2), 30), NOW).unwrap();
        assert_eq!(title, "Printer offline");
        assert!(description.is_none());
    }

    #[test]
    fn test_booking_must_be_in_future() {
        assert!(matches!(
            validate_booking(&request(NOW, 30), NOW),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            validate_booking(&request(NOW - Duration::minutes(5), 30), NOW),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn test_booking_duration_bounds() {
        let at = NOW + Duration::days(1);
        assert!(validate_booking(&request(at, MIN_DURATION_MINUTES), NOW).is_ok());
        assert!(validate_booking(&request(at, MAX_DURATION_MINUTES), NOW).is_ok());
        assert!(validate_booking(&request(at, MIN_DURATION_MINUTES - 1), NOW).is_err());
        assert!(validate_booking(&request(at, MAX_DURATION_MINUTES + 1), NOW).is_err());
    }

    #[test]
    fn test_booking_title_required() {
        let mut req = request(NOW + Duration::hours(1), 30);
        req.title = "   ".to_string();
        assert!(matches!(
            validate_booking(&req, NOW),
            Err(ApiError::Validation(_))
        ));
    }
}
