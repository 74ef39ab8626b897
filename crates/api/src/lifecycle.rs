//! Call termination
//!
//! Ending a call finalizes the session record, queues the summary email
//! and closes both sockets. It runs once per session: the store rejects a
//! second terminal transition, and the room is gone after the first close.

use supportly_shared::{store, JobKind, Session, SessionStatus, StoreError};
use uuid::Uuid;

use crate::ai::build_conversation;
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum CallEndError {
    #[error("A call cannot end as {0}")]
    InvalidOutcome(SessionStatus),
    #[error("Session not found")]
    NotFound,
    #[error("Session has already ended")]
    AlreadyEnded,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome requested by the caller, defaulting to `closed`
pub fn resolve_outcome(requested: Option<SessionStatus>) -> Result<SessionStatus, CallEndError> {
    match requested {
        None => Ok(SessionStatus::Closed),
        Some(status) if status.is_call_outcome() => Ok(status),
        Some(status) => Err(CallEndError::InvalidOutcome(status)),
    }
}

/// End the video call of `session_id` on behalf of `ended_by`.
pub async fn end_call(
    app_state: &AppState,
    session_id: Uuid,
    ended_by: Uuid,
    outcome: Option<SessionStatus>,
    summarize: bool,
) -> Result<Session, CallEndError> {
    let outcome = resolve_outcome(outcome)?;

    let session = store::fetch_session(&app_state.pool, session_id)
        .await?
        .ok_or(CallEndError::NotFound)?;
    if session.status.is_terminal() {
        return Err(CallEndError::AlreadyEnded);
    }

    let summary = if summarize && app_state.ai.is_enabled() {
        summarize_call(app_state, &session).await
    } else {
        None
    };

    let session = match store::finish_call(
        &app_state.pool,
        session_id,
        outcome,
        summary.as_deref(),
        ended_by,
    )
    .await
    {
        Ok(session) => session,
        // Lost a race with the other participant's end-call
        Err(StoreError::InvalidTransition { from, .. }) if from.is_terminal() => {
            return Err(CallEndError::AlreadyEnded)
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(
        session_id = %session_id,
        ended_by = %ended_by,
        outcome = %outcome,
        has_summary = summary.is_some(),
        "Call ended"
    );

    if let Err(e) = app_state
        .queue
        .enqueue_now(JobKind::CallSummary { session_id })
        .await
    {
        tracing::error!(session_id = %session_id, error = %e, "Failed to enqueue call summary email");
    }

    app_state.ws_state.close_session(&session).await;
    Ok(session)
}

async fn summarize_call(app_state: &AppState, session: &Session) -> Option<String> {
    let pool = &app_state.pool;
    let (transcript, messages) = match tokio::try_join!(
        store::list_transcript(pool, session.id),
        store::list_messages(pool, session.id)
    ) {
        Ok(logs) => logs,
        Err(e) => {
            tracing::error!(session_id = %session.id, error = %e, "Failed to load call logs for summary");
            return None;
        }
    };

    let conversation = build_conversation(session.customer_id, &transcript, &messages);
    match app_state.ai.summarize(&conversation).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::warn!(session_id = %session.id, error = %e, "Call summary generation failed");
            None
        }
    }
}
