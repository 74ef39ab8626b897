//! WebSocket handler for Axum
//!
//! Handles the signaling gateway: authentication, session authorization,
//! room membership and event routing.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::Response,
};
use futures::{stream::StreamExt, SinkExt};
use serde::Deserialize;
use supportly_shared::{store, Session, TimelineEvent};
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::auth::{authenticate_token, request_token, AuthUser};
use crate::error::ApiError;
use crate::lifecycle::{self, CallEndError};
use crate::state::AppState;

use super::{
    connection::Connection,
    events::{ClientEvent, ServerEvent},
    room::RoomManager,
    transcription::{decode_audio_chunk, spawn_transcriber, DEFAULT_AUDIO_MIME},
};

/// Longest accepted chat message, in characters
pub const MAX_CHAT_LENGTH: usize = 4000;

/// Time the writer gets to flush queued events after the socket loop ends
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    session_id: Uuid,
    /// Token for clients that cannot send the auth cookie
    token: Option<String>,
}

/// WebSocket handler - upgrades HTTP connection to WebSocket
///
/// Authenticates via the auth cookie, bearer header or `token` query
/// parameter, then checks the caller belongs to the session.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<WebSocketQuery>,
) -> Result<Response, ApiError> {
    let token = params
        .token
        .filter(|t| !t.is_empty())
        .or_else(|| request_token(&headers))
        .ok_or(ApiError::Unauthorized)?;

    let auth_user = authenticate_token(&app_state.auth_state(), &token).await?;

    let session = store::fetch_session(&app_state.pool, params.session_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    authorize_session(&auth_user, &session)?;

    tracing::info!(
        user_id = %auth_user.user_id,
        session_id = %session.id,
        "WebSocket connection upgrade requested"
    );

    // Base64 inflates audio by 4/3; leave headroom for the JSON envelope
    let max_message_size = app_state.config.ws_max_audio_chunk_bytes / 3 * 4 + 64 * 1024;

    Ok(ws
        .max_message_size(max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, auth_user, session, app_state)))
}

/// The customer, the assigned agent and admins may join a live session
fn authorize_session(auth_user: &AuthUser, session: &Session) -> Result<(), ApiError> {
    if !session.is_participant(auth_user.user_id) && !auth_user.role.is_admin() {
        tracing::warn!(
            user_id = %auth_user.user_id,
            session_id = %session.id,
            "WebSocket rejected: not a participant"
        );
        return Err(ApiError::Forbidden);
    }

    if session.status.is_terminal() {
        return Err(ApiError::Conflict(format!(
            "Session is already {}",
            session.status
        )));
    }

    Ok(())
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, auth_user: AuthUser, session: Session, app_state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let session_id = session.id;
    let user_id = auth_user.user_id;

    // Create channel for sending events to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let ws_state = app_state.ws_state.clone();
    let conn = ws_state
        .add_connection(Connection::new(user_id, auth_user.role, session_id, tx))
        .await;
    let connection_id = conn.connection_id;

    let room_size = match ws_state.rooms.join(session_id, Arc::clone(&conn)).await {
        Ok(room_size) => room_size,
        Err(e) => {
            ws_state.remove_connection(&conn).await;
            if let Ok(json) = serde_json::to_string(&ServerEvent::error(e.to_string())) {
                let _ = sender.send(Message::Text(json)).await;
            }
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    record_join(&app_state, session_id, user_id).await;

    // Send connection acknowledgment
    let _ = conn.send(ServerEvent::Connected {
        connection_id,
        session_id,
        peer_present: room_size > 1,
    });
    announce_join(&ws_state.rooms, &conn).await;

    // Spawn task to send messages to client
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            // Serialize and send event
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        return; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to serialize WebSocket event");
                }
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    // Handle incoming messages until the client leaves or the server closes us
    loop {
        let msg = tokio::select! {
            _ = conn.disconnected() => {
                tracing::debug!(connection_id = %connection_id, "Connection closed by server");
                break;
            }
            msg = receiver.next() => msg,
        };

        let Some(Ok(msg)) = msg else {
            break;
        };

        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => handle_client_event(event, &conn, &app_state).await,
                Err(e) => {
                    tracing::warn!(
                        error = ?e,
                        connection_id = %connection_id,
                        "Failed to parse client event"
                    );
                    let _ = conn.send(ServerEvent::error("Invalid event format"));
                }
            },
            Message::Close(_) => {
                tracing::info!(connection_id = %connection_id, "WebSocket close frame received");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                // Axum handles ping/pong automatically
            }
            Message::Binary(_) => {
                let _ = conn.send(ServerEvent::error("Binary frames are not supported"));
            }
        }
    }

    // Cleanup on disconnect
    tracing::info!(
        connection_id = %connection_id,
        session_id = %session_id,
        user_id = %user_id,
        "WebSocket connection closing"
    );
    conn.stop_transcriber().await;
    let remaining = ws_state.remove_connection(&conn).await;

    for peer in &remaining {
        let _ = peer.send(ServerEvent::PeerLeft { user_id });
    }
    if let Err(e) = store::append_timeline(
        &app_state.pool,
        session_id,
        TimelineEvent::ParticipantLeft,
        Some(user_id),
        None,
    )
    .await
    {
        tracing::error!(session_id = %session_id, error = %e, "Failed to record participant leaving");
    }

    // Dropping the last sender lets the writer drain and send a close frame
    drop(conn);
    if tokio::time::timeout(WRITER_FLUSH_TIMEOUT, &mut send_task)
        .await
        .is_err()
    {
        send_task.abort();
    }
}

async fn record_join(app_state: &AppState, session_id: Uuid, user_id: Uuid) {
    match store::mark_call_started(&app_state.pool, session_id, user_id).await {
        Ok(true) => tracing::info!(session_id = %session_id, "Video call started"),
        Ok(false) => {}
        Err(e) => tracing::error!(session_id = %session_id, error = %e, "Failed to mark call started"),
    }

    if let Err(e) = store::append_timeline(
        &app_state.pool,
        session_id,
        TimelineEvent::ParticipantJoined,
        Some(user_id),
        None,
    )
    .await
    {
        tracing::error!(session_id = %session_id, error = %e, "Failed to record participant joining");
    }
}

/// Tell the peer, if any, who just joined
async fn announce_join(rooms: &RoomManager, conn: &Connection) -> bool {
    rooms
        .relay_to_peer(
            &conn.session_id,
            &conn.connection_id,
            ServerEvent::PeerJoined {
                user_id: conn.user_id,
                role: conn.role,
            },
        )
        .await
}

/// Forward a signaling event to the peer untouched, or tell the sender
/// nobody is there
async fn relay_signal(rooms: &RoomManager, conn: &Connection, event: ServerEvent) {
    if !rooms
        .relay_to_peer(&conn.session_id, &conn.connection_id, event)
        .await
    {
        let _ = conn.send(ServerEvent::error("Peer is not connected"));
    }
}

/// Trim a chat message and enforce its length limits
pub fn validate_chat_content(content: &str) -> Result<&str, &'static str> {
    let content = content.trim();
    if content.is_empty() {
        return Err("Message cannot be empty");
    }
    if content.chars().count() > MAX_CHAT_LENGTH {
        return Err("Message is too long");
    }
    Ok(content)
}

/// Handle client event
async fn handle_client_event(event: ClientEvent, conn: &Arc<Connection>, app_state: &AppState) {
    use ClientEvent::*;

    let rooms = &app_state.ws_state.rooms;
    let session_id = conn.session_id;

    match event {
        RtcSignal { signal } => {
            let event = ServerEvent::RtcSignal {
                from: conn.user_id,
                signal,
            };
            relay_signal(rooms, conn, event).await;
        }

        ReturnRtcSignal { signal } => {
            let event = ServerEvent::ReturnRtcSignal {
                from: conn.user_id,
                signal,
            };
            relay_signal(rooms, conn, event).await;
        }

        ChatMessage { content } => {
            let content = match validate_chat_content(&content) {
                Ok(content) => content,
                Err(reason) => {
                    let _ = conn.send(ServerEvent::error(reason));
                    return;
                }
            };

            match store::append_message(&app_state.pool, session_id, conn.user_id, content).await {
                Ok(message) => {
                    rooms
                        .broadcast(&session_id, ServerEvent::ChatMessage { message })
                        .await;
                }
                Err(e) => {
                    tracing::error!(session_id = %session_id, error = %e, "Failed to store chat message");
                    let _ = conn.send(ServerEvent::error("Failed to send message"));
                }
            }
        }

        EndCall { outcome, summarize } => {
            match lifecycle::end_call(app_state, session_id, conn.user_id, outcome, summarize).await {
                Ok(_) => {}
                Err(e @ CallEndError::InvalidOutcome(_)) | Err(e @ CallEndError::AlreadyEnded) => {
                    let _ = conn.send(ServerEvent::error(e.to_string()));
                }
                Err(e) => {
                    tracing::error!(session_id = %session_id, error = %e, "Failed to end call");
                    let _ = conn.send(ServerEvent::error("Failed to end call"));
                }
            }
        }

        StartTranscription { mime_type } => {
            if !app_state.ai.is_enabled() {
                let _ = conn.send(ServerEvent::error("Transcription is not available"));
                return;
            }

            // An already running transcriber keeps going
            if conn.transcriber().await.is_none() {
                let mime_type = mime_type
                    .filter(|m| m.starts_with("audio/"))
                    .unwrap_or_else(|| DEFAULT_AUDIO_MIME.to_string());
                let feed = spawn_transcriber(app_state.clone(), session_id, conn.user_id, mime_type);
                conn.start_transcriber(feed).await;
            }
            let _ = conn.send(ServerEvent::TranscriptionState { active: true });
        }

        AudioChunk { data } => {
            let Some(feed) = conn.transcriber().await else {
                let _ = conn.send(ServerEvent::error("Transcription has not been started"));
                return;
            };

            let chunk = match decode_audio_chunk(&data, app_state.config.ws_max_audio_chunk_bytes) {
                Ok(chunk) => chunk,
                Err(e) => {
                    let _ = conn.send(ServerEvent::error(e.to_string()));
                    return;
                }
            };

            match feed.try_send(chunk) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        connection_id = %conn.connection_id,
                        "Transcription queue full, dropping audio chunk"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    conn.stop_transcriber().await;
                    let _ = conn.send(ServerEvent::TranscriptionState { active: false });
                }
            }
        }

        StopTranscription => {
            conn.stop_transcriber().await;
            let _ = conn.send(ServerEvent::TranscriptionState { active: false });
        }

        Ping => {
            let _ = conn.send(ServerEvent::Pong);
        }
    }
}
