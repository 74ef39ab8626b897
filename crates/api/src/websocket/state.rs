//! Global WebSocket state management
//!
//! Maintains global state for all WebSocket connections and session rooms.

use std::collections::HashMap;
use std::sync::Arc;
use supportly_shared::Session;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::connection::Connection;
use super::events::ServerEvent;
use super::room::RoomManager;

/// Global WebSocket state shared across all connections
#[derive(Clone)]
pub struct WebSocketState {
    /// All active connections indexed by connection_id
    pub connections: Arc<RwLock<HashMap<Uuid, Arc<Connection>>>>,

    /// Room manager for session rooms
    pub rooms: Arc<RoomManager>,
}

impl WebSocketState {
    /// Create new WebSocket state
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            rooms: Arc::new(RoomManager::new()),
        }
    }

    /// Add a connection
    pub async fn add_connection(&self, conn: Connection) -> Arc<Connection> {
        let conn = Arc::new(conn);
        let mut connections = self.connections.write().await;
        connections.insert(conn.connection_id, Arc::clone(&conn));

        tracing::info!(
            connection_id = %conn.connection_id,
            session_id = %conn.session_id,
            user_id = %conn.user_id,
            total_connections = connections.len(),
            "WebSocket connection added"
        );

        conn
    }

    /// Remove a connection from the registry and its session room.
    ///
    /// Returns the connections left in the room.
    pub async fn remove_connection(&self, conn: &Connection) -> Vec<Arc<Connection>> {
        let removed = self.connections.write().await.remove(&conn.connection_id);
        let remaining = self.rooms.leave(&conn.session_id, &conn.connection_id).await;

        if removed.is_some() {
            tracing::info!(
                connection_id = %conn.connection_id,
                session_id = %conn.session_id,
                user_id = %conn.user_id,
                "WebSocket connection removed"
            );
        }
        remaining
    }

    /// Announce the end of a call to everyone in the session room, then
    /// remove the room and disconnect its connections.
    ///
    /// A terminal session is sealed so late joins are refused; an escalated
    /// session may be joined again. Returns the number of connections closed.
    pub async fn close_session(&self, session: &Session) -> usize {
        let summary = session.video_call.as_ref().and_then(|c| c.summary.clone());
        self.rooms
            .broadcast(
                &session.id,
                ServerEvent::CallEnded {
                    session_id: session.id,
                    status: session.status,
                    summary,
                },
            )
            .await;

        let conns = if session.status.is_terminal() {
            self.rooms.end(&session.id).await
        } else {
            self.rooms.close(&session.id).await
        };
        for conn in &conns {
            conn.disconnect();
        }
        conns.len()
    }

    /// Ask every connection to close (server shutdown)
    pub async fn disconnect_all(&self) {
        let connections = self.connections.read().await;
        for conn in connections.values() {
            conn.disconnect();
        }
        if !connections.is_empty() {
            tracing::info!(count = connections.len(), "Disconnecting all WebSocket connections");
        }
    }

    /// Get total number of active connections
    pub async fn connection_count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }

    /// Get statistics about the WebSocket state
    pub async fn get_stats(&self) -> WebSocketStats {
        let connection_count = self.connection_count().await;
        let room_count = self.rooms.get_room_count().await;

        WebSocketStats {
            active_connections: connection_count,
            active_rooms: room_count,
        }
    }
}

impl Default for WebSocketState {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about WebSocket connections
#[derive(Debug, Clone, serde::Serialize)]
pub struct WebSocketStats {
    /// Number of active connections
    pub active_connections: usize,
    /// Number of sessions with at least one participant connected
    pub active_rooms: usize,
}
