//! Session room management
//!
//! Each support session has one room holding at most two connections, one
//! per user: the customer and the agent (or an admin standing in). Signals
//! are relayed to the other member; chat, transcript and call-end events go
//! to both.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::connection::Connection;
use super::events::ServerEvent;

/// Maximum number of connections in one session room
pub const ROOM_CAPACITY: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("Session already has two participants")]
    Full,
    #[error("You are already connected to this session")]
    AlreadyJoined,
    #[error("Session has already ended")]
    Ended,
}

/// Manages session "rooms"
pub struct RoomManager {
    /// Map of session_id -> connections
    rooms: Arc<RwLock<HashMap<Uuid, Vec<Arc<Connection>>>>>,

    /// Sessions whose call ended while this process was running
    ended: Arc<RwLock<HashSet<Uuid>>>,
}

impl RoomManager {
    /// Create a new room manager
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            ended: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Add a connection to a session room.
    ///
    /// Returns the room size after the join.
    pub async fn join(&self, session_id: Uuid, conn: Arc<Connection>) -> Result<usize, RoomError> {
        let mut rooms = self.rooms.write().await;

        // Checked under the rooms lock so a join cannot slip in after `end`
        if self.ended.read().await.contains(&session_id) {
            tracing::warn!(
                session_id = %session_id,
                user_id = %conn.user_id,
                "Rejected join: session has ended"
            );
            return Err(RoomError::Ended);
        }

        let conns = rooms.entry(session_id).or_default();

        if conns.iter().any(|c| c.user_id == conn.user_id) {
            tracing::warn!(
                session_id = %session_id,
                user_id = %conn.user_id,
                "Rejected join: user already connected"
            );
            return Err(RoomError::AlreadyJoined);
        }

        if conns.len() >= ROOM_CAPACITY {
            tracing::warn!(
                session_id = %session_id,
                user_id = %conn.user_id,
                "Rejected join: room is full"
            );
            return Err(RoomError::Full);
        }

        conns.push(Arc::clone(&conn));
        let room_size = conns.len();

        tracing::debug!(
            session_id = %session_id,
            connection_id = %conn.connection_id,
            room_size,
            "Connection joined session room"
        );

        Ok(room_size)
    }

    /// Remove a connection from a session room.
    ///
    /// Returns the connections still in the room.
    pub async fn leave(&self, session_id: &Uuid, connection_id: &Uuid) -> Vec<Arc<Connection>> {
        let mut rooms = self.rooms.write().await;
        let Some(conns) = rooms.get_mut(session_id) else {
            return Vec::new();
        };

        conns.retain(|c| c.connection_id != *connection_id);

        if conns.is_empty() {
            rooms.remove(session_id);
            tracing::debug!(session_id = %session_id, "Removed empty session room");
            Vec::new()
        } else {
            tracing::debug!(
                session_id = %session_id,
                connection_id = %connection_id,
                room_size = conns.len(),
                "Connection left session room"
            );
            conns.clone()
        }
    }

    /// The other member of the room, if present
    pub async fn peer_of(&self, session_id: &Uuid, connection_id: &Uuid) -> Option<Arc<Connection>> {
        let rooms = self.rooms.read().await;
        rooms
            .get(session_id)?
            .iter()
            .find(|c| c.connection_id != *connection_id)
            .cloned()
    }

    /// Send an event to the other member of the room.
    ///
    /// Returns false when no peer is connected.
    pub async fn relay_to_peer(
        &self,
        session_id: &Uuid,
        from_connection_id: &Uuid,
        event: ServerEvent,
    ) -> bool {
        let Some(peer) = self.peer_of(session_id, from_connection_id).await else {
            tracing::debug!(
                session_id = %session_id,
                event_type = event.kind(),
                "No peer to relay to"
            );
            return false;
        };

        match peer.send(event) {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    connection_id = %peer.connection_id,
                    "Failed to relay event to peer (likely closed)"
                );
                false
            }
        }
    }

    /// Broadcast an event to all connections in a session room
    ///
    /// Silently ignores send errors (closed connections will be cleaned up).
    /// Returns the number of recipients.
    pub async fn broadcast(&self, session_id: &Uuid, event: ServerEvent) -> usize {
        let rooms = self.rooms.read().await;
        let Some(conns) = rooms.get(session_id) else {
            tracing::debug!(
                session_id = %session_id,
                event_type = event.kind(),
                "No room for session - nobody connected"
            );
            return 0;
        };

        let mut success_count = 0;
        for conn in conns {
            match conn.send(event.clone()) {
                Ok(()) => success_count += 1,
                Err(_) => {
                    tracing::warn!(
                        connection_id = %conn.connection_id,
                        "Failed to send event to connection (likely closed)"
                    );
                }
            }
        }

        tracing::debug!(
            session_id = %session_id,
            event_type = event.kind(),
            recipients = success_count,
            "Broadcast event to session room"
        );
        success_count
    }

    /// Remove the room and return its connections
    pub async fn close(&self, session_id: &Uuid) -> Vec<Arc<Connection>> {
        let mut rooms = self.rooms.write().await;
        let conns = rooms.remove(session_id).unwrap_or_default();
        if !conns.is_empty() {
            tracing::info!(
                session_id = %session_id,
                connections = conns.len(),
                "Closed session room"
            );
        }
        conns
    }

    /// Mark the session ended, then remove its room and return the
    /// connections. Later joins fail with [`RoomError::Ended`].
    pub async fn end(&self, session_id: &Uuid) -> Vec<Arc<Connection>> {
        self.ended.write().await.insert(*session_id);
        self.close(session_id).await
    }

    /// Get room size (number of connections) for a session
    pub async fn get_room_size(&self, session_id: &Uuid) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(session_id).map(|v| v.len()).unwrap_or(0)
    }

    /// Get total number of active rooms
    pub async fn get_room_count(&self) -> usize {
        let rooms = self.rooms.read().await;
        rooms.len()
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use supportly_shared::Role;
    use tokio::sync::mpsc;

    fn connection(
        user_id: Uuid,
        session_id: Uuid,
    ) -> (Arc<Connection>, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Connection::new(user_id, Role::Customer, session_id, tx)),
            rx,
        )
    }

    #[tokio::test]
    async fn test_join_and_leave() {
        let manager = RoomManager::new();
        let session_id = Uuid::new_v4();
        let (conn, _rx) = connection(Uuid::new_v4(), session_id);

        assert_eq!(manager.join(session_id, Arc::clone(&conn)).await.unwrap(), 1);
        assert_eq!(manager.get_room_count().await, 1);

        let remaining = manager.leave(&session_id, &conn.connection_id).await;
        assert!(remaining.is_empty());
        assert_eq!(manager.get_room_count().await, 0);
    }

    #[tokio::test]
    async fn test_third_participant_rejected() {
        let manager = RoomManager::new();
        let session_id = Uuid::new_v4();
        let (a, _ra) = connection(Uuid::new_v4(), session_id);
        let (b, _rb) = connection(Uuid::new_v4(), session_id);
        let (c, _rc) = connection(Uuid::new_v4(), session_id);

        manager.join(session_id, a).await.unwrap();
        assert_eq!(manager.join(session_id, b).await.unwrap(), 2);
        assert_eq!(manager.join(session_id, c).await.unwrap_err(), RoomError::Full);
        assert_eq!(manager.get_room_size(&session_id).await, 2);
    }

    #[tokio::test]
    async fn test_same_user_cannot_join_twice() {
        let manager = RoomManager::new();
        let session_id = Uuid::new_v4();
        let customer = Uuid::new_v4();
        let (first, _r1) = connection(customer, session_id);
        let (second, _r2) = connection(customer, session_id);

        manager.join(session_id, Arc::clone(&first)).await.unwrap();
        assert_eq!(
            manager.join(session_id, second).await.unwrap_err(),
            RoomError::AlreadyJoined
        );

        // Once the first connection leaves the user may join again
        manager.leave(&session_id, &first.connection_id).await;
        let (third, _r3) = connection(customer, session_id);
        assert_eq!(manager.join(session_id, third).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_relay_reaches_only_peer() {
        let manager = RoomManager::new();
        let session_id = Uuid::new_v4();
        let (a, mut ra) = connection(Uuid::new_v4(), session_id);
        let (b, mut rb) = connection(Uuid::new_v4(), session_id);

        manager.join(session_id, Arc::clone(&a)).await.unwrap();
        assert!(
            !manager
                .relay_to_peer(&session_id, &a.connection_id, ServerEvent::Pong)
                .await
        );

        manager.join(session_id, Arc::clone(&b)).await.unwrap();
        let signal = ServerEvent::RtcSignal {
            from: a.user_id,
            signal: serde_json::json!({"type": "offer", "sdp": "x"}),
        };
        assert!(manager.relay_to_peer(&session_id, &a.connection_id, signal).await);

        match rb.try_recv().unwrap() {
            ServerEvent::RtcSignal { from, signal } => {
                assert_eq!(from, a.user_id);
                assert_eq!(signal["sdp"], "x");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(ra.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_and_close() {
        let manager = RoomManager::new();
        let session_id = Uuid::new_v4();
        let (a, mut ra) = connection(Uuid::new_v4(), session_id);
        let (b, mut rb) = connection(Uuid::new_v4(), session_id);
        manager.join(session_id, a).await.unwrap();
        manager.join(session_id, b).await.unwrap();

        assert_eq!(manager.broadcast(&session_id, ServerEvent::Pong).await, 2);
        assert!(matches!(ra.try_recv(), Ok(ServerEvent::Pong)));
        assert!(matches!(rb.try_recv(), Ok(ServerEvent::Pong)));

        assert_eq!(manager.close(&session_id).await.len(), 2);
        assert_eq!(manager.broadcast(&session_id, ServerEvent::Pong).await, 0);
        assert_eq!(manager.get_room_size(&session_id).await, 0);
    }

    #[tokio::test]
    async fn test_closed_room_can_be_rejoined() {
        let manager = RoomManager::new();
        let session_id = Uuid::new_v4();
        let (a, _ra) = connection(Uuid::new_v4(), session_id);
        manager.join(session_id, a).await.unwrap();

        manager.close(&session_id).await;
        let (b, _rb) = connection(Uuid::new_v4(), session_id);
        assert_eq!(manager.join(session_id, b).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_join_after_end_rejected() {
        let manager = RoomManager::new();
        let session_id = Uuid::new_v4();
        let (a, _ra) = connection(Uuid::new_v4(), session_id);
        manager.join(session_id, a).await.unwrap();

        assert_eq!(manager.end(&session_id).await.len(), 1);

        let (late, _rl) = connection(Uuid::new_v4(), session_id);
        assert_eq!(manager.join(session_id, late).await.unwrap_err(), RoomError::Ended);
        assert_eq!(manager.get_room_count().await, 0);
    }
}
