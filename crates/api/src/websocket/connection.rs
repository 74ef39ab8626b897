//! WebSocket connection management
//!
//! Represents an active WebSocket connection joined to one session room.

use supportly_shared::Role;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

use super::events::ServerEvent;

/// Represents an active WebSocket connection
#[derive(Debug)]
pub struct Connection {
    /// Unique ID for this connection
    pub connection_id: Uuid,

    /// Authenticated user ID
    pub user_id: Uuid,

    /// Role of the authenticated user
    pub role: Role,

    /// Support session this connection belongs to
    pub session_id: Uuid,

    /// Channel to send events to this connection
    pub sender: mpsc::UnboundedSender<ServerEvent>,

    /// Cancelled when the server closes the connection
    cancel: CancellationToken,

    /// Audio feed of the running transcriber, if any
    transcriber: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
}

impl Connection {
    /// Create a new connection
    pub fn new(
        user_id: Uuid,
        role: Role,
        session_id: Uuid,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            user_id,
            role,
            session_id,
            sender,
            cancel: CancellationToken::new(),
            transcriber: Mutex::new(None),
        }
    }

    /// Send an event to this connection
    ///
    /// Returns Ok(()) if sent successfully, Err if connection is closed
    #[allow(clippy::result_large_err)] // Error type is from tokio mpsc, containing the failed event
    pub fn send(&self, event: ServerEvent) -> Result<(), mpsc::error::SendError<ServerEvent>> {
        self.sender.send(event)
    }

    /// Ask the socket loop to close this connection
    pub fn disconnect(&self) {
        self.cancel.cancel();
    }

    pub fn is_disconnected(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once [`Connection::disconnect`] has been called
    pub fn disconnected(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Install a transcriber feed. Returns false if one is already running.
    pub async fn start_transcriber(&self, feed: mpsc::Sender<Vec<u8>>) -> bool {
        let mut transcriber = self.transcriber.lock().await;
        if transcriber.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return false;
        }
        *transcriber = Some(feed);
        true
    }

    pub async fn transcriber(&self) -> Option<mpsc::Sender<Vec<u8>>> {
        self.transcriber.lock().await.clone()
    }

    /// Drop the transcriber feed; the transcriber finishes queued chunks and exits
    pub async fn stop_transcriber(&self) -> bool {
        self.transcriber.lock().await.take().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> Connection {
        let (tx, _rx) = mpsc::unbounded_channel();
        Connection::new(Uuid::new_v4(), Role::Customer, Uuid::new_v4(), tx)
    }

    #[tokio::test]
    async fn test_disconnect_resolves_waiters() {
        let conn = connection();
        assert!(!conn.is_disconnected());

        conn.disconnect();
        assert!(conn.is_disconnected());
        // Already cancelled, resolves immediately
        conn.disconnected().await;
    }

    #[tokio::test]
    async fn test_single_transcriber() {
        let conn = connection();
        let (tx1, _rx1) = mpsc::channel(1);
        let (tx2, _rx2) = mpsc::channel(1);

        assert!(conn.start_transcriber(tx1).await);
        assert!(!conn.start_transcriber(tx2).await);
        assert!(conn.transcriber().await.is_some());

        assert!(conn.stop_transcriber().await);
        assert!(conn.transcriber().await.is_none());
        assert!(!conn.stop_transcriber().await);
    }

    #[tokio::test]
    async fn test_closed_transcriber_is_replaced() {
        let conn = connection();
        let (tx1, rx1) = mpsc::channel(1);
        assert!(conn.start_transcriber(tx1).await);
        drop(rx1);

        let (tx2, _rx2) = mpsc::channel(1);
        assert!(conn.start_transcriber(tx2).await);
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Connection::new(Uuid::new_v4(), Role::Admin, Uuid::new_v4(), tx);
        assert!(conn.send(ServerEvent::Pong).is_ok());
        drop(rx);
        assert!(conn.send(ServerEvent::Pong).is_err());
    }
}
