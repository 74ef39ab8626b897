//! WebSocket event types and serialization
//!
//! Defines all client-to-server and server-to-client event types
//! with type-safe serde serialization. Event names are kebab-case
//! (`rtc-signal`, `chat-message`, ...) in the `type` field.

use serde::{Deserialize, Serialize};
use supportly_shared::{Role, SessionMessage, SessionStatus, TranscriptEntry};
use uuid::Uuid;

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Events sent from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// WebRTC offer or ICE candidate for the peer; payload is opaque
    RtcSignal { signal: serde_json::Value },

    /// WebRTC answer (or ICE candidate) going back to the caller
    ReturnRtcSignal { signal: serde_json::Value },

    /// Chat message for the session
    ChatMessage { content: String },

    /// Terminate the call for both participants
    EndCall {
        /// Final status; defaults to `closed`
        #[serde(default)]
        outcome: Option<SessionStatus>,
        /// Generate an AI summary before closing
        #[serde(default = "default_summarize")]
        summarize: bool,
    },

    /// Begin streaming audio chunks for transcription
    StartTranscription {
        #[serde(default)]
        mime_type: Option<String>,
    },

    /// Base64-encoded audio chunk
    AudioChunk { data: String },

    /// Stop transcription for this connection
    StopTranscription,

    /// Heartbeat ping to keep connection alive
    Ping,
}

fn default_summarize() -> bool {
    true
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Events sent from server to client
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Connection acknowledged and joined to the session room
    Connected {
        connection_id: Uuid,
        session_id: Uuid,
        /// Whether the other participant is already in the room
        peer_present: bool,
    },

    /// The other participant joined the room
    PeerJoined { user_id: Uuid, role: Role },

    /// The other participant left the room
    PeerLeft { user_id: Uuid },

    /// Relayed WebRTC signal from the peer
    RtcSignal {
        from: Uuid,
        signal: serde_json::Value,
    },

    /// Relayed WebRTC return signal from the peer
    ReturnRtcSignal {
        from: Uuid,
        signal: serde_json::Value,
    },

    /// Chat message appended to the session
    ChatMessage { message: SessionMessage },

    /// Transcribed speech appended to the session
    Transcript { entry: TranscriptEntry },

    /// Transcription switched on or off for this connection
    TranscriptionState { active: bool },

    /// The call is over; the server closes the socket after this event
    CallEnded {
        session_id: Uuid,
        status: SessionStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },

    /// Heartbeat response
    Pong,

    /// Error message
    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::PeerJoined { .. } => "peer-joined",
            ServerEvent::PeerLeft { .. } => "peer-left",
            ServerEvent::RtcSignal { .. } => "rtc-signal",
            ServerEvent::ReturnRtcSignal { .. } => "return-rtc-signal",
            ServerEvent::ChatMessage { .. } => "chat-message",
            ServerEvent::Transcript { .. } => "transcript",
            ServerEvent::TranscriptionState { .. } => "transcription-state",
            ServerEvent::CallEnded { .. } => "call-ended",
            ServerEvent::Pong => "pong",
            ServerEvent::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rtc_signal_deserialization_keeps_payload() {
        let json = r#"{"type":"rtc-signal","signal":{"type":"offer","sdp":"v=0\r\no=- 42"}}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::RtcSignal { signal } => {
                assert_eq!(signal["type"], "offer");
                assert_eq!(signal["sdp"], "v=0\r\no=- 42");
            }
            _ => panic!("Expected RtcSignal event"),
        }
    }

    #[test]
    fn test_return_signal_name() {
        let json = r#"{"type":"return-rtc-signal","signal":{"candidate":"a=1"}}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, ClientEvent::ReturnRtcSignal { .. }));
    }

    #[test]
    fn test_end_call_defaults() {
        let event: ClientEvent = serde_json::from_str(r#"{"type":"end-call"}"#).unwrap();
        match event {
            ClientEvent::EndCall { outcome, summarize } => {
                assert!(outcome.is_none());
                assert!(summarize);
            }
            _ => panic!("Expected EndCall event"),
        }

        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"end-call","outcome":"resolved","summarize":false}"#)
                .unwrap();
        assert!(matches!(
            event,
            ClientEvent::EndCall {
                outcome: Some(SessionStatus::Resolved),
                summarize: false
            }
        ));
    }

    #[test]
    fn test_unit_events() {
        let event: ClientEvent = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(event, ClientEvent::Ping));
        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"start-transcription"}"#).unwrap();
        assert!(matches!(event, ClientEvent::StartTranscription { mime_type: None }));
    }

    #[test]
    fn test_unknown_event_rejected() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"type":"join-room"}"#).is_err());
    }

    #[test]
    fn test_server_event_serialization() {
        let json = serde_json::to_string(&ServerEvent::Pong).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);

        let from = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let event = ServerEvent::RtcSignal {
            from,
            signal: serde_json::json!({"type": "answer"}),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "rtc-signal");
        assert_eq!(value["from"], "550e8400-e29b-41d4-a716-446655440000");
        assert_eq!(value["signal"]["type"], "answer");
    }

    #[test]
    fn test_call_ended_omits_missing_summary() {
        let event = ServerEvent::CallEnded {
            session_id: Uuid::new_v4(),
            status: SessionStatus::Closed,
            summary: None,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "call-ended");
        assert_eq!(value["status"], "closed");
        assert!(value.get("summary").is_none());
    }
}
