//! WebSocket signaling gateway for support video calls
//!
//! Provides the real-time side of a support session:
//! - WebRTC signal relay between the customer and the agent
//! - Session chat delivery
//! - Live transcription of participant audio
//! - Call termination for both participants
//!
//! # Architecture
//!
//! - **Connection**: Represents an authenticated WebSocket connection
//! - **Room**: Per-session room holding at most two connections
//! - **State**: Global WebSocket state shared across all connections
//! - **Handler**: Axum WebSocket route handler
//! - **Events**: Type-safe event definitions for client/server communication
//! - **Transcription**: Per-connection audio transcription task

pub mod connection;
pub mod events;
pub mod handler;
pub mod room;
pub mod state;
pub mod transcription;

pub use handler::ws_handler;
pub use state::WebSocketState;
