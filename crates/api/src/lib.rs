//! Supportly API Library
//!
//! This crate contains the HTTP and WebSocket server components for
//! Supportly: auth, REST routes, the signaling relay, the call-end
//! lifecycle, and the AI and email clients shared with the worker.

pub mod ai;
pub mod auth;
pub mod config;
pub mod email;
pub mod error;
pub mod lifecycle;
pub mod routes;
pub mod state;
pub mod websocket;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
