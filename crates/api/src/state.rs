//! Shared application state

use std::sync::Arc;

use sqlx::PgPool;
use supportly_shared::JobQueue;

use crate::{
    ai::{AiClient, AiConfig},
    auth::{AuthState, JwtManager},
    config::Config,
    websocket::WebSocketState,
};

/// State handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub jwt_manager: JwtManager,
    pub ws_state: WebSocketState,
    pub queue: JobQueue,
    pub ai: AiClient,
}

impl AppState {
    pub fn new(config: Config, pool: PgPool, queue: JobQueue) -> Self {
        let jwt_manager = JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours);
        let ai = AiClient::new(AiConfig::from_config(&config));

        if !ai.is_enabled() {
            tracing::warn!("AI_API_KEY not set - call summaries and transcription are disabled");
        }

        Self {
            pool,
            config: Arc::new(config),
            jwt_manager,
            ws_state: WebSocketState::new(),
            queue,
            ai,
        }
    }

    /// State for the auth middleware
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            jwt_manager: self.jwt_manager.clone(),
            pool: self.pool.clone(),
        }
    }
}
