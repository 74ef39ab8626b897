//! API routes

pub mod auth;
pub mod health;
pub mod sessions;
pub mod teams;
pub mod users;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post},
    Router,
};

use crate::{auth::require_auth, state::AppState, websocket::ws_handler};

/// Request body limit for REST routes
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        // Sessions
        .route(
            "/api/sessions",
            get(sessions::list_sessions).post(sessions::book_session),
        )
        .route("/api/sessions/:id", get(sessions::get_session))
        .route("/api/sessions/:id/status", patch(sessions::update_status))
        .route("/api/sessions/:id/assign", patch(sessions::assign_agent))
        .route("/api/sessions/:id/messages", post(sessions::post_message))
        // Teams
        .route("/teams", get(teams::list_teams).post(teams::create_team))
        .route("/teams/:id", patch(teams::update_team))
        // Users
        .route("/users", get(users::list_users))
        .route("/users/:id", get(users::get_user))
        .route("/users/:id/role", patch(users::update_role))
        .layer(middleware::from_fn_with_state(auth_state, require_auth));

    // WebSocket gateway (auth handled in handler via cookie or query parameter)
    let websocket_routes = Router::new().route("/ws", get(ws_handler));

    Router::new()
        .merge(health_routes)
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .merge(websocket_routes)
        .with_state(state)
}
