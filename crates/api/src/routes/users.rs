//! User management routes

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde::Deserialize;
use supportly_shared::{store, Role, User};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: Role,
    /// Required when `role` is `support_agent`
    pub team_id: Option<Uuid>,
}

/// List all users (admin only)
pub async fn list_users(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<User>>> {
    auth_user.require_admin()?;
    Ok(Json(store::list_users(&state.pool).await?))
}

/// Get a user (self or admin)
pub async fn get_user(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<User>> {
    if auth_user.user_id != user_id {
        auth_user.require_admin()?;
    }

    let user = store::fetch_user(&state.pool, user_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(user))
}

/// Change a user's role (admin only)
pub async fn update_role(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<UpdateRoleRequest>,
) -> ApiResult<Json<User>> {
    auth_user.require_admin()?;

    if user_id == auth_user.user_id && req.role != Role::Admin {
        return Err(ApiError::BadRequest(
            "Admins cannot remove their own admin role".to_string(),
        ));
    }

    if let Some(team_id) = req.team_id {
        let teams = store::list_teams(&state.pool).await?;
        if !teams.iter().any(|t| t.id == team_id) {
            return Err(ApiError::Validation("Unknown team".to_string()));
        }
    }

    let user = store::set_user_role(&state.pool, user_id, req.role, req.team_id).await?;

    tracing::info!(
        user_id = %user_id,
        role = user.role.as_str(),
        team_id = ?user.team_id,
        changed_by = %auth_user.user_id,
        "User role changed"
    );

    Ok(Json(user))
}
