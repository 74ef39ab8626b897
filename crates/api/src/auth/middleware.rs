//! Authentication middleware
//!
//! Resolves the caller from a bearer token or the auth cookie and makes an
//! [`AuthUser`] available to handlers as a request extension.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sqlx::PgPool;
use supportly_shared::{store, Role};
use uuid::Uuid;

use super::{cookie::request_token, jwt::JwtManager};
use crate::error::ApiError;

/// State needed by the auth middleware
#[derive(Clone)]
pub struct AuthState {
    pub jwt_manager: JwtManager,
    pub pool: PgPool,
}

/// Authenticated caller
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
    pub email: String,
}

impl AuthUser {
    /// Fail with `Forbidden` unless the caller holds one of `roles`
    pub fn require_role(&self, roles: &[Role]) -> Result<(), ApiError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            tracing::warn!(
                user_id = %self.user_id,
                role = self.role.as_str(),
                "Forbidden: role not permitted"
            );
            Err(ApiError::Forbidden)
        }
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        self.require_role(&[Role::Admin])
    }
}

/// Validate a token and load the user it names.
///
/// The role comes from the database rather than the token so role changes
/// take effect without re-login.
pub async fn authenticate_token(auth_state: &AuthState, token: &str) -> Result<AuthUser, ApiError> {
    let claims = auth_state.jwt_manager.validate_token(token).map_err(|e| {
        tracing::debug!(error = %e, "Token validation failed");
        ApiError::InvalidToken
    })?;

    let user = store::fetch_user(&auth_state.pool, claims.sub)
        .await?
        .ok_or_else(|| {
            tracing::warn!(user_id = %claims.sub, "Auth failed: user not found");
            ApiError::InvalidToken
        })?;

    Ok(AuthUser {
        user_id: user.id,
        role: user.role,
        email: user.email,
    })
}

/// Require a valid token on the request
pub async fn require_auth(
    State(auth_state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request_token(req.headers()).ok_or(ApiError::Unauthorized)?;
    let auth_user = authenticate_token(&auth_state, &token).await?;

    req.extensions_mut().insert(auth_user);
    Ok(next.run(req).await)
}
