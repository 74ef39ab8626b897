//! Authentication routes

use axum::{
    extract::{Extension, State},
    http::{header, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use supportly_shared::{store, Role, User};

use crate::{
    auth::{
        auth_cookie, clear_auth_cookie, hash_password, validate_password_strength,
        verify_password, AuthUser,
    },
    error::{ApiError, ApiResult},
    state::AppState,
};

/// Minimum login response time, so a missing account and a wrong password
/// take equally long
const MIN_LOGIN_RESPONSE_TIME: std::time::Duration = std::time::Duration::from_millis(300);

/// Hash checked against when the email is unknown, so that path pays the
/// same Argon2 cost as a wrong password
static UNKNOWN_ACCOUNT_HASH: std::sync::OnceLock<Option<String>> = std::sync::OnceLock::new();

fn unknown_account_hash() -> Option<&'static str> {
    UNKNOWN_ACCOUNT_HASH
        .get_or_init(|| hash_password("supportly-unknown-account").ok())
        .as_deref()
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub expires_in: i64,
    pub user: User,
}

type CookieHeader = [(header::HeaderName, String); 1];

// =============================================================================
// Handlers
// =============================================================================

/// Register a new customer account
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, CookieHeader, Json<AuthResponse>)> {
    let email = req.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(ApiError::Validation("Invalid email format".to_string()));
    }

    validate_password_strength(&req.password).map_err(|e| ApiError::Validation(e.to_string()))?;

    let name = req.name.trim();
    if name.is_empty() || name.chars().count() > 120 {
        return Err(ApiError::Validation(
            "Name must be between 1 and 120 characters".to_string(),
        ));
    }

    if store::email_exists(&state.pool, &email).await? {
        return Err(ApiError::EmailAlreadyExists);
    }

    let password_hash = hash_password(&req.password).map_err(|_| ApiError::Internal)?;

    // Self-service accounts are always customers; admins promote agents
    let user = match store::insert_user(&state.pool, &email, name, &password_hash, Role::Customer).await {
        Ok(user) => user,
        Err(supportly_shared::StoreError::Database(sqlx::Error::Database(db_err)))
            if db_err.is_unique_violation() =>
        {
            return Err(ApiError::EmailAlreadyExists)
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(user_id = %user.id, "register: Created customer account");

    let (cookie, body) = issue_token(&state, user)?;
    Ok((StatusCode::CREATED, cookie, Json(body)))
}

/// Log in with email and password
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<(CookieHeader, Json<AuthResponse>)> {
    let start = std::time::Instant::now();

    let result = login_inner(&state, &req).await;

    let elapsed = start.elapsed();
    if elapsed < MIN_LOGIN_RESPONSE_TIME {
        tokio::time::sleep(MIN_LOGIN_RESPONSE_TIME - elapsed).await;
    }

    result
}

async fn login_inner(state: &AppState, req: &LoginRequest) -> ApiResult<(CookieHeader, Json<AuthResponse>)> {
    let email = req.email.trim().to_lowercase();

    let Some(creds) = store::find_credentials(&state.pool, &email).await? else {
        if let Some(hash) = unknown_account_hash() {
            let _ = verify_password(&req.password, hash);
        }
        tracing::debug!("login: Unknown email");
        return Err(ApiError::InvalidCredentials);
    };

    let valid = verify_password(&req.password, &creds.password_hash).map_err(|e| {
        tracing::error!(error = %e, user_id = %creds.id, "login: Stored password hash unreadable");
        ApiError::Internal
    })?;
    if !valid {
        tracing::info!(user_id = %creds.id, "login: Wrong password");
        return Err(ApiError::InvalidCredentials);
    }

    let user = creds.into_user();
    tracing::info!(user_id = %user.id, role = user.role.as_str(), "login: Success");

    let (cookie, body) = issue_token(state, user)?;
    Ok((cookie, Json(body)))
}

/// Clear the auth cookie
pub async fn logout(State(state): State<AppState>) -> (StatusCode, CookieHeader) {
    (
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, clear_auth_cookie(state.config.cookie_secure))],
    )
}

/// Current user
pub async fn me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<User>> {
    let user = store::fetch_user(&state.pool, auth_user.user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    Ok(Json(user))
}

fn issue_token(state: &AppState, user: User) -> ApiResult<(CookieHeader, AuthResponse)> {
    let token = state
        .jwt_manager
        .generate_token(user.id, user.role, &user.email)
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to generate access token");
            ApiError::Internal
        })?;

    let expires_in = state.jwt_manager.expiry_seconds();
    let cookie = auth_cookie(&token, expires_in, state.config.cookie_secure);

    Ok((
        [(header::SET_COOKIE, cookie)],
        AuthResponse {
            token,
            expires_in,
            user,
        },
    ))
}

/// Validate email format (expects trimmed, lowercased input)
fn is_valid_email(email: &str) -> bool {
    // Length checks per RFC 5321
    if email.len() > 254 || email.is_empty() {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if domain.contains('@') {
        return false;
    }

    if local.is_empty() || local.len() > 64 {
        return false;
    }
    // No leading/trailing/consecutive dots
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return false;
    }
    if !local.chars().all(|c| c.is_alphanumeric() || ".+-_".contains(c)) {
        return false;
    }

    if domain.starts_with('-') || domain.ends_with('-') {
        return false;
    }
    if domain.starts_with('.') || domain.ends_with('.') || domain.contains("..") {
        return false;
    }

    // Must have a TLD of at least 2 letters
    match domain.rsplit_once('.') {
        Some((_, tld)) => tld.len() >= 2 && tld.chars().all(|c| c.is_alphabetic()),
        None => false,
    }
}
