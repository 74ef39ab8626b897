//! Support team routes

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use supportly_shared::{
    store::{self, NewTeam, TeamUpdate},
    Team,
};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateTeamRequest {
    pub name: String,
    #[serde(default)]
    pub available_from_hour: i16,
    #[serde(default)]
    pub available_until_hour: i16,
    pub max_concurrent_sessions: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTeamRequest {
    pub name: Option<String>,
    pub available_from_hour: Option<i16>,
    pub available_until_hour: Option<i16>,
    pub max_concurrent_sessions: Option<i32>,
}

pub async fn list_teams(State(state): State<AppState>) -> ApiResult<Json<Vec<Team>>> {
    Ok(Json(store::list_teams(&state.pool).await?))
}

pub async fn create_team(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CreateTeamRequest>,
) -> ApiResult<(StatusCode, Json<Team>)> {
    auth_user.require_admin()?;

    let name = validate_name(&req.name)?;
    validate_hour(req.available_from_hour)?;
    validate_hour(req.available_until_hour)?;
    validate_capacity(req.max_concurrent_sessions)?;

    let team = store::insert_team(
        &state.pool,
        NewTeam {
            name,
            available_from_hour: req.available_from_hour,
            available_until_hour: req.available_until_hour,
            max_concurrent_sessions: req.max_concurrent_sessions,
        },
    )
    .await?;

    tracing::info!(team_id = %team.id, name = %team.name, "Team created");
    Ok((StatusCode::CREATED, Json(team)))
}

pub async fn update_team(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(team_id): Path<Uuid>,
    Json(req): Json<UpdateTeamRequest>,
) -> ApiResult<Json<Team>> {
    auth_user.require_admin()?;

    let name = req.name.as_deref().map(validate_name).transpose()?;
    if let Some(hour) = req.available_from_hour {
        validate_hour(hour)?;
    }
    if let Some(hour) = req.available_until_hour {
        validate_hour(hour)?;
    }
    if let Some(max) = req.max_concurrent_sessions {
        validate_capacity(max)?;
    }

    let team = store::update_team(
        &state.pool,
        team_id,
        TeamUpdate {
            name,
            available_from_hour: req.available_from_hour,
            available_until_hour: req.available_until_hour,
            max_concurrent_sessions: req.max_concurrent_sessions,
        },
    )
    .await?;

    tracing::info!(team_id = %team.id, "Team updated");
    Ok(Json(team))
}

fn validate_name(name: &str) -> ApiResult<String> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > 120 {
        return Err(ApiError::Validation(
            "Team name must be between 1 and 120 characters".to_string(),
        ));
    }
    Ok(name.to_string())
}

fn validate_hour(hour: i16) -> ApiResult<()> {
    if (0..24).contains(&hour) {
        Ok(())
    } else {
        Err(ApiError::Validation("Hours must be between 0 and 23".to_string()))
    }
}

fn validate_capacity(max: i32) -> ApiResult<()> {
    if max > 0 {
        Ok(())
    } else {
        Err(ApiError::Validation(
            "max_concurrent_sessions must be positive".to_string(),
        ))
    }
}
