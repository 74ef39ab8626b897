//! Session store
//!
//! Queries over the persisted session record and its append-only logs
//! (messages, timeline, transcript). Sessions are never deleted; every
//! status change goes through [`set_status`] or [`finish_call`] so the
//! transition table in [`SessionStatus::can_transition_to`] holds.

use sqlx::{PgExecutor, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::types::{
    Role, Session, SessionMessage, SessionRow, SessionStatus, Team, TimelineEntry, TimelineEvent,
    TranscriptEntry, User,
};

const SESSION_COLUMNS: &str = r#"
    id, title, description, customer_id, agent_id, team_id, status,
    scheduled_at, duration_minutes, call_started_at, call_ended_at,
    call_summary, created_at, updated_at
"#;

/// Fields needed to book a session
#[derive(Debug, Clone)]
pub struct NewSession {
    pub title: String,
    pub description: Option<String>,
    pub customer_id: Uuid,
    pub agent_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub scheduled_at: OffsetDateTime,
    pub duration_minutes: i32,
}

// =============================================================================
// Users
// =============================================================================

pub async fn fetch_user(pool: &PgPool, user_id: Uuid) -> StoreResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, email, name, role, team_id, created_at FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

/// Stored credentials for a user, looked up by email at login
#[derive(Debug, sqlx::FromRow)]
pub struct UserCredentials {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub team_id: Option<Uuid>,
    pub created_at: OffsetDateTime,
    pub password_hash: String,
}

impl UserCredentials {
    pub fn into_user(self) -> User {
        User {
            id: self.id,
            email: self.email,
            name: self.name,
            role: self.role,
            team_id: self.team_id,
            created_at: self.created_at,
        }
    }
}

pub async fn find_credentials(pool: &PgPool, email: &str) -> StoreResult<Option<UserCredentials>> {
    let creds = sqlx::query_as::<_, UserCredentials>(
        r#"
        SELECT id, email, name, role, team_id, created_at, password_hash
        FROM users
        WHERE email = $1
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(creds)
}

pub async fn email_exists(pool: &PgPool, email: &str) -> StoreResult<bool> {
    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
        .bind(email)
        .fetch_one(pool)
        .await?;

    Ok(exists)
}

pub async fn insert_user(
    pool: &PgPool,
    email: &str,
    name: &str,
    password_hash: &str,
    role: Role,
) -> StoreResult<User> {
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, email, name, password_hash, role)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, email, name, role, team_id, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(name)
    .bind(password_hash)
    .bind(role)
    .fetch_one(pool)
    .await?;

    Ok(user)
}

pub async fn list_users(pool: &PgPool) -> StoreResult<Vec<User>> {
    let users = sqlx::query_as::<_, User>(
        "SELECT id, email, name, role, team_id, created_at FROM users ORDER BY created_at ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(users)
}

/// Change a user's role. Support agents must belong to a team; other roles
/// are detached from any team.
pub async fn set_user_role(
    pool: &PgPool,
    user_id: Uuid,
    role: Role,
    team_id: Option<Uuid>,
) -> StoreResult<User> {
    let team_id = match (role, team_id) {
        (Role::SupportAgent, Some(team_id)) => Some(team_id),
        (Role::SupportAgent, None) => {
            return Err(StoreError::NotEligible(
                "support agents must belong to a team".to_string(),
            ))
        }
        _ => None,
    };

    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users SET role = $2, team_id = $3
        WHERE id = $1
        RETURNING id, email, name, role, team_id, created_at
        "#,
    )
    .bind(user_id)
    .bind(role)
    .bind(team_id)
    .fetch_optional(pool)
    .await?
    .ok_or(StoreError::NotFound("user"))?;

    Ok(user)
}

// =============================================================================
// Sessions
// =============================================================================

pub async fn fetch_session(pool: &PgPool, session_id: Uuid) -> StoreResult<Option<Session>> {
    let row = sqlx::query_as::<_, SessionRow>(&format!(
        "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1"
    ))
    .bind(session_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Session::from))
}

/// List sessions visible to a user: customers see their own, agents the ones
/// assigned to them, admins everything. Newest first.
pub async fn list_sessions_for(pool: &PgPool, user_id: Uuid, role: Role) -> StoreResult<Vec<Session>> {
    let filter = match role {
        Role::Customer => "WHERE customer_id = $1",
        Role::SupportAgent => "WHERE agent_id = $1",
        Role::Admin => "WHERE $1::uuid IS NOT NULL",
    };

    let rows = sqlx::query_as::<_, SessionRow>(&format!(
        "SELECT {SESSION_COLUMNS} FROM sessions {filter} ORDER BY created_at DESC LIMIT 200"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Session::from).collect())
}

/// Insert a pending session together with its `booked` timeline entry and,
/// when an agent is set, the `agent_assigned` entry.
pub async fn insert_session(pool: &PgPool, new: NewSession) -> StoreResult<Session> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, SessionRow>(&format!(
        r#"
        INSERT INTO sessions (id, title, description, customer_id, agent_id, team_id,
                              status, scheduled_at, duration_minutes)
        VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, $8)
        RETURNING {SESSION_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(&new.title)
    .bind(&new.description)
    .bind(new.customer_id)
    .bind(new.agent_id)
    .bind(new.team_id)
    .bind(new.scheduled_at)
    .bind(new.duration_minutes)
    .fetch_one(&mut *tx)
    .await?;

    append_timeline(&mut *tx, row.id, TimelineEvent::Booked, Some(new.customer_id), None).await?;
    if let Some(agent_id) = new.agent_id {
        append_timeline(
            &mut *tx,
            row.id,
            TimelineEvent::AgentAssigned,
            None,
            Some(&agent_id.to_string()),
        )
        .await?;
    }

    tx.commit().await?;
    Ok(row.into())
}

async fn lock_session(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    session_id: Uuid,
) -> StoreResult<Session> {
    let row = sqlx::query_as::<_, SessionRow>(&format!(
        "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1 FOR UPDATE"
    ))
    .bind(session_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(StoreError::NotFound("session"))?;

    Ok(row.into())
}

/// Move a session to `next`, recording the change on the timeline and
/// releasing the team slot once the session reaches a terminal status.
pub async fn set_status(
    pool: &PgPool,
    session_id: Uuid,
    next: SessionStatus,
    actor_id: Option<Uuid>,
) -> StoreResult<Session> {
    let mut tx = pool.begin().await?;
    let current = lock_session(&mut tx, session_id).await?;

    if !current.status.can_transition_to(next) {
        return Err(StoreError::InvalidTransition {
            from: current.status,
            to: next,
        });
    }

    let row = sqlx::query_as::<_, SessionRow>(&format!(
        "UPDATE sessions SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {SESSION_COLUMNS}"
    ))
    .bind(session_id)
    .bind(next)
    .fetch_one(&mut *tx)
    .await?;

    append_timeline(
        &mut *tx,
        session_id,
        TimelineEvent::StatusChanged,
        actor_id,
        Some(&format!("{} -> {}", current.status, next)),
    )
    .await?;

    if next.is_terminal() {
        if let Some(team_id) = current.team_id {
            release_team_slot(&mut *tx, team_id).await?;
        }
    }

    tx.commit().await?;
    Ok(row.into())
}

/// Assign a support agent to a session
pub async fn assign_agent(
    pool: &PgPool,
    session_id: Uuid,
    agent_id: Uuid,
    actor_id: Option<Uuid>,
) -> StoreResult<Session> {
    let agent = fetch_user(pool, agent_id)
        .await?
        .ok_or(StoreError::NotFound("agent"))?;

    if !agent.role.can_take_sessions() {
        return Err(StoreError::NotEligible(format!(
            "role {} cannot be assigned sessions",
            agent.role.as_str()
        )));
    }

    let mut tx = pool.begin().await?;
    let current = lock_session(&mut tx, session_id).await?;

    if current.status.is_terminal() {
        return Err(StoreError::NotEligible(format!(
            "session is already {}",
            current.status
        )));
    }

    let row = sqlx::query_as::<_, SessionRow>(&format!(
        "UPDATE sessions SET agent_id = $2, updated_at = NOW() WHERE id = $1 RETURNING {SESSION_COLUMNS}"
    ))
    .bind(session_id)
    .bind(agent_id)
    .fetch_one(&mut *tx)
    .await?;

    append_timeline(
        &mut *tx,
        session_id,
        TimelineEvent::AgentAssigned,
        actor_id,
        Some(&agent.email),
    )
    .await?;

    tx.commit().await?;
    Ok(row.into())
}

/// Record that the video call has started. The first call moves a pending
/// session to active and stamps `call_started_at`; later calls are no-ops.
///
/// Returns true when this call started the video call.
pub async fn mark_call_started(pool: &PgPool, session_id: Uuid, actor_id: Uuid) -> StoreResult<bool> {
    let mut tx = pool.begin().await?;
    let current = lock_session(&mut tx, session_id).await?;

    let already_started = current
        .video_call
        .as_ref()
        .and_then(|c| c.started_at)
        .is_some();

    if already_started || current.status.is_terminal() {
        return Ok(false);
    }

    let next = if current.status == SessionStatus::Pending {
        SessionStatus::Active
    } else {
        current.status
    };

    sqlx::query(
        r#"
        UPDATE sessions
        SET call_started_at = NOW(), status = $2, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(session_id)
    .bind(next)
    .execute(&mut *tx)
    .await?;

    append_timeline(&mut *tx, session_id, TimelineEvent::CallStarted, Some(actor_id), None).await?;

    tx.commit().await?;
    Ok(true)
}

/// Close out the video call: stamp the end time, store the summary and move
/// the session to `outcome`.
pub async fn finish_call(
    pool: &PgPool,
    session_id: Uuid,
    outcome: SessionStatus,
    summary: Option<&str>,
    actor_id: Uuid,
) -> StoreResult<Session> {
    let mut tx = pool.begin().await?;
    let current = lock_session(&mut tx, session_id).await?;

    // A call ends once; an escalated call may end as escalated again
    let allowed = current.status.is_live()
        && (current.status == outcome || current.status.can_transition_to(outcome));
    if !allowed {
        return Err(StoreError::InvalidTransition {
            from: current.status,
            to: outcome,
        });
    }

    let row = sqlx::query_as::<_, SessionRow>(&format!(
        r#"
        UPDATE sessions
        SET status = $2,
            call_started_at = COALESCE(call_started_at, NOW()),
            call_ended_at = NOW(),
            call_summary = COALESCE($3, call_summary),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {SESSION_COLUMNS}
        "#
    ))
    .bind(session_id)
    .bind(outcome)
    .bind(summary)
    .fetch_one(&mut *tx)
    .await?;

    append_timeline(
        &mut *tx,
        session_id,
        TimelineEvent::CallEnded,
        Some(actor_id),
        Some(outcome.as_str()),
    )
    .await?;

    if outcome.is_terminal() && current.status.is_live() {
        if let Some(team_id) = current.team_id {
            release_team_slot(&mut *tx, team_id).await?;
        }
    }

    tx.commit().await?;
    Ok(row.into())
}

// =============================================================================
// Append-only logs
// =============================================================================

pub async fn append_message(
    pool: &PgPool,
    session_id: Uuid,
    sender_id: Uuid,
    content: &str,
) -> StoreResult<SessionMessage> {
    let message = sqlx::query_as::<_, SessionMessage>(
        r#"
        INSERT INTO session_messages (id, session_id, sender_id, content)
        VALUES ($1, $2, $3, $4)
        RETURNING id, session_id, sender_id, content, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(session_id)
    .bind(sender_id)
    .bind(content)
    .fetch_one(pool)
    .await?;

    Ok(message)
}

pub async fn list_messages(pool: &PgPool, session_id: Uuid) -> StoreResult<Vec<SessionMessage>> {
    let messages = sqlx::query_as::<_, SessionMessage>(
        r#"
        SELECT id, session_id, sender_id, content, created_at
        FROM session_messages
        WHERE session_id = $1
        ORDER BY created_at ASC
        "#,
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    Ok(messages)
}

pub async fn append_timeline<'e, E>(
    executor: E,
    session_id: Uuid,
    event: TimelineEvent,
    actor_id: Option<Uuid>,
    detail: Option<&str>,
) -> StoreResult<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO session_timeline (id, session_id, event, actor_id, detail)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(session_id)
    .bind(event)
    .bind(actor_id)
    .bind(detail)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn list_timeline(pool: &PgPool, session_id: Uuid) -> StoreResult<Vec<TimelineEntry>> {
    let entries = sqlx::query_as::<_, TimelineEntry>(
        r#"
        SELECT id, session_id, event, actor_id, detail, created_at
        FROM session_timeline
        WHERE session_id = $1
        ORDER BY created_at ASC
        "#,
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    Ok(entries)
}

pub async fn append_transcript(
    pool: &PgPool,
    session_id: Uuid,
    speaker_id: Uuid,
    text: &str,
) -> StoreResult<TranscriptEntry> {
    let entry = sqlx::query_as::<_, TranscriptEntry>(
        r#"
        INSERT INTO session_transcripts (id, session_id, speaker_id, text)
        VALUES ($1, $2, $3, $4)
        RETURNING id, session_id, speaker_id, text, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(session_id)
    .bind(speaker_id)
    .bind(text)
    .fetch_one(pool)
    .await?;

    Ok(entry)
}

pub async fn list_transcript(pool: &PgPool, session_id: Uuid) -> StoreResult<Vec<TranscriptEntry>> {
    let entries = sqlx::query_as::<_, TranscriptEntry>(
        r#"
        SELECT id, session_id, speaker_id, text, created_at
        FROM session_transcripts
        WHERE session_id = $1
        ORDER BY created_at ASC
        "#,
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    Ok(entries)
}

// =============================================================================
// Teams
// =============================================================================

const TEAM_COLUMNS: &str = r#"
    id, name, available_from_hour, available_until_hour,
    max_concurrent_sessions, active_sessions, created_at
"#;

pub async fn list_teams(pool: &PgPool) -> StoreResult<Vec<Team>> {
    let teams = sqlx::query_as::<_, Team>(&format!(
        "SELECT {TEAM_COLUMNS} FROM teams ORDER BY name ASC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(teams)
}

/// Fields of a new team
#[derive(Debug, Clone)]
pub struct NewTeam {
    pub name: String,
    pub available_from_hour: i16,
    pub available_until_hour: i16,
    pub max_concurrent_sessions: i32,
}

/// Partial team update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct TeamUpdate {
    pub name: Option<String>,
    pub available_from_hour: Option<i16>,
    pub available_until_hour: Option<i16>,
    pub max_concurrent_sessions: Option<i32>,
}

pub async fn insert_team(pool: &PgPool, new: NewTeam) -> StoreResult<Team> {
    let team = sqlx::query_as::<_, Team>(&format!(
        r#"
        INSERT INTO teams (id, name, available_from_hour, available_until_hour, max_concurrent_sessions)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {TEAM_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(&new.name)
    .bind(new.available_from_hour)
    .bind(new.available_until_hour)
    .bind(new.max_concurrent_sessions)
    .fetch_one(pool)
    .await?;

    Ok(team)
}

pub async fn update_team(pool: &PgPool, team_id: Uuid, update: TeamUpdate) -> StoreResult<Team> {
    let team = sqlx::query_as::<_, Team>(&format!(
        r#"
        UPDATE teams
        SET name = COALESCE($2, name),
            available_from_hour = COALESCE($3, available_from_hour),
            available_until_hour = COALESCE($4, available_until_hour),
            max_concurrent_sessions = COALESCE($5, max_concurrent_sessions)
        WHERE id = $1
        RETURNING {TEAM_COLUMNS}
        "#
    ))
    .bind(team_id)
    .bind(update.name)
    .bind(update.available_from_hour)
    .bind(update.available_until_hour)
    .bind(update.max_concurrent_sessions)
    .fetch_optional(pool)
    .await?
    .ok_or(StoreError::NotFound("team"))?;

    Ok(team)
}

/// Take one concurrent-session slot on a team.
///
/// The capacity check and the increment happen in a single statement, so two
/// bookings racing for the last slot cannot both win. Returns false when the
/// team is full.
pub async fn reserve_team_slot(pool: &PgPool, team_id: Uuid) -> StoreResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE teams
        SET active_sessions = active_sessions + 1
        WHERE id = $1 AND active_sessions < max_concurrent_sessions
        "#,
    )
    .bind(team_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn release_team_slot<'e, E>(executor: E, team_id: Uuid) -> StoreResult<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query("UPDATE teams SET active_sessions = GREATEST(active_sessions - 1, 0) WHERE id = $1")
        .bind(team_id)
        .execute(executor)
        .await?;

    Ok(())
}

/// Pick the support agent in a team carrying the fewest live sessions
pub async fn pick_agent(pool: &PgPool, team_id: Uuid) -> StoreResult<Option<Uuid>> {
    let agent = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT u.id
        FROM users u
        WHERE u.team_id = $1 AND u.role = 'support_agent'
        ORDER BY (
            SELECT COUNT(*) FROM sessions s
            WHERE s.agent_id = u.id AND s.status IN ('pending', 'active', 'escalated')
        ) ASC, u.created_at ASC
        LIMIT 1
        "#,
    )
    .bind(team_id)
    .fetch_optional(pool)
    .await?;

    Ok(agent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_pool;

    async fn pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = create_pool(&url, 2).await.expect("Failed to create pool");
        crate::db::run_migrations(&pool).await.expect("migrations failed");
        pool
    }

    async fn seed_user(pool: &PgPool, role: &str) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO users (id, email, name, password_hash, role) VALUES ($1, $2, 'Test', 'x', $3)")
            .bind(id)
            .bind(format!("{id}@example.com"))
            .bind(role)
            .execute(pool)
            .await
            .expect("seed user");
        id
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_session_lifecycle_round_trip() {
        let pool = pool().await;
        let customer = seed_user(&pool, "customer").await;

        let session = insert_session(
            &pool,
            NewSession {
                title: "Printer on fire".to_string(),
                description: None,
                customer_id: customer,
                agent_id: None,
                team_id: None,
                scheduled_at: OffsetDateTime::now_utc(),
                duration_minutes: 30,
            },
        )
        .await
        .unwrap();
        assert_eq!(session.status, SessionStatus::Pending);

        assert!(mark_call_started(&pool, session.id, customer).await.unwrap());
        assert!(!mark_call_started(&pool, session.id, customer).await.unwrap());

        let finished = finish_call(&pool, session.id, SessionStatus::Resolved, Some("done"), customer)
            .await
            .unwrap();
        assert_eq!(finished.status, SessionStatus::Resolved);
        assert_eq!(
            finished.video_call.and_then(|c| c.summary).as_deref(),
            Some("done")
        );

        let err = set_status(&pool, session.id, SessionStatus::Active, None).await;
        assert!(matches!(err, Err(StoreError::InvalidTransition { .. })));

        let timeline = list_timeline(&pool, session.id).await.unwrap();
        let events: Vec<_> = timeline.iter().map(|e| e.event).collect();
        assert_eq!(
            events,
            vec![
                TimelineEvent::Booked,
                TimelineEvent::CallStarted,
                TimelineEvent::CallEnded
            ]
        );
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_insert_session_records_booking_with_agent() {
        let pool = pool().await;
        let customer = seed_user(&pool, "customer").await;
        let agent = seed_user(&pool, "support_agent").await;

        let session = insert_session(
            &pool,
            NewSession {
                title: "VPN drops".to_string(),
                description: Some("Every ten minutes".to_string()),
                customer_id: customer,
                agent_id: Some(agent),
                team_id: None,
                scheduled_at: OffsetDateTime::now_utc(),
                duration_minutes: 45,
            },
        )
        .await
        .unwrap();

        let timeline = list_timeline(&pool, session.id).await.unwrap();
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[0].event, TimelineEvent::Booked);
        assert_eq!(timeline[0].actor_id, Some(customer));
        assert_eq!(timeline[1].event, TimelineEvent::AgentAssigned);
        assert_eq!(timeline[1].detail.as_deref(), Some(agent.to_string().as_str()));
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_assign_agent_rejects_customer() {
        let pool = pool().await;
        let customer = seed_user(&pool, "customer").await;
        let other = seed_user(&pool, "customer").await;

        let session = insert_session(
            &pool,
            NewSession {
                title: "Login issue".to_string(),
                description: None,
                customer_id: customer,
                agent_id: None,
                team_id: None,
                scheduled_at: OffsetDateTime::now_utc(),
                duration_minutes: 15,
            },
        )
        .await
        .unwrap();

        let result = assign_agent(&pool, session.id, other, None).await;
        assert!(matches!(result, Err(StoreError::NotEligible(_))));
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_team_slot_reservation_stops_at_capacity() {
        let pool = pool().await;
        let team = insert_team(
            &pool,
            NewTeam {
                name: format!("Team {}", Uuid::new_v4()),
                available_from_hour: 0,
                available_until_hour: 0,
                max_concurrent_sessions: 1,
            },
        )
        .await
        .unwrap();

        assert!(reserve_team_slot(&pool, team.id).await.unwrap());
        assert!(!reserve_team_slot(&pool, team.id).await.unwrap());

        release_team_slot(&pool, team.id).await.unwrap();
        assert!(reserve_team_slot(&pool, team.id).await.unwrap());
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_agent_role_requires_team() {
        let pool = pool().await;
        let user = seed_user(&pool, "customer").await;

        let result = set_user_role(&pool, user, Role::SupportAgent, None).await;
        assert!(matches!(result, Err(StoreError::NotEligible(_))));

        let admin = set_user_role(&pool, user, Role::Admin, Some(Uuid::new_v4())).await.unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert!(admin.team_id.is_none());
    }
}
