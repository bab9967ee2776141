//! Login and identity endpoints
//!
//! Login is deliberately passwordless: presenting an email logs in the
//! existing user or creates a new one (log in = register). The two
//! branches are kept explicit so the audit trail distinguishes them.

use axum::{
    extract::{Extension, State},
    Json,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use membergate_shared::audit::{record_audit, AuditEntry, AuditOutcome, AuditSource};
use membergate_shared::User;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub access_level: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            access_level: user.access_level,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

/// Which branch a login took
enum LoginOutcome {
    Existing(User),
    Created(User),
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let email = request.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::BadRequest("invalid email address".to_string()));
    }

    let outcome = find_or_create_user(&state, &email).await?;

    let user = match outcome {
        LoginOutcome::Created(user) => {
            tracing::info!(user_id = %user.id, "New user created at login");
            let entry = AuditEntry::new("user_created", AuditSource::Auth, AuditOutcome::Success)
                .user(user.id);
            record_audit(&state.pool, &entry).await?;
            user
        }
        LoginOutcome::Existing(user) => user,
    };

    let entry =
        AuditEntry::new("user_login", AuditSource::Auth, AuditOutcome::Success).user(user.id);
    record_audit(&state.pool, &entry).await?;

    let token = state.jwt_manager.issue(user.id, &user.email)?;

    Ok(Json(LoginResponse {
        token,
        user: user.into(),
    }))
}

/// GET /auth/me
pub async fn me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<UserResponse>> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(auth_user.user_id)
        .fetch_optional(&state.pool)
        .await?;

    let user = user.ok_or(ApiError::NotFound)?;
    Ok(Json(user.into()))
}

/// Lookup-by-email, else create-with-defaults
///
/// The insert races benignly with concurrent first logins for the same
/// email: the loser of the race falls through to the lookup branch.
async fn find_or_create_user(state: &AppState, email: &str) -> ApiResult<LoginOutcome> {
    let existing: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(&state.pool)
        .await?;

    if let Some(user) = existing {
        return Ok(LoginOutcome::Existing(user));
    }

    let created: Option<User> = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, access_level)
        VALUES ($1, $2, 'free')
        ON CONFLICT (email) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .fetch_optional(&state.pool)
    .await?;

    match created {
        Some(user) => Ok(LoginOutcome::Created(user)),
        None => {
            // Lost the race to a concurrent login; the row now exists
            let user: User = sqlx::query_as("SELECT * FROM users WHERE email = $1")
                .bind(email)
                .fetch_one(&state.pool)
                .await?;
            Ok(LoginOutcome::Existing(user))
        }
    }
}
