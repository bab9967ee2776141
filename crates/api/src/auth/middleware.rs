//! Authentication middleware for Axum

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::jwt::JwtManager;
use crate::error::ApiError;

/// State needed for authentication
#[derive(Clone)]
pub struct AuthState {
    pub jwt_manager: JwtManager,
    pub pool: PgPool,
}

/// Authenticated user information extracted from a validated token
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
}

/// Extract the bearer token from the Authorization header
pub(crate) fn extract_bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Middleware that requires authentication
pub async fn require_auth(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let Some(token) = extract_bearer_token(&request) else {
        tracing::warn!(path = %path, "require_auth: no bearer token present");
        return ApiError::Unauthenticated.into_response();
    };

    match authenticate(&auth_state, &token).await {
        Ok(auth_user) => {
            tracing::debug!(
                path = %path,
                user_id = %auth_user.user_id,
                "require_auth: authentication successful"
            );
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        Err(err) => {
            tracing::warn!(path = %path, error = %err, "require_auth: authentication failed");
            err.into_response()
        }
    }
}

async fn authenticate(auth_state: &AuthState, token: &str) -> Result<AuthUser, ApiError> {
    let claims = auth_state.jwt_manager.validate(token)?;

    // The same valid token must resolve to the same user every time
    let user: Option<(Uuid, String)> =
        sqlx::query_as("SELECT id, email FROM users WHERE id = $1")
            .bind(claims.sub)
            .fetch_optional(&auth_state.pool)
            .await?;

    if let Some((user_id, email)) = user {
        return Ok(AuthUser { user_id, email });
    }

    // Token user id no longer exists; resolve by email before giving up.
    // Handles tokens issued before a user row was recreated.
    let by_email: Option<(Uuid, String)> =
        sqlx::query_as("SELECT id, email FROM users WHERE email = $1")
            .bind(&claims.email)
            .fetch_optional(&auth_state.pool)
            .await?;

    if let Some((user_id, email)) = by_email {
        tracing::info!(
            token_user_id = %claims.sub,
            resolved_user_id = %user_id,
            "Resolved stale token to existing user via email"
        );
        return Ok(AuthUser { user_id, email });
    }

    Err(ApiError::Unauthenticated)
}
