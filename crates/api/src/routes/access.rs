//! Access status and reconciliation endpoints

use axum::{
    extract::{Extension, State},
    Json,
};
use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

use membergate_shared::audit::{record_audit, AuditEntry, AuditOutcome, AuditSource};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Newest subscription on record for the user, if any
#[derive(Debug, Serialize, FromRow)]
pub struct SubscriptionSummary {
    pub plan: Option<String>,
    pub status: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub current_period_end: Option<OffsetDateTime>,
}

#[derive(Debug, Serialize)]
pub struct AccessStatusResponse {
    pub access_level: String,
    pub subscription: Option<SubscriptionSummary>,
}

#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    pub previous: String,
    pub access_level: String,
    pub changed: bool,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /access/status
pub async fn status(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<AccessStatusResponse>> {
    let access_level: Option<String> =
        sqlx::query_scalar("SELECT access_level FROM users WHERE id = $1")
            .bind(auth_user.user_id)
            .fetch_optional(&state.pool)
            .await?;
    let access_level = access_level.ok_or(ApiError::NotFound)?;

    let subscription: Option<SubscriptionSummary> = sqlx::query_as(
        r#"
        SELECT plan, status, current_period_end
        FROM subscriptions
        WHERE user_id = $1
        ORDER BY last_event_at DESC
        LIMIT 1
        "#,
    )
    .bind(auth_user.user_id)
    .fetch_optional(&state.pool)
    .await?;

    Ok(Json(AccessStatusResponse {
        access_level,
        subscription,
    }))
}

/// POST /access/reconcile
///
/// On-demand drift repair: recompute the caller's access level from their
/// subscription rows. Safe to call at any time; a no-op when nothing
/// drifted.
pub async fn reconcile(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<ReconcileResponse>> {
    let outcome = state
        .billing
        .access
        .recompute_for_user(auth_user.user_id)
        .await?;

    let entry = AuditEntry::new("access_reconciled", AuditSource::Access, AuditOutcome::Success)
        .user(auth_user.user_id)
        .details(format!(
            "{} -> {}",
            outcome.previous, outcome.current
        ));
    record_audit(&state.pool, &entry).await?;

    Ok(Json(ReconcileResponse {
        previous: outcome.previous.to_string(),
        access_level: outcome.current.to_string(),
        changed: outcome.changed,
    }))
}
