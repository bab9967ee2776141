//! Stripe endpoints: checkout session creation and webhook intake

use axum::{
    body::Bytes,
    extract::{Extension, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;

use membergate_billing::CheckoutLink;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Acknowledgement body returned for every processed webhook delivery
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub event_id: String,
    pub event_type: String,
    pub outcome: &'static str,
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /stripe/checkout
pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<CheckoutLink>> {
    let Some(checkout) = state.billing.checkout.as_ref() else {
        tracing::warn!("Checkout requested but Stripe is not configured");
        return Err(ApiError::UpstreamUnavailable);
    };

    let link = checkout.create_session(auth_user.user_id).await?;
    Ok(Json(link))
}

/// POST /stripe/webhook
///
/// Takes the raw body: signature verification runs over the exact bytes
/// the provider signed, before any parsing. Responds 200 for every
/// processed delivery including no-ops, 400 on signature failure.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok());

    let receipt = state.billing.webhooks.process(&body, signature).await?;

    Ok(Json(WebhookAck {
        received: true,
        event_id: receipt.event_id,
        event_type: receipt.event_type,
        outcome: receipt.outcome,
    }))
}
