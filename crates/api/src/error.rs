//! API error types
//!
//! Every handled error maps to a stable kind string carried in a JSON
//! body. Internal failures never leak detail to the client; they are
//! logged here and surfaced as a generic 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use membergate_billing::BillingError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing, invalid, or expired credentials")]
    Unauthenticated,

    #[error("resource not found")]
    NotFound,

    #[error("webhook signature verification failed")]
    InvalidSignature,

    #[error("{0}")]
    BadRequest(String),

    #[error("billing provider unavailable")]
    UpstreamUnavailable,

    #[error("internal error")]
    Internal,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Stable machine-readable kind string
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated => "unauthenticated",
            ApiError::NotFound => "not_found",
            ApiError::InvalidSignature => "invalid_signature",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::UpstreamUnavailable => "upstream_unavailable",
            ApiError::Internal => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::InvalidSignature => StatusCode::BAD_REQUEST,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!(error = %err, "Database error");
        ApiError::Internal
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::InvalidSignature => ApiError::InvalidSignature,
            BillingError::MalformedEvent(msg) => ApiError::BadRequest(msg),
            BillingError::UserNotFound(_) => ApiError::NotFound,
            BillingError::Upstream(msg) => {
                tracing::error!(error = %msg, "Billing provider call failed");
                ApiError::UpstreamUnavailable
            }
            BillingError::UpstreamTimeout(deadline) => {
                tracing::error!(deadline = ?deadline, "Billing provider call timed out");
                ApiError::UpstreamUnavailable
            }
            BillingError::NotConfigured(var) => {
                tracing::warn!(missing = var, "Billing endpoint hit but billing not configured");
                ApiError::UpstreamUnavailable
            }
            BillingError::Database(err) => ApiError::from(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_are_stable() {
        assert_eq!(ApiError::Unauthenticated.kind(), "unauthenticated");
        assert_eq!(ApiError::NotFound.kind(), "not_found");
        assert_eq!(ApiError::InvalidSignature.kind(), "invalid_signature");
        assert_eq!(ApiError::BadRequest("x".into()).kind(), "bad_request");
        assert_eq!(ApiError::UpstreamUnavailable.kind(), "upstream_unavailable");
        assert_eq!(ApiError::Internal.kind(), "internal");
    }

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(
            ApiError::Unauthenticated.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::InvalidSignature.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::UpstreamUnavailable.status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::Internal.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn billing_errors_map_without_leaking_detail() {
        let err = ApiError::from(BillingError::Upstream("secret detail".to_string()));
        assert_eq!(err.kind(), "upstream_unavailable");
        assert!(!err.to_string().contains("secret detail"));

        let err = ApiError::from(BillingError::InvalidSignature);
        assert_eq!(err.kind(), "invalid_signature");
    }

    #[test]
    fn internal_error_message_is_generic() {
        assert_eq!(ApiError::Internal.to_string(), "internal error");
    }
}
