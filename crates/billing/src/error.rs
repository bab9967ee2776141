//! Billing error taxonomy

use std::time::Duration;

/// Errors surfaced by the billing crate
///
/// A stale webhook event is deliberately NOT an error: superseded events
/// are acknowledged as successful no-ops and audited as skipped.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// Webhook signature missing, malformed, expired, or mismatched.
    /// Fails closed: no payload byte is parsed before this check passes.
    #[error("webhook signature verification failed")]
    InvalidSignature,

    /// Payload passed signature verification but is not a parseable event
    #[error("malformed webhook payload: {0}")]
    MalformedEvent(String),

    /// The billing provider call failed
    #[error("billing provider error: {0}")]
    Upstream(String),

    /// The billing provider call exceeded its deadline; not retried here
    #[error("billing provider call timed out after {0:?}")]
    UpstreamTimeout(Duration),

    /// No user matches the given reference
    #[error("no user found for {0}")]
    UserNotFound(String),

    /// Billing is not configured on this deployment
    #[error("billing not configured: missing {0}")]
    NotConfigured(&'static str),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type BillingResult<T> = Result<T, BillingError>;
