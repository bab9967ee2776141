//! Stripe client and configuration
//!
//! Environment-derived secrets are captured once at startup into these
//! immutable structs and passed explicitly; nothing reads the environment
//! after construction.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{BillingError, BillingResult};

/// Deadline for outbound Stripe calls. Failures are surfaced to the
/// caller, never retried at this layer.
pub const STRIPE_CALL_TIMEOUT: Duration = Duration::from_secs(20);

/// Configuration for outbound Stripe calls (checkout, customer creation)
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    /// Price of the premium subscription plan
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

impl StripeConfig {
    /// Read Stripe configuration from the environment
    ///
    /// Returns `None` when `STRIPE_SECRET_KEY` is unset, in which case the
    /// deployment runs without outbound billing (webhook intake and access
    /// resolution still work).
    pub fn from_env() -> BillingResult<Option<Self>> {
        let secret_key = match std::env::var("STRIPE_SECRET_KEY") {
            Ok(key) if !key.is_empty() => key,
            _ => return Ok(None),
        };

        let price_id = std::env::var("STRIPE_PRICE_ID")
            .map_err(|_| BillingError::NotConfigured("STRIPE_PRICE_ID"))?;

        let success_url = std::env::var("STRIPE_SUCCESS_URL")
            .unwrap_or_else(|_| "http://localhost:3000/success".to_string());
        let cancel_url = std::env::var("STRIPE_CANCEL_URL")
            .unwrap_or_else(|_| "http://localhost:3000/cancel".to_string());

        Ok(Some(Self {
            secret_key,
            price_id,
            success_url,
            cancel_url,
        }))
    }
}

/// Configuration for inbound webhook verification
#[derive(Debug, Clone, Default)]
pub struct WebhookConfig {
    /// Shared secret for the HMAC signature check. When absent, events are
    /// rejected unless `allow_unverified` is set.
    pub signing_secret: Option<String>,
    /// Explicit non-production escape hatch: accept unsigned events when no
    /// signing secret is configured. Never implied.
    pub allow_unverified: bool,
}

impl WebhookConfig {
    pub fn from_env() -> Self {
        let signing_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .ok()
            .filter(|s| !s.is_empty());
        let allow_unverified = std::env::var("ALLOW_UNVERIFIED_WEBHOOKS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            signing_secret,
            allow_unverified,
        }
    }
}

/// Shared Stripe API client
#[derive(Clone)]
pub struct StripeClient {
    client: stripe::Client,
    config: Arc<StripeConfig>,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        let client = stripe::Client::new(config.secret_key.clone());
        Self {
            client,
            config: Arc::new(config),
        }
    }

    pub fn client(&self) -> &stripe::Client {
        &self.client
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}
