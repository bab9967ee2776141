// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Membergate Billing Module
//!
//! Handles Stripe integration for the premium subscription:
//!
//! - **Webhooks**: signature verification and idempotent, apply-if-newer
//!   application of subscription events
//! - **Access resolution**: deriving a user's access level from their
//!   subscription rows (the only writer of `users.access_level`)
//! - **Checkout**: customer and checkout-session creation

pub mod access;
pub mod checkout;
pub mod client;
pub mod error;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

// Access
pub use access::{resolve_access, AccessService, Reconciliation, SweepSummary, PREMIUM_STATUSES};

// Checkout
pub use checkout::{CheckoutLink, CheckoutService};

// Client
pub use client::{StripeClient, StripeConfig, WebhookConfig, STRIPE_CALL_TIMEOUT};

// Error
pub use error::{BillingError, BillingResult};

// Webhooks
pub use webhooks::{
    parse_event, verify_signature, EventPayload, SubscriptionUpdate, WebhookEvent, WebhookHandler,
    WebhookOutcome, WebhookReceipt,
};

use sqlx::PgPool;

/// Main billing service combining webhook intake, access resolution, and
/// (when Stripe is configured) outbound checkout
pub struct BillingService {
    /// Present only when `STRIPE_SECRET_KEY` is configured
    pub checkout: Option<CheckoutService>,
    pub webhooks: WebhookHandler,
    pub access: AccessService,
}

impl BillingService {
    /// Create a billing service from environment variables
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        let stripe_config = StripeConfig::from_env()?;
        let webhook_config = WebhookConfig::from_env();
        Ok(Self::new(pool, stripe_config, webhook_config))
    }

    /// Create a billing service with explicit config
    pub fn new(
        pool: PgPool,
        stripe_config: Option<StripeConfig>,
        webhook_config: WebhookConfig,
    ) -> Self {
        let checkout = stripe_config.map(|config| {
            let stripe = StripeClient::new(config);
            CheckoutService::new(stripe, pool.clone())
        });

        Self {
            checkout,
            webhooks: WebhookHandler::new(pool.clone(), webhook_config),
            access: AccessService::new(pool),
        }
    }
}
