//! Checkout session creation
//!
//! Creates the Stripe customer on first use, then a subscription-mode
//! checkout session. Outbound calls are bounded by a deadline and never
//! retried here; failures surface to the caller.

use sqlx::PgPool;
use std::future::Future;
use uuid::Uuid;

use membergate_shared::audit::{record_audit, AuditEntry, AuditOutcome, AuditSource};

use crate::client::{StripeClient, STRIPE_CALL_TIMEOUT};
use crate::error::{BillingError, BillingResult};

/// A created checkout session, ready for redirect
#[derive(Debug, Clone, serde::Serialize)]
pub struct CheckoutLink {
    pub checkout_url: String,
    pub session_id: String,
}

/// Checkout session service
#[derive(Clone)]
pub struct CheckoutService {
    stripe: StripeClient,
    pool: PgPool,
}

impl CheckoutService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self { stripe, pool }
    }

    /// Create a checkout session for the premium plan
    pub async fn create_session(&self, user_id: Uuid) -> BillingResult<CheckoutLink> {
        let user: Option<(String, Option<String>)> =
            sqlx::query_as("SELECT email, stripe_customer_id FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        let (email, customer_id) =
            user.ok_or_else(|| BillingError::UserNotFound(format!("user {user_id}")))?;

        let customer_id = match customer_id {
            Some(id) => id,
            None => self.create_customer(user_id, &email).await?,
        };

        let config = self.stripe.config();
        let mut params = stripe::CreateCheckoutSession::new();
        params.mode = Some(stripe::CheckoutSessionMode::Subscription);
        params.customer = Some(
            customer_id
                .parse()
                .map_err(|_| BillingError::Upstream(format!("bad customer id {customer_id}")))?,
        );
        params.line_items = Some(vec![stripe::CreateCheckoutSessionLineItems {
            price: Some(config.price_id.clone()),
            quantity: Some(1),
            ..Default::default()
        }]);
        params.success_url = Some(&config.success_url);
        params.cancel_url = Some(&config.cancel_url);
        let user_ref = user_id.to_string();
        params.client_reference_id = Some(&user_ref);
        // Stamped onto the subscription so webhook events can be matched
        // back to the user even before the customer id is linked.
        let metadata = stripe::Metadata::from([("user_id".to_string(), user_ref.clone())]);
        params.metadata = Some(metadata.clone());
        params.subscription_data = Some(stripe::CreateCheckoutSessionSubscriptionData {
            metadata: Some(metadata),
            ..Default::default()
        });

        let session = bounded(stripe::CheckoutSession::create(
            self.stripe.client(),
            params,
        ))
        .await?;

        let checkout_url = session
            .url
            .ok_or_else(|| BillingError::Upstream("checkout session has no url".to_string()))?;
        let session_id = session.id.to_string();

        tracing::info!(
            user_id = %user_id,
            session_id = %session_id,
            "Checkout session created"
        );

        let entry = AuditEntry::new(
            "checkout_session_created",
            AuditSource::Billing,
            AuditOutcome::Success,
        )
        .user(user_id)
        .request_id(&session_id);
        record_audit(&self.pool, &entry).await?;

        Ok(CheckoutLink {
            checkout_url,
            session_id,
        })
    }

    /// Create the billing customer for a user and persist the reference
    async fn create_customer(&self, user_id: Uuid, email: &str) -> BillingResult<String> {
        let mut params = stripe::CreateCustomer::new();
        params.email = Some(email);
        let user_ref = user_id.to_string();
        params.metadata = Some(stripe::Metadata::from([(
            "user_id".to_string(),
            user_ref,
        )]));

        let customer = bounded(stripe::Customer::create(self.stripe.client(), params)).await?;
        let customer_id = customer.id.to_string();

        sqlx::query(
            "UPDATE users SET stripe_customer_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(user_id)
        .bind(&customer_id)
        .execute(&self.pool)
        .await?;

        tracing::info!(user_id = %user_id, customer_id = %customer_id, "Billing customer created");

        Ok(customer_id)
    }
}

/// Run a Stripe call under the shared deadline
async fn bounded<T, F>(fut: F) -> BillingResult<T>
where
    F: Future<Output = Result<T, stripe::StripeError>>,
{
    match tokio::time::timeout(STRIPE_CALL_TIMEOUT, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(BillingError::Upstream(err.to_string())),
        Err(_) => Err(BillingError::UpstreamTimeout(STRIPE_CALL_TIMEOUT)),
    }
}
