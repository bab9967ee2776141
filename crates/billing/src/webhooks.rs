//! Stripe webhook handling
//!
//! Verifies event signatures over the raw payload bytes, then applies
//! subscription events to the store idempotently. Ordering is decided by
//! the event's own creation timestamp, never by arrival order: an event is
//! applied only if no newer event for the same subscription reference has
//! already been recorded. Stale and duplicate deliveries are acknowledged
//! as successful no-ops. Every call writes exactly one audit row.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use sqlx::{PgPool, Postgres, Transaction};
use subtle::ConstantTimeEq;
use time::OffsetDateTime;
use uuid::Uuid;

use membergate_shared::audit::{record_audit, AuditEntry, AuditOutcome, AuditSource};

use crate::access::recompute_in_tx;
use crate::client::WebhookConfig;
use crate::error::{BillingError, BillingResult};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of the signed timestamp. Signatures older than this are
/// rejected even when the HMAC matches (replay window).
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Event types that carry subscription state in `data.object`
const SUBSCRIPTION_EVENT_PREFIX: &str = "customer.subscription.";

// =============================================================================
// Parsed event types
// =============================================================================

/// A verified, parsed webhook event
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    /// Provider-assigned unique event id
    pub id: String,
    pub event_type: String,
    /// When the provider created the event; the ordering key
    pub created: OffsetDateTime,
    pub payload: EventPayload,
}

/// State carried by an event, if any
#[derive(Debug, Clone)]
pub enum EventPayload {
    Subscription(SubscriptionUpdate),
    /// Unknown or state-free event types: acknowledged and audited,
    /// never an error.
    Unhandled,
}

/// Subscription fields extracted from `data.object`
#[derive(Debug, Clone)]
pub struct SubscriptionUpdate {
    pub subscription_ref: String,
    pub customer_ref: Option<String>,
    /// Raw status string; stored verbatim so statuses this build does not
    /// know about survive a later upgrade.
    pub status: String,
    pub plan: Option<String>,
    /// `metadata.user_id`, stamped on subscriptions we create at checkout
    pub user_ref: Option<Uuid>,
    pub current_period_start: Option<OffsetDateTime>,
    pub current_period_end: Option<OffsetDateTime>,
}

/// How an event was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Newer than anything recorded for its subscription; state changed
    Applied,
    /// Superseded by an already-recorded event; successful no-op
    StaleSkipped,
    /// Unknown event type; successful no-op
    Ignored,
    /// No user matches the event's references; acknowledged so the
    /// provider stops retrying
    Unmatched,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Applied => "applied",
            WebhookOutcome::StaleSkipped => "stale_skipped",
            WebhookOutcome::Ignored => "ignored",
            WebhookOutcome::Unmatched => "unmatched",
        }
    }

    fn audit_outcome(&self) -> AuditOutcome {
        match self {
            WebhookOutcome::Applied => AuditOutcome::Applied,
            WebhookOutcome::StaleSkipped => AuditOutcome::StaleSkipped,
            WebhookOutcome::Ignored => AuditOutcome::Ignored,
            WebhookOutcome::Unmatched => AuditOutcome::Unmatched,
        }
    }
}

/// Acknowledgement returned to the HTTP layer
#[derive(Debug, Clone, serde::Serialize)]
pub struct WebhookReceipt {
    pub event_id: String,
    pub event_type: String,
    pub outcome: &'static str,
    pub user_id: Option<Uuid>,
}

// =============================================================================
// Raw wire format
// =============================================================================

#[derive(Debug, Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    created: i64,
    data: RawEventData,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawSubscription {
    id: String,
    customer: Option<serde_json::Value>,
    status: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
    plan: Option<RawPlan>,
    current_period_start: Option<i64>,
    current_period_end: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawPlan {
    id: String,
}

// =============================================================================
// Handler
// =============================================================================

/// Webhook event processor
pub struct WebhookHandler {
    pool: PgPool,
    config: WebhookConfig,
}

impl WebhookHandler {
    pub fn new(pool: PgPool, config: WebhookConfig) -> Self {
        Self { pool, config }
    }

    /// Verify, parse, and apply one raw webhook delivery
    ///
    /// The single entry point for the HTTP layer. Guarantees one audit row
    /// per call whatever the outcome.
    pub async fn process(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> BillingResult<WebhookReceipt> {
        if let Err(err) = self.check_signature(payload, signature) {
            tracing::warn!(error = %err, "Webhook rejected before parsing");
            let entry = AuditEntry::new(
                "webhook_rejected",
                AuditSource::Webhook,
                AuditOutcome::InvalidSignature,
            )
            .details(err.to_string());
            record_audit(&self.pool, &entry).await?;
            return Err(err);
        }

        let event = match parse_event(payload) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(error = %err, "Webhook payload unparseable");
                let entry = AuditEntry::new(
                    "webhook_rejected",
                    AuditSource::Webhook,
                    AuditOutcome::Rejected,
                )
                .details(err.to_string());
                record_audit(&self.pool, &entry).await?;
                return Err(err);
            }
        };

        self.apply(&event).await
    }

    fn check_signature(&self, payload: &[u8], signature: Option<&str>) -> BillingResult<()> {
        match &self.config.signing_secret {
            Some(secret) => {
                let header = signature.ok_or(BillingError::InvalidSignature)?;
                verify_signature(secret, payload, header)
            }
            None if self.config.allow_unverified => {
                tracing::warn!("Accepting UNVERIFIED webhook (ALLOW_UNVERIFIED_WEBHOOKS is set)");
                Ok(())
            }
            None => {
                tracing::error!("Webhook received but STRIPE_WEBHOOK_SECRET is not configured");
                Err(BillingError::InvalidSignature)
            }
        }
    }

    /// Apply a verified event to the subscription store
    pub async fn apply(&self, event: &WebhookEvent) -> BillingResult<WebhookReceipt> {
        match &event.payload {
            EventPayload::Unhandled => {
                tracing::info!(
                    event_type = %event.event_type,
                    event_id = %event.id,
                    "Unhandled webhook event type - acknowledged"
                );
                let entry = AuditEntry::new(
                    &event.event_type,
                    AuditSource::Webhook,
                    AuditOutcome::Ignored,
                )
                .request_id(&event.id);
                record_audit(&self.pool, &entry).await?;

                Ok(WebhookReceipt {
                    event_id: event.id.clone(),
                    event_type: event.event_type.clone(),
                    outcome: WebhookOutcome::Ignored.as_str(),
                    user_id: None,
                })
            }
            EventPayload::Subscription(update) => self.apply_subscription(event, update).await,
        }
    }

    /// Upsert-and-recompute for a subscription event, as one transaction
    ///
    /// The subscription upsert, access recomputation, and audit row commit
    /// or roll back together, so two concurrently delivered events for the
    /// same reference cannot interleave into an inconsistent state.
    async fn apply_subscription(
        &self,
        event: &WebhookEvent,
        update: &SubscriptionUpdate,
    ) -> BillingResult<WebhookReceipt> {
        let mut tx = self.pool.begin().await?;

        let user_id = resolve_user(&mut tx, update).await?;
        let Some(user_id) = user_id else {
            tracing::warn!(
                event_id = %event.id,
                subscription = %update.subscription_ref,
                customer = ?update.customer_ref,
                "Webhook event matches no known user"
            );
            let entry = AuditEntry::new(
                &event.event_type,
                AuditSource::Webhook,
                AuditOutcome::Unmatched,
            )
            .request_id(&event.id)
            .details(format!("subscription {}", update.subscription_ref));
            record_audit(&mut *tx, &entry).await?;
            tx.commit().await?;

            return Ok(WebhookReceipt {
                event_id: event.id.clone(),
                event_type: event.event_type.clone(),
                outcome: WebhookOutcome::Unmatched.as_str(),
                user_id: None,
            });
        };

        // Apply-if-newer: the conditional upsert only lands when no later
        // event for this subscription reference has been recorded. A stale
        // or duplicate delivery returns no row.
        let applied: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO subscriptions
                (id, user_id, stripe_subscription_id, stripe_customer_id, plan, status,
                 current_period_start, current_period_end, last_event_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (stripe_subscription_id) DO UPDATE SET
                status = EXCLUDED.status,
                plan = COALESCE(EXCLUDED.plan, subscriptions.plan),
                stripe_customer_id =
                    COALESCE(EXCLUDED.stripe_customer_id, subscriptions.stripe_customer_id),
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                last_event_at = EXCLUDED.last_event_at,
                updated_at = NOW()
            WHERE subscriptions.last_event_at < EXCLUDED.last_event_at
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&update.subscription_ref)
        .bind(update.customer_ref.as_deref())
        .bind(update.plan.as_deref())
        .bind(&update.status)
        .bind(update.current_period_start)
        .bind(update.current_period_end)
        .bind(event.created)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = if applied.is_some() {
            let reconciliation = recompute_in_tx(&mut tx, user_id).await?;
            tracing::info!(
                event_id = %event.id,
                event_type = %event.event_type,
                subscription = %update.subscription_ref,
                user_id = %user_id,
                status = %update.status,
                access_level = %reconciliation.current,
                "Webhook event applied"
            );
            WebhookOutcome::Applied
        } else {
            tracing::info!(
                event_id = %event.id,
                subscription = %update.subscription_ref,
                "Stale or duplicate webhook event - skipped"
            );
            WebhookOutcome::StaleSkipped
        };

        let entry = AuditEntry::new(
            &event.event_type,
            AuditSource::Webhook,
            outcome.audit_outcome(),
        )
        .user(user_id)
        .request_id(&event.id)
        .details(format!(
            "subscription {} status {}",
            update.subscription_ref, update.status
        ));
        record_audit(&mut *tx, &entry).await?;

        tx.commit().await?;

        Ok(WebhookReceipt {
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            outcome: outcome.as_str(),
            user_id: Some(user_id),
        })
    }
}

/// Find the user an event belongs to
///
/// Prefers the billing-customer reference; falls back to the user id we
/// stamped into subscription metadata at checkout. When the fallback hits
/// and the user row has no customer reference yet, backfill it.
async fn resolve_user(
    tx: &mut Transaction<'_, Postgres>,
    update: &SubscriptionUpdate,
) -> BillingResult<Option<Uuid>> {
    if let Some(customer_ref) = update.customer_ref.as_deref() {
        let found: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM users WHERE stripe_customer_id = $1")
                .bind(customer_ref)
                .fetch_optional(&mut **tx)
                .await?;
        if found.is_some() {
            return Ok(found);
        }
    }

    if let Some(user_ref) = update.user_ref {
        let found: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1")
            .bind(user_ref)
            .fetch_optional(&mut **tx)
            .await?;
        if let (Some(user_id), Some(customer_ref)) = (found, update.customer_ref.as_deref()) {
            sqlx::query(
                "UPDATE users SET stripe_customer_id = $2, updated_at = NOW()
                 WHERE id = $1 AND stripe_customer_id IS NULL",
            )
            .bind(user_id)
            .bind(customer_ref)
            .execute(&mut **tx)
            .await?;
        }
        return Ok(found);
    }

    Ok(None)
}

// =============================================================================
// Signature verification
// =============================================================================

/// Verify a `t=<unix>,v1=<hex>` signature header over the raw payload
///
/// HMAC-SHA256 over `"{t}.{payload}"` with the shared secret, constant-time
/// comparison, and a freshness window on the signed timestamp. Runs before
/// any byte of the payload is parsed; any defect fails closed.
pub fn verify_signature(secret: &str, payload: &[u8], header: &str) -> BillingResult<()> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for part in header.split(',') {
        let mut kv = part.trim().splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some("t"), Some(value)) => timestamp = value.parse().ok(),
            (Some("v1"), Some(value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(BillingError::InvalidSignature)?;
    if candidates.is_empty() {
        return Err(BillingError::InvalidSignature);
    }

    let now = OffsetDateTime::now_utc().unix_timestamp();
    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        tracing::warn!(
            timestamp = timestamp,
            now = now,
            "Webhook signature timestamp outside tolerance"
        );
        return Err(BillingError::InvalidSignature);
    }

    // The secret's "whsec_" prefix is not part of the key material
    let secret_key = secret.strip_prefix("whsec_").unwrap_or(secret);

    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
        .map_err(|_| BillingError::InvalidSignature)?;
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    let computed = hex::encode(mac.finalize().into_bytes());

    let matched = candidates
        .iter()
        .any(|candidate| bool::from(computed.as_bytes().ct_eq(candidate.as_bytes())));

    if matched {
        Ok(())
    } else {
        Err(BillingError::InvalidSignature)
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse a verified payload into a [`WebhookEvent`]
pub fn parse_event(payload: &[u8]) -> BillingResult<WebhookEvent> {
    let raw: RawEvent =
        serde_json::from_slice(payload).map_err(|e| BillingError::MalformedEvent(e.to_string()))?;

    let created = OffsetDateTime::from_unix_timestamp(raw.created).map_err(|_| {
        BillingError::MalformedEvent(format!("bad created timestamp {}", raw.created))
    })?;

    let payload = if raw.event_type.starts_with(SUBSCRIPTION_EVENT_PREFIX) {
        let sub: RawSubscription = serde_json::from_value(raw.data.object)
            .map_err(|e| BillingError::MalformedEvent(e.to_string()))?;
        EventPayload::Subscription(subscription_update(sub)?)
    } else {
        EventPayload::Unhandled
    };

    Ok(WebhookEvent {
        id: raw.id,
        event_type: raw.event_type,
        created,
        payload,
    })
}

fn subscription_update(sub: RawSubscription) -> BillingResult<SubscriptionUpdate> {
    // `customer` is a bare id string, or an expanded object with an id
    let customer_ref = match &sub.customer {
        Some(serde_json::Value::String(id)) => Some(id.clone()),
        Some(serde_json::Value::Object(obj)) => obj
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        _ => None,
    };

    let user_ref = sub
        .metadata
        .get("user_id")
        .and_then(|s| Uuid::parse_str(s).ok());

    let plan = sub
        .metadata
        .get("plan")
        .cloned()
        .or_else(|| sub.plan.as_ref().map(|p| p.id.clone()));

    let period = |ts: Option<i64>| -> BillingResult<Option<OffsetDateTime>> {
        ts.map(|t| {
            OffsetDateTime::from_unix_timestamp(t)
                .map_err(|_| BillingError::MalformedEvent(format!("bad period timestamp {t}")))
        })
        .transpose()
    };

    Ok(SubscriptionUpdate {
        subscription_ref: sub.id,
        customer_ref,
        status: sub.status,
        plan,
        user_ref,
        current_period_start: period(sub.current_period_start)?,
        current_period_end: period(sub.current_period_end)?,
    })
}
