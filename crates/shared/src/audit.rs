//! Append-only audit log writer
//!
//! One row per recorded event. Rows are never updated or deleted; the
//! table is the forensic record for webhook replay and access changes.

use sqlx::PgExecutor;
use uuid::Uuid;

/// Subsystem that produced an audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditSource {
    Auth,
    Webhook,
    Access,
    Billing,
}

impl AuditSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditSource::Auth => "auth",
            AuditSource::Webhook => "webhook",
            AuditSource::Access => "access",
            AuditSource::Billing => "billing",
        }
    }
}

/// Outcome recorded with an audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditOutcome {
    Success,
    Applied,
    StaleSkipped,
    Ignored,
    Unmatched,
    InvalidSignature,
    Rejected,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "success",
            AuditOutcome::Applied => "applied",
            AuditOutcome::StaleSkipped => "stale_skipped",
            AuditOutcome::Ignored => "ignored",
            AuditOutcome::Unmatched => "unmatched",
            AuditOutcome::InvalidSignature => "invalid_signature",
            AuditOutcome::Rejected => "rejected",
        }
    }
}

/// A new audit entry to append
#[derive(Debug, Clone)]
pub struct AuditEntry<'a> {
    pub user_id: Option<Uuid>,
    pub event_type: &'a str,
    pub source: AuditSource,
    pub request_id: Option<&'a str>,
    pub outcome: AuditOutcome,
    pub details: Option<String>,
}

impl<'a> AuditEntry<'a> {
    pub fn new(event_type: &'a str, source: AuditSource, outcome: AuditOutcome) -> Self {
        Self {
            user_id: None,
            event_type,
            source,
            request_id: None,
            outcome,
            details: None,
        }
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn request_id(mut self, request_id: &'a str) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Append one audit row
///
/// Takes any executor so callers inside a transaction share its atomicity
/// with the state change they are recording.
pub async fn record_audit<'e, E>(db: E, entry: &AuditEntry<'_>) -> Result<Uuid, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO audit_logs (id, user_id, event_type, source, request_id, status, details)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(entry.user_id)
    .bind(entry.event_type)
    .bind(entry.source.as_str())
    .bind(entry.request_id)
    .bind(entry.outcome.as_str())
    .bind(entry.details.as_deref())
    .fetch_one(db)
    .await?;

    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_optional_fields() {
        let user_id = Uuid::new_v4();
        let entry = AuditEntry::new("webhook_received", AuditSource::Webhook, AuditOutcome::Applied)
            .user(user_id)
            .request_id("evt_123")
            .details("customer.subscription.updated");

        assert_eq!(entry.user_id, Some(user_id));
        assert_eq!(entry.request_id, Some("evt_123"));
        assert_eq!(entry.outcome.as_str(), "applied");
        assert_eq!(entry.source.as_str(), "webhook");
    }

    #[test]
    fn outcome_strings_are_stable() {
        assert_eq!(AuditOutcome::StaleSkipped.as_str(), "stale_skipped");
        assert_eq!(AuditOutcome::InvalidSignature.as_str(), "invalid_signature");
        assert_eq!(AuditOutcome::Unmatched.as_str(), "unmatched");
    }
}
