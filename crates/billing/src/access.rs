//! Access level resolution
//!
//! `access_level` is always a pure function of a user's subscription rows.
//! Handlers never set it directly; they call back into this module so the
//! same derivation runs after webhook application, on-demand reconciliation,
//! and the worker's scheduled sweep.

use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use membergate_shared::{AccessLevel, SubscriptionStatus};

use crate::error::BillingResult;

/// Statuses that grant premium access. `past_due` is included as the
/// grace-period status: access survives a failed renewal until the
/// subscription transitions to `canceled` or `unpaid`.
pub const PREMIUM_STATUSES: &[SubscriptionStatus] = &[
    SubscriptionStatus::Active,
    SubscriptionStatus::Trialing,
    SubscriptionStatus::PastDue,
];

/// Derive the access level implied by a set of subscription statuses
///
/// Pure and deterministic: safe to re-run at any time to repair drift.
pub fn resolve_access(statuses: &[SubscriptionStatus]) -> AccessLevel {
    if statuses.iter().any(|s| PREMIUM_STATUSES.contains(s)) {
        AccessLevel::Premium
    } else {
        AccessLevel::Free
    }
}

/// Result of reconciling one user's access level against their subscriptions
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct Reconciliation {
    pub previous: AccessLevel,
    pub current: AccessLevel,
    pub changed: bool,
}

/// Summary of a full reconciliation sweep
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct SweepSummary {
    pub users_checked: u64,
    pub users_repaired: u64,
}

/// Persisting wrapper around [`resolve_access`]
#[derive(Clone)]
pub struct AccessService {
    pool: PgPool,
}

impl AccessService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Recompute one user's access level from their subscription rows
    pub async fn recompute_for_user(&self, user_id: Uuid) -> BillingResult<Reconciliation> {
        let mut tx = self.pool.begin().await?;
        let outcome = recompute_in_tx(&mut tx, user_id).await?;
        tx.commit().await?;

        if outcome.changed {
            tracing::info!(
                user_id = %user_id,
                previous = %outcome.previous,
                current = %outcome.current,
                "Access level repaired"
            );
        }

        Ok(outcome)
    }

    /// Recompute access for every user that has subscription rows
    ///
    /// Backfill/drift-repair operation; run by the worker on a schedule and
    /// harmless to run at any time.
    pub async fn recompute_all(&self) -> BillingResult<SweepSummary> {
        let user_ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT DISTINCT user_id FROM subscriptions")
                .fetch_all(&self.pool)
                .await?;

        let mut summary = SweepSummary::default();
        for user_id in user_ids {
            let outcome = self.recompute_for_user(user_id).await?;
            summary.users_checked += 1;
            if outcome.changed {
                summary.users_repaired += 1;
            }
        }

        Ok(summary)
    }
}

/// Recompute a user's access level inside an existing transaction
///
/// Used by the webhook processor so the subscription upsert and the access
/// update commit or roll back together.
pub(crate) async fn recompute_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
) -> BillingResult<Reconciliation> {
    let statuses: Vec<String> =
        sqlx::query_scalar("SELECT status FROM subscriptions WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&mut **tx)
            .await?;

    let statuses: Vec<SubscriptionStatus> =
        statuses.iter().map(|s| SubscriptionStatus::parse(s)).collect();
    let current = resolve_access(&statuses);

    let previous: String = sqlx::query_scalar("SELECT access_level FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_one(&mut **tx)
        .await?;
    let previous = AccessLevel::parse(&previous);

    if previous != current {
        sqlx::query("UPDATE users SET access_level = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(current.as_str())
            .execute(&mut **tx)
            .await?;
    }

    Ok(Reconciliation {
        previous,
        current,
        changed: previous != current,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subscriptions_is_free() {
        assert_eq!(resolve_access(&[]), AccessLevel::Free);
    }

    #[test]
    fn one_active_subscription_is_premium() {
        assert_eq!(
            resolve_access(&[SubscriptionStatus::Active]),
            AccessLevel::Premium
        );
    }

    #[test]
    fn canceled_subscription_is_free() {
        assert_eq!(
            resolve_access(&[SubscriptionStatus::Canceled]),
            AccessLevel::Free
        );
    }

    #[test]
    fn any_premium_status_wins_over_canceled_rows() {
        assert_eq!(
            resolve_access(&[
                SubscriptionStatus::Canceled,
                SubscriptionStatus::Unpaid,
                SubscriptionStatus::Trialing,
            ]),
            AccessLevel::Premium
        );
    }

    #[test]
    fn past_due_keeps_access_during_grace() {
        assert_eq!(
            resolve_access(&[SubscriptionStatus::PastDue]),
            AccessLevel::Premium
        );
    }

    #[test]
    fn unknown_status_never_grants_access() {
        assert_eq!(
            resolve_access(&[SubscriptionStatus::Unknown, SubscriptionStatus::Incomplete]),
            AccessLevel::Free
        );
    }

    #[test]
    fn resolver_is_deterministic_and_does_not_mutate_input() {
        let statuses = vec![SubscriptionStatus::Active, SubscriptionStatus::Canceled];
        let before = statuses.clone();

        let first = resolve_access(&statuses);
        let second = resolve_access(&statuses);

        assert_eq!(first, second);
        assert_eq!(statuses, before);
    }
}
