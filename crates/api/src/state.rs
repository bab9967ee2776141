//! Application state

use std::sync::Arc;

use sqlx::PgPool;

use membergate_billing::BillingService;

use crate::auth::{AuthState, JwtManager};
use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub jwt_manager: JwtManager,
    pub billing: Arc<BillingService>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config, billing: BillingService) -> Self {
        let jwt_manager = JwtManager::new(&config.jwt_secret);

        if billing.checkout.is_some() {
            tracing::info!("Stripe checkout enabled");
        } else {
            tracing::warn!("Stripe checkout not configured (missing STRIPE_SECRET_KEY)");
        }

        Self {
            pool,
            config: Arc::new(config),
            jwt_manager,
            billing: Arc::new(billing),
        }
    }

    /// Get auth state for middleware
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            jwt_manager: self.jwt_manager.clone(),
            pool: self.pool.clone(),
        }
    }
}
