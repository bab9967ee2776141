//! HTTP routes

pub mod access;
pub mod auth;
pub mod health;
pub mod stripe;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::auth::require_auth;
use crate::state::AppState;

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    let protected = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/access/status", get(access::status))
        .route("/access/reconcile", post(access::reconcile))
        .route("/stripe/checkout", post(stripe::create_checkout))
        .route_layer(middleware::from_fn_with_state(auth_state, require_auth));

    Router::new()
        .route("/health", get(health::health))
        .route("/version", get(health::version))
        .route("/auth/login", post(auth::login))
        .route("/stripe/webhook", post(stripe::webhook))
        .merge(protected)
        .with_state(state)
}
