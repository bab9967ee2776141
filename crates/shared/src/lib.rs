// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Membergate shared infrastructure
//!
//! Database pool construction, embedded migrations, and the domain row
//! types shared by the API, billing, and worker crates.

pub mod audit;
pub mod db;
pub mod models;

pub use audit::{record_audit, AuditEntry, AuditOutcome, AuditSource};
pub use db::{create_pool, run_migrations};
pub use models::{AccessLevel, AuditLogEntry, Subscription, SubscriptionStatus, User};
