//! Membergate Background Worker
//!
//! Handles scheduled jobs:
//! - Access reconciliation sweep (hourly): re-derives every user's access
//!   level from their subscription rows and repairs any drift

use std::time::Duration;

use membergate_billing::AccessService;
use membergate_shared::create_pool;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

async fn run_sweep(access: &AccessService) {
    info!("Running scheduled access reconciliation sweep");
    match access.recompute_all().await {
        Ok(summary) => {
            info!(
                users_checked = summary.users_checked,
                users_repaired = summary.users_repaired,
                "Access reconciliation sweep complete"
            );
        }
        Err(err) => {
            error!(error = %err, "Access reconciliation sweep failed");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting Membergate Worker");

    #[allow(clippy::expect_used)] // Fail-fast on startup if required config is missing
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = create_pool(&database_url).await?;
    info!("Database pool created");

    let access = AccessService::new(pool.clone());

    // Run once on startup so a fresh deployment converges immediately
    run_sweep(&access).await;

    // Create scheduler
    let scheduler = JobScheduler::new().await?;

    // Reconcile access levels hourly
    let sweep_service = access.clone();
    scheduler
        .add(Job::new_async("0 15 * * * *", move |_uuid, _l| {
            let access = sweep_service.clone();
            Box::pin(async move {
                run_sweep(&access).await;
            })
        })?)
        .await?;

    scheduler.start().await?;
    info!("Scheduler started");

    // Keep the worker alive
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        info!("Worker heartbeat");
    }
}
