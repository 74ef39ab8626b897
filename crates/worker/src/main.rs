//! Supportly background worker
//!
//! Delivers queued notification emails (booking confirmations, reminders and
//! call summaries) and keeps the failed-job history bounded.

mod config;
mod processor;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use supportly_api::email::NotificationEmailService;
use supportly_shared::{create_pool, queue::FAILED_HISTORY, run_migrations, JobQueue};

use crate::config::WorkerConfig;
use crate::processor::{BatchReport, JobProcessor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    init_tracing();

    let config = WorkerConfig::from_env().context("Invalid configuration")?;

    let pool = create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to connect to database")?;
    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let queue = JobQueue::connect(&config.redis_url)
        .await
        .context("Failed to connect to Redis")?;

    let email = NotificationEmailService::new(config.email.clone());
    if !email.is_enabled() {
        tracing::warn!("RESEND_API_KEY not set, notification emails will be skipped");
    }

    let processor = JobProcessor::new(pool, queue, email, config.batch_size);

    let mut scheduler = JobScheduler::new()
        .await
        .context("Failed to create scheduler")?;

    // Poll for due jobs. A tick that fires while the previous batch is still
    // running is skipped.
    let poller = processor.clone();
    let running = Arc::new(Mutex::new(()));
    scheduler
        .add(CronJob::new_repeated_async(
            config.poll_interval,
            move |_id, _scheduler| {
                let poller = poller.clone();
                let running = Arc::clone(&running);
                Box::pin(async move {
                    let Ok(_guard) = running.try_lock() else {
                        tracing::debug!("Previous batch still running, skipping tick");
                        return;
                    };
                    let report = poller.process_due_jobs().await;
                    if report != BatchReport::default() {
                        tracing::info!(
                            sent = report.sent,
                            skipped = report.skipped,
                            retried = report.retried,
                            failed = report.failed,
                            "Job batch finished"
                        );
                    }
                })
            },
        )?)
        .await
        .context("Failed to schedule job poller")?;

    let trimmer = processor.clone();
    scheduler
        .add(CronJob::new_async(
            config.trim_schedule.as_str(),
            move |_id, _scheduler| {
                let trimmer = trimmer.clone();
                Box::pin(async move {
                    trimmer.trim_failed(FAILED_HISTORY).await;
                })
            },
        )?)
        .await
        .context("Failed to schedule failed-job trim")?;

    scheduler.start().await.context("Failed to start scheduler")?;
    tracing::info!(
        poll_interval_secs = config.poll_interval.as_secs(),
        batch_size = config.batch_size,
        "Supportly worker started"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    scheduler
        .shutdown()
        .await
        .context("Failed to stop scheduler")?;
    tracing::info!("Worker stopped");

    Ok(())
}

/// `RUST_LOG` filter (default `info,supportly_worker=debug`); JSON lines when
/// `LOG_FORMAT=json`
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,supportly_worker=debug,supportly_shared=debug"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}
