//! mediasync - debrid library reconciliation service
//!
//! Without flags it runs the recurring database update until Ctrl-C.
//! `--run`, `--list` and `--reset-db` perform one action and exit.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mediasync::cli::{CliOptions, Command};
use mediasync::config::Config;
use mediasync::db::Database;
use mediasync::jobs::{self, JobContext, JobSettings, export, scheduler};
use mediasync::providers::Providers;

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "mediasync=info".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let options = CliOptions::from_args();
    for arg in &options.ignored {
        tracing::warn!(arg = %arg, "Ignoring unrecognized argument");
    }

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    let db = Database::connect_with_retry(
        &config.database_url,
        config.database_max_connections,
        Duration::from_secs(2),
        Duration::from_secs(30),
    )
    .await?;
    db.sync_schema().await?;
    tracing::info!(database = %config.database_url, "Database ready");

    match options.command {
        Command::ResetDb => {
            db.reset().await?;
            tracing::info!("Database reset");
        }
        Command::List { limit, offset } => {
            let views = export::list_torrent_views(&db, limit, offset).await?;
            println!("{}", serde_json::to_string_pretty(&views)?);
        }
        Command::Run(kind) => {
            let providers = Providers::from_config(&config)?;
            let ctx = JobContext::new(db.clone(), providers, JobSettings::from(&config));
            let reports = jobs::run_job(&ctx, kind).await?;
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        Command::Schedule => {
            let providers = Providers::from_config(&config)?;
            scheduler::register_jobs(
                &db,
                config.sync_interval_minutes,
                config.misfire_grace_seconds,
            )
            .await?;

            let ctx = Arc::new(JobContext::new(
                db.clone(),
                providers,
                JobSettings::from(&config),
            ));
            let mut job_scheduler = scheduler::start_scheduler(
                ctx,
                Duration::from_secs(config.scheduler_poll_seconds.max(1)),
            )
            .await?;

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            tracing::info!("Shutting down");
            job_scheduler.shutdown().await?;
        }
    }

    db.close().await;
    Ok(())
}
