// src/bin/sync_inventory.rs
//! Cron entry point: `sync-inventory`, no arguments.
//!
//! Progress goes to stdout, errors to stderr. Exits 1 when the database
//! cannot be opened or `blood_inventory` is missing, 0 otherwise.

use std::process::ExitCode;
use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use bloodbank::config::{load_config, Config};
use bloodbank::db::create_database_pool;
use bloodbank::inventory::{InventorySync, SyncError};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let config = load_config()?;
    setup_logging(&config)?;

    // The job never creates the database; a wrong DATABASE_URL must fail
    let pool = create_database_pool(&config.database, false)
        .await
        .context("Failed to open database")?;

    println!("Starting inventory sync for {}", config.database.url);

    let report = match InventorySync::new(&pool, &config.inventory).run().await {
        Ok(report) => report,
        Err(e @ SyncError::InventoryTableMissing) => return Err(e.into()),
        Err(e) => return Err(anyhow::Error::new(e).context("Inventory sync aborted")),
    };

    for warning in &report.warnings {
        eprintln!("WARNING: {}", warning);
    }
    if report.has_failures() {
        for failure in &report.failed {
            eprintln!(
                "ERROR: donor {} ({}): {}",
                failure.donor_id, failure.source_table, failure.message
            );
        }
    }

    println!(
        "Scanned {} donors: {} units inserted, {} already in inventory, {} failed",
        report.scanned,
        report.inserted,
        report.skipped_existing,
        report.failed.len()
    );

    pool.close().await;
    Ok(())
}

/// Logs to stderr so stdout carries only the progress report.
fn setup_logging(config: &Config) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.as_str()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(())
}
