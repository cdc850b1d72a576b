// SPDX-License-Identifier: MIT

//! TigerSync daemon.
//!
//! Long-lived background process that keeps every stored TigerSpend
//! credential fresh: revalidates skeys, re-fetches statements, reconciles
//! purchase history and dispatches receipt pings. The web dashboard reads
//! whatever this process last reconciled.

use std::sync::Arc;
use tigersync::{
    config::Config,
    db::FirestoreDb,
    services::{PingsClient, RefreshScheduler, TigerSpendClient},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(
        semester = config.current_semester,
        workers = config.num_workers,
        update_rate_minutes = config.update_rate_minutes,
        "Starting TigerSync"
    );

    let db = FirestoreDb::new(&config.gcp_project_id)
        .await
        .expect("Failed to connect to Firestore");

    let provider = Arc::new(TigerSpendClient::new(&config).expect("Failed to build upstream client"));
    let notifier = Arc::new(PingsClient::new(&config).expect("Failed to build pings client"));

    let scheduler = RefreshScheduler::new(db, provider, notifier, &config);

    // Runs until the process is torn down.
    scheduler.run().await;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tigersync=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
