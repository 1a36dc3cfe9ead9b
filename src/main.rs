//! dbsync: reconciles a target PostgreSQL database's schema and data
//! against a reference database.
//!
//! This is the main entry point for the application.

mod config;
mod diff;
mod error;
mod inspector;
mod interaction;
mod logging;
mod reconciler;
mod schema;
mod sync;
mod value;

use std::process::ExitCode;

use tracing::{error, info};

use crate::config::Settings;
use crate::inspector::PostgresInspector;
use crate::interaction::StdinInteractionPort;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::FAILURE;
        }
    };

    logging::init(settings.log_level, "dbsync.log");

    info!("starting schema and data reconciliation");

    match run(&settings).await {
        Ok(summary) => {
            info!(
                rows_inserted = summary.rows_inserted,
                rows_updated = summary.rows_updated,
                "reconciliation completed successfully"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "reconciliation failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: &Settings) -> error::Result<sync::SyncSummary> {
    let reference = PostgresInspector::connect(&settings.reference_dsn)?;
    let target = PostgresInspector::connect(&settings.target_dsn)?;
    let interaction = StdinInteractionPort;

    reconciler::run(&reference, &target, &interaction).await
}
