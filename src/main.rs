//! Sweeper daemon.
//!
//! The settlement engine itself is consumed as a library (the embedding
//! service constructs a `SettlementCoordinator`); this binary runs the one
//! background job the engine needs: the rejection-deadline sweeper.

use adsettle::engine::rejection::RejectionPolicy;
use adsettle::{config::Config, db::init_db, DeadlineSweeper, Repository};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let pool = match init_db(&config.database_path).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let repo = Arc::new(Repository::new(pool));
    let sweeper = DeadlineSweeper::new(
        repo,
        RejectionPolicy::from_config(&config),
        config.sweep_interval_ms,
        config.txn_retry_budget_ms,
    );
    let sweeper_handle = tokio::spawn(sweeper.run());

    tracing::info!("Deadline sweeper running; press Ctrl-C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("Failed to listen for shutdown signal: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Shutting down");
    sweeper_handle.abort();
}
