//! Reservation sweep binary
//!
//! Opens the ledger and reclaims timed-out job holds until interrupted.

use anyhow::Result;
use credit_ledger::{Config, CreditLedger, ReservationSweeper};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting SwapCredit reservation sweeper");

    let config = Config::from_env()?;
    let sweep_config = config.sweep.clone();

    let ledger = CreditLedger::open(config).await?;
    tracing::info!("Ledger opened successfully");

    let sweeper = ReservationSweeper::new(ledger.handle(), sweep_config);

    tokio::select! {
        _ = sweeper.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down reservation sweeper");
        }
    }

    ledger.shutdown().await?;
    Ok(())
}
