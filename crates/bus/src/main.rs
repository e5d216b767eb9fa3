//! The bus relay binary.
//!
//! Listens on a TCP port for WebSocket connections and fans broadcast
//! `job_request` traffic from producers out to every registered scheduler
//! except the one that sent it. Flags: `--port` and `-d` (SPEC_FULL.md §6).

use std::sync::Arc;

use clap::Parser;
use dispatch_bus::BusRelay;

#[derive(Parser)]
#[command(name = "bus", version, about = "Broadcast relay between producers and schedulers")]
struct Cli {
    /// TCP port to listen on
    #[arg(long, default_value_t = 8101)]
    port: u16,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dispatch_common::logging::init(cli.debug);

    let relay = Arc::new(BusRelay::new());

    tokio::select! {
        result = relay.serve(cli.port) => {
            if let Err(err) = result {
                tracing::error!(error = %err, "bus relay stopped with an error");
                return Err(err.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received, stopping bus relay");
        }
    }

    Ok(())
}
