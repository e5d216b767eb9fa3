//! The scheduler binary.
//!
//! Connects to the bus as a scheduler, decodes each broadcast job payload
//! into a `TaskDescription`, and hands it to a `SchedulerManager` backed by
//! one `SchedulerBin`/`PriorityRunner` pair. Flags: `-s`, `-t`, `-d`,
//! `--bus` (SPEC_FULL.md §6).

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures_util::StreamExt;

use dispatch_bus::connect;
use dispatch_common::task::SequenceGenerator;
use dispatch_common::{DispatchError, JobPayload, RegisterKind, TaskDescription};
use dispatch_process::SleepWorkload;
use dispatch_runner::PriorityRunner;
use dispatch_scheduler::{SchedulerBin, SchedulerManager};

#[derive(Parser)]
#[command(name = "scheduler", version, about = "Runs job traffic off the bus under a priority-preemptive pool")]
struct Cli {
    /// Pool size: max concurrently running jobs
    #[arg(short = 's', long = "size", default_value_t = 5)]
    size: usize,

    /// Per-job wall-clock timeout in seconds; 0 disables the timeout
    #[arg(short = 't', long = "timeout", default_value_t = 10.0)]
    timeout: f64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Bus WebSocket URL
    #[arg(long, default_value = "ws://127.0.0.1:8101")]
    bus: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dispatch_common::logging::init(cli.debug);

    let timeout = if cli.timeout > 0.0 {
        Some(Duration::from_secs_f64(cli.timeout))
    } else {
        None
    };

    tracing::info!(bus = %cli.bus, size = cli.size, timeout = ?timeout, "connecting to bus");
    let (_sink, mut source) = connect(&cli.bus, RegisterKind::Scheduler).await?;

    let runner = PriorityRunner::new(cli.size, timeout, Arc::new(SleepWorkload));
    let bin = SchedulerBin::new(runner);
    let manager = SchedulerManager::new(vec![bin]);
    let seq_gen = SequenceGenerator::new();

    loop {
        tokio::select! {
            frame = source.next() => {
                match frame {
                    Some(Ok(message)) => handle_frame(&message, &manager, &seq_gen, cli.timeout),
                    Some(Err(err)) => {
                        let error = DispatchError::BusDisconnect(err.to_string());
                        tracing::warn!(%error, "shutting down");
                        break;
                    }
                    None => {
                        let error = DispatchError::BusDisconnect("stream ended".to_string());
                        tracing::info!(%error, "shutting down");
                        break;
                    }
                }
            }
            _ = dispatch_common::signal::shutdown_requested() => {
                tracing::info!("shutdown signal received");
                break;
            }
        }
    }

    manager.shutdown_all();
    Ok(())
}

fn handle_frame(
    message: &tokio_tungstenite::tungstenite::Message,
    manager: &SchedulerManager,
    seq_gen: &SequenceGenerator,
    cli_timeout: f64,
) {
    let Ok(text) = message.to_text() else {
        return; // binary/ping/pong frames carry no job traffic
    };
    match serde_json::from_str::<JobPayload>(text) {
        Ok(payload) => {
            let timeout = if cli_timeout > 0.0 { Some(cli_timeout) } else { None };
            let task = TaskDescription::from_payload(payload, timeout, seq_gen);
            manager.handle(task);
        }
        Err(err) => {
            let error = DispatchError::MalformedMessage(err.to_string());
            tracing::warn!(%error, frame = text, "dropping malformed job frame");
        }
    }
}
