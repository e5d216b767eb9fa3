//! The producer binary.
//!
//! Connects to the bus as a producer and loops: emit a randomized
//! `job_request`, then sleep for an inter-arrival time drawn either from a
//! constant period (`-p`) or a Gaussian distribution (`-g`, mean `-p`,
//! stddev `-s`, floored at 5ms). Flags: `-p`, `-g`, `-s`, `-d`, `--bus`
//! (SPEC_FULL.md §6).

use std::time::Duration;

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use tokio_tungstenite::tungstenite::Message;

use dispatch_bus::connect;
use dispatch_common::{DispatchError, Envelope, JobPayload, RegisterKind};

const MIN_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Parser)]
#[command(name = "producer", version, about = "Emits randomized job traffic onto the bus")]
struct Cli {
    /// Mean inter-submission period, in seconds
    #[arg(short = 'p', long = "period", default_value_t = 5.0)]
    period: f64,

    /// Draw inter-arrival times from a Gaussian distribution instead of a constant period
    #[arg(short = 'g', long = "gaussian")]
    gaussian: bool,

    /// Standard deviation for `-g`, in seconds
    #[arg(short = 's', long = "stddev", default_value_t = 2.0)]
    stddev: f64,

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

    tracing::info!(bus = %cli.bus, period = cli.period, gaussian = cli.gaussian, "connecting to bus");
    let (mut sink, mut source) = connect(&cli.bus, RegisterKind::Producer).await?;

    let normal = if cli.gaussian {
        Some(Normal::new(cli.period, cli.stddev).expect("stddev must be finite"))
    } else {
        None
    };
    let mut rng = rand::thread_rng();

    loop {
        let payload = JobPayload {
            runtime: rng.gen_range(3..=15) as f64,
            priority: rng.gen_range(0..=10),
        };
        let frame = Envelope::job_request(payload).to_frame();
        if let Err(err) = sink.send(Message::Text(frame.into())).await {
            let error = DispatchError::BusDisconnect(err.to_string());
            tracing::info!(%error, "shutting down");
            break;
        }
        tracing::debug!(runtime = payload.runtime, priority = payload.priority, "submitted job");

        let interval = next_interval(&mut rng, normal.as_ref(), cli.period);

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            frame = source.next() => {
                if frame.is_none() {
                    let error = DispatchError::BusDisconnect("stream ended".to_string());
                    tracing::info!(%error, "shutting down");
                    break;
                }
            }
            _ = dispatch_common::signal::shutdown_requested() => {
                tracing::info!("shutdown signal received");
                break;
            }
        }
    }

    Ok(())
}

fn next_interval(rng: &mut impl Rng, normal: Option<&Normal<f64>>, period: f64) -> Duration {
    let seconds = match normal {
        Some(dist) => dist.sample(rng).max(MIN_INTERVAL.as_secs_f64()),
        None => period,
    };
    Duration::from_secs_f64(seconds.max(MIN_INTERVAL.as_secs_f64()))
}
