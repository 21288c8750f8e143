//! MH-Z19C calibration tool
//!
//! Sends a single zero-point, span-point, or ABC command to one sensor and
//! reports the acknowledgment. Nothing is retried: calibration rewrites
//! the sensor's reference points, so a failed attempt is left to the
//! operator to repeat deliberately.
//!
//! For zero and span calibration the sensor must first sit in the
//! reference gas long enough to stabilize (twenty minutes in fresh air is
//! the usual zero procedure); this tool only performs the exchange.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use co2log_rs::{
    backend::CalibrationSession,
    config::{AcquisitionConfig, DEFAULT_BAUD_RATE},
    types::CalibrationOperation,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Calibrate one MH-Z19C CO2 sensor
#[derive(Debug, Parser)]
#[command(name = "co2cal", version, about)]
struct Args {
    /// Serial port of the sensor (e.g. /dev/cu.SLAB_USBtoUART)
    #[arg(short, long, conflicts_with_all = ["config", "channel"])]
    port: Option<String>,

    /// Channel configuration file to resolve --channel against
    #[arg(long, requires = "channel", default_value = "channels.json")]
    config: PathBuf,

    /// Channel id from the configuration file
    #[arg(long)]
    channel: Option<String>,

    /// UART baud rate (only with --port; configs carry their own)
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Seconds to wait for the sensor's acknowledgment
    #[arg(long, default_value_t = 5)]
    timeout_secs: u64,

    #[command(subcommand)]
    action: Action,
}

#[derive(Debug, Subcommand)]
enum Action {
    /// Zero-point calibration (sensor must sit in ~400 ppm fresh air)
    Zero,
    /// Span-point calibration against a reference concentration
    Span {
        /// Reference concentration in ppm
        #[arg(default_value_t = 2000)]
        ppm: u16,
    },
    /// Switch automatic baseline correction on or off
    Abc { state: Switch },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let operation = match args.action {
        Action::Zero => CalibrationOperation::ZeroPoint,
        Action::Span { ppm } => CalibrationOperation::SpanPoint(ppm),
        Action::Abc { state } => CalibrationOperation::SetAbc(matches!(state, Switch::On)),
    };

    let (port, baud) = resolve_target(&args)?;
    tracing::info!(%port, baud, %operation, "calibrating");

    let mut session = CalibrationSession::new(port.as_str(), baud)
        .with_timeout(Duration::from_secs(args.timeout_secs));
    session
        .execute(operation)
        .with_context(|| format!("calibrating sensor on {}", port))?;

    tracing::info!("calibration acknowledged");
    Ok(())
}

/// Resolve the target port either directly or through the config file
fn resolve_target(args: &Args) -> anyhow::Result<(String, u32)> {
    if let Some(port) = &args.port {
        return Ok((port.clone(), args.baud));
    }
    let channel_id = args
        .channel
        .as_deref()
        .context("pass either --port or --channel")?;
    let config = AcquisitionConfig::load(&args.config)
        .with_context(|| format!("loading {:?}", args.config))?;
    let channel = config
        .channel(channel_id)
        .with_context(|| format!("channel `{}` not found in {:?}", channel_id, args.config))?;
    Ok((channel.port_path.clone(), channel.baud_rate))
}
