//! Headless multichannel CO2 logger
//!
//! Loads a channel configuration, starts the acquisition supervisor, and
//! drains the merged event stream into a CSV log (and the console) until
//! Ctrl-C or an optional duration limit.

use anyhow::Context;
use clap::Parser;
use co2log_rs::{
    backend::{EventStream, Supervisor},
    config::AcquisitionConfig,
    sink::{CsvSink, ReadingSink},
    types::ChannelEvent,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Multichannel MH-Z19C CO2 logger
#[derive(Debug, Parser)]
#[command(name = "co2log", version, about)]
struct Args {
    /// Path to the channel configuration file (JSON)
    #[arg(short, long, default_value = "channels.json")]
    config: PathBuf,

    /// CSV output path (overrides `log_path` from the config)
    #[arg(short, long)]
    outfile: Option<PathBuf>,

    /// Stop after this many seconds instead of running until Ctrl-C
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Write daily-rotating application logs into this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Poll scripted mock sensors instead of real hardware
    #[cfg(feature = "mock-sensor")]
    #[arg(long)]
    mock: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging; keep the appender guard alive for the process
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,co2log_rs=debug"));
    let _guard = match &args.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "co2log.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
            None
        }
    };

    let config = AcquisitionConfig::load(&args.config)
        .with_context(|| format!("loading {:?}", args.config))?;
    if config.channels.is_empty() {
        anyhow::bail!("no channels configured in {:?}", args.config);
    }

    let outfile = args
        .outfile
        .clone()
        .or_else(|| config.log_path.clone())
        .unwrap_or_else(|| PathBuf::from("co2_log.csv"));
    let mut sink = CsvSink::open(&outfile).with_context(|| format!("opening {:?}", outfile))?;

    tracing::info!(
        channels = config.channels.len(),
        log = %outfile.display(),
        "starting acquisition"
    );

    let (supervisor, stream) = start_supervisor(&args, &config)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        tracing::info!("shutdown signal received");
        r.store(false, Ordering::SeqCst);
    })?;

    let deadline = args
        .duration_secs
        .map(|secs| Instant::now() + Duration::from_secs(secs));

    drain_events(&stream, &mut sink, &running, deadline)?;

    let snapshots = supervisor.snapshots();
    supervisor.stop();
    sink.flush()?;

    for snapshot in snapshots {
        tracing::info!(
            channel = %snapshot.channel_id,
            readings = snapshot.total_readings,
            faults = snapshot.total_faults,
            dropped = snapshot.dropped_events,
            "channel summary"
        );
    }
    Ok(())
}

/// Drain the stream into the sink until shutdown, deadline, or stream end
fn drain_events(
    stream: &EventStream,
    sink: &mut CsvSink,
    running: &AtomicBool,
    deadline: Option<Instant>,
) -> anyhow::Result<()> {
    while running.load(Ordering::SeqCst) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            tracing::info!("duration limit reached");
            break;
        }
        match stream.recv_timeout(Duration::from_millis(250)) {
            Ok(event) => {
                report(&event);
                sink.deliver(&event)?;
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }
    Ok(())
}

/// Mirror the event to the console log
fn report(event: &ChannelEvent) {
    match event {
        ChannelEvent::Reading(r) => match r.concentration_ppm {
            Some(ppm) => tracing::info!(channel = %r.channel_id, ppm, "CO2"),
            None => tracing::warn!(channel = %r.channel_id, "no reading this cycle"),
        },
        ChannelEvent::Fault(f) => tracing::warn!(
            channel = %f.channel_id,
            kind = %f.kind,
            consecutive = f.consecutive_failures,
            "fault"
        ),
    }
}

#[cfg(feature = "mock-sensor")]
fn start_supervisor(
    args: &Args,
    config: &AcquisitionConfig,
) -> co2log_rs::Result<(Supervisor, EventStream)> {
    use co2log_rs::backend::{MockBehavior, MockSensorLink};
    use std::sync::atomic::AtomicU16;

    if args.mock {
        let index = AtomicU16::new(0);
        return Supervisor::start_with(
            config.channels.clone(),
            config.channel_buffer_size,
            move |channel| {
                let n = index.fetch_add(1, Ordering::Relaxed);
                Box::new(
                    MockSensorLink::new(&channel.channel_id)
                        .with_default(MockBehavior::Respond(450 + n * 175)),
                )
            },
        );
    }
    Supervisor::start(config.channels.clone())
}

#[cfg(not(feature = "mock-sensor"))]
fn start_supervisor(
    _args: &Args,
    config: &AcquisitionConfig,
) -> co2log_rs::Result<(Supervisor, EventStream)> {
    Supervisor::start(config.channels.clone())
}
