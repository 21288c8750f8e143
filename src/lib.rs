//! # co2log-rs: Multichannel CO2 Acquisition Core
//!
//! An acquisition core for MH-Z19C NDIR CO2 sensors attached over
//! independent USB-serial adapters. The architecture separates per-channel
//! serial polling from consumption: every channel runs its own session
//! thread with exclusive ownership of its port, and a supervisor merges
//! all channels into one bounded, time-ordered event stream that sinks
//! (CSV log, console, a live plot) drain at their own pace.
//!
//! ## Architecture
//!
//! - **Protocol**: pure codec for the sensor's fixed 9-byte frames
//! - **Backend**: per-channel sessions with timeout/reconnect handling,
//!   supervised fan-in over crossbeam channels
//! - **Calibration**: one-shot zero/span/ABC exchanges on the same framing
//! - **Sinks**: trait-based consumers; CSV logging included
//!
//! Faults are isolated per channel: a disconnected or noisy sensor keeps
//! reconnecting on its own schedule and never affects its siblings'
//! cadence.
//!
//! ## Example
//!
//! ```ignore
//! use co2log_rs::{
//!     backend::Supervisor,
//!     config::AcquisitionConfig,
//!     sink::{CsvSink, ReadingSink},
//! };
//!
//! fn main() -> co2log_rs::Result<()> {
//!     let config = AcquisitionConfig::load("channels.json")?;
//!     let (supervisor, stream) = Supervisor::start(config.channels.clone())?;
//!
//!     let mut sink = CsvSink::open("co2_log.csv")?;
//!     while let Some(event) = stream.recv() {
//!         sink.deliver(&event)?;
//!     }
//!
//!     supervisor.stop();
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod protocol;
pub mod sink;
pub mod types;

// Re-export commonly used types
pub use backend::{CalibrationSession, EventStream, SensorLink, Supervisor};
pub use config::{AcquisitionConfig, ChannelConfig};
pub use error::{AcquireError, Result};
pub use sink::{CsvSink, ReadingSink};
pub use types::{CalibrationOperation, ChannelEvent, FaultEvent, FaultKind, Reading};
