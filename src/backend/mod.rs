//! Acquisition backend: serial links, channel sessions, supervisor
//!
//! This module contains everything that talks to sensor hardware. Each
//! configured channel gets its own session thread that exclusively owns
//! one serial link; the supervisor merges all sessions' output into one
//! bounded event stream for the consumer.
//!
//! # Architecture
//!
//! ```text
//!  ChannelConfig xN
//!        |
//!   Supervisor::start
//!        |                 (one thread per channel)
//!        +--> ChannelSession -- SensorLink --> /dev/ttyUSB0
//!        +--> ChannelSession -- SensorLink --> /dev/ttyUSB1
//!        +--> ...                   |
//!             |  try_send           | 9-byte frames (protocol.rs)
//!             v
//!       bounded fan-in channel
//!             |
//!         EventStream  --> ReadingSink (CSV, console, plots...)
//! ```
//!
//! # Components
//!
//! - [`SensorLink`] - Transport trait: one serial device, open/exchange/close
//! - [`SerialSensorLink`] - Real USB-serial implementation
//! - [`MockSensorLink`] - Scripted implementation for tests (feature-gated)
//! - [`ChannelSession`] - Per-channel poll loop and fault state machine
//! - [`Supervisor`] / [`EventStream`] - Lifecycle and fan-in
//! - [`CalibrationSession`] - One-shot zero/span/ABC exchanges
//!
//! # Example
//!
//! ```ignore
//! use co2log_rs::backend::Supervisor;
//! use co2log_rs::config::ChannelConfig;
//! use co2log_rs::types::ChannelEvent;
//!
//! let configs = vec![
//!     ChannelConfig::new("jar-1", "/dev/cu.SLAB_USBtoUART"),
//!     ChannelConfig::new("jar-2", "/dev/cu.SLAB_USBtoUART2"),
//! ];
//! let (supervisor, stream) = Supervisor::start(configs)?;
//! while let Some(event) = stream.recv() {
//!     match event {
//!         ChannelEvent::Reading(r) => println!("{}: {:?}", r.channel_id, r.concentration_ppm),
//!         ChannelEvent::Fault(f) => eprintln!("{}: {}", f.channel_id, f.kind),
//!     }
//! }
//! supervisor.stop();
//! ```

pub mod calibration;
pub mod link;
#[cfg(any(test, feature = "mock-sensor"))]
pub mod mock_link;
pub mod serial_link;
pub mod session;
pub mod supervisor;

pub use calibration::{request_calibration, CalibrationSession};
pub use link::{LinkStats, SensorLink};
#[cfg(any(test, feature = "mock-sensor"))]
pub use mock_link::{MockBehavior, MockSensorLink};
pub use serial_link::SerialSensorLink;
pub use session::{ChannelSession, SharedChannelState, INITIAL_BACKOFF, MAX_BACKOFF};
pub use supervisor::{EventStream, Supervisor};
