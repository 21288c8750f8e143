//! Configuration for the acquisition core
//!
//! A configuration file is a JSON document listing the sensor channels to
//! acquire from, plus a few global knobs. Channel entries only need an id
//! and a port path; everything else has defaults matching the sensor's
//! fixed UART setup and the logger's historical cadence.
//!
//! ```json
//! {
//!   "channels": [
//!     { "channel_id": "jar-1", "port_path": "/dev/cu.SLAB_USBtoUART" },
//!     { "channel_id": "jar-2", "port_path": "/dev/cu.SLAB_USBtoUART2",
//!       "poll_interval_ms": 1000 }
//!   ]
//! }
//! ```
//!
//! Validation runs before any port is touched: duplicate channel ids,
//! duplicate port paths, and empty port paths are all startup-fatal, since
//! two sessions must never contend for one serial device.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// The sensor's fixed UART baud rate (8 data bits, no parity, 1 stop bit)
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default poll cadence per channel
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

/// Default deadline for one response frame
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 1000;

/// Default protocol-failure budget before a channel reconnects
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Default deadline for a calibration acknowledgment (sensor settle time
/// is well above the normal poll timeout)
pub const DEFAULT_CALIBRATION_TIMEOUT_MS: u64 = 5000;

/// Default capacity of the merged event stream
pub const DEFAULT_CHANNEL_BUFFER_SIZE: usize = 1024;

/// Errors in channel configuration, all fatal at startup
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Two channels share one id
    #[error("duplicate channel id `{0}`")]
    DuplicateChannelId(String),

    /// Two channels share one serial port
    #[error("duplicate port path `{0}`")]
    DuplicatePortPath(String),

    /// A channel has no port path
    #[error("channel `{0}` has an empty port path")]
    EmptyPortPath(String),

    /// No channel with the requested id exists
    #[error("unknown channel id `{0}`")]
    UnknownChannelId(String),

    /// The config file could not be read
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file could not be parsed
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The config file could not be written
    #[error("failed to write config file {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration of one sensor channel
///
/// Immutable once loaded; one instance per configured sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Unique identifier carried on every event from this channel
    pub channel_id: String,

    /// Serial device path (e.g. `/dev/cu.SLAB_USBtoUART`, `COM3`)
    pub port_path: String,

    /// UART baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Poll cadence in milliseconds, anchored to wall clock
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Deadline for one response frame in milliseconds
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,

    /// Consecutive protocol failures tolerated before reconnecting
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_response_timeout_ms() -> u64 {
    DEFAULT_RESPONSE_TIMEOUT_MS
}

fn default_max_consecutive_failures() -> u32 {
    DEFAULT_MAX_CONSECUTIVE_FAILURES
}

impl ChannelConfig {
    /// Create a config with defaults for everything but id and port
    pub fn new(channel_id: impl Into<String>, port_path: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            port_path: port_path.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }

    /// Override the poll cadence
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Override the response deadline
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Override the failure budget
    pub fn with_max_consecutive_failures(mut self, max: u32) -> Self {
        self.max_consecutive_failures = max;
        self
    }

    /// Poll cadence as a [`Duration`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Response deadline as a [`Duration`]
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

/// Top-level acquisition configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Channels to acquire from, in display order
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,

    /// Capacity of the merged event stream before overflow drops
    #[serde(default = "default_channel_buffer_size")]
    pub channel_buffer_size: usize,

    /// CSV log destination, if the logger binary should write one
    #[serde(default)]
    pub log_path: Option<PathBuf>,
}

fn default_channel_buffer_size() -> usize {
    DEFAULT_CHANNEL_BUFFER_SIZE
}

impl AcquisitionConfig {
    /// Load a configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save the configuration as pretty-printed JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self).expect("config serializes");
        std::fs::write(path, content).map_err(|e| {
            ConfigError::Write {
                path: path.to_path_buf(),
                source: e,
            }
            .into()
        })
    }

    /// Check the configuration-time invariants
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        validate_channels(&self.channels)
    }

    /// Find a channel by id
    pub fn channel(&self, channel_id: &str) -> Option<&ChannelConfig> {
        self.channels.iter().find(|c| c.channel_id == channel_id)
    }
}

/// Check the configuration-time invariants of a channel list
///
/// Channel ids must be unique (events are keyed on them) and port paths
/// must be unique and non-empty (each serial device is owned by exactly
/// one session).
pub fn validate_channels(channels: &[ChannelConfig]) -> std::result::Result<(), ConfigError> {
    let mut seen_ids = std::collections::HashSet::new();
    let mut seen_ports = std::collections::HashSet::new();

    for channel in channels {
        if channel.port_path.is_empty() {
            return Err(ConfigError::EmptyPortPath(channel.channel_id.clone()));
        }
        if !seen_ids.insert(channel.channel_id.as_str()) {
            return Err(ConfigError::DuplicateChannelId(channel.channel_id.clone()));
        }
        if !seen_ports.insert(channel.port_path.as_str()) {
            return Err(ConfigError::DuplicatePortPath(channel.port_path.clone()));
        }
    }
    Ok(())
}
