//! Core data types for the acquisition core
//!
//! This module contains the fundamental data structures shared between the
//! channel sessions, the supervisor, and event consumers.
//!
//! # Main Types
//!
//! - [`Reading`] - One timestamped concentration sample from one channel
//! - [`FaultEvent`] / [`FaultKind`] - A per-channel fault annotation
//! - [`ChannelEvent`] - The tagged union delivered on the merged stream
//! - [`ChannelStatus`] - The per-channel state machine states
//! - [`ChannelSnapshot`] - Read-only view of a channel's runtime state
//! - [`CalibrationOperation`] - The three calibration commands
//!
//! Consumers must handle both event variants exhaustively; a fault is not
//! an error to the consumer, it is data about a gap in the series.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single poll-cycle result from one channel
///
/// `concentration_ppm` is `None` for the gap marker emitted when a poll
/// cycle fails; the series then keeps one entry per cycle regardless of
/// sensor health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    /// Configured identifier of the originating channel
    pub channel_id: String,
    /// Wall-clock time at emission
    pub timestamp: DateTime<Utc>,
    /// Measured concentration, `None` when the cycle failed
    pub concentration_ppm: Option<u16>,
}

impl Reading {
    /// Create a successful reading stamped with the current time
    pub fn ok(channel_id: impl Into<String>, concentration_ppm: u16) -> Self {
        Self {
            channel_id: channel_id.into(),
            timestamp: Utc::now(),
            concentration_ppm: Some(concentration_ppm),
        }
    }

    /// Create a gap marker for a failed poll cycle
    pub fn gap(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            timestamp: Utc::now(),
            concentration_ppm: None,
        }
    }

    /// Whether this reading carries a measured value
    pub fn is_ok(&self) -> bool {
        self.concentration_ppm.is_some()
    }
}

/// The kinds of per-channel faults a session can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    /// No response frame arrived within the response timeout
    Timeout,
    /// A frame arrived but failed start-marker/checksum validation
    ChecksumMismatch,
    /// The serial port could not be opened
    PortUnavailable,
    /// The channel gave up on an open port and is reconnecting
    Disconnected,
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FaultKind::Timeout => write!(f, "timeout"),
            FaultKind::ChecksumMismatch => write!(f, "checksum mismatch"),
            FaultKind::PortUnavailable => write!(f, "port unavailable"),
            FaultKind::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// A fault annotation observable on the merged stream
///
/// Faults drive the session's reconnection decisions; to consumers they
/// explain gaps in the reading series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultEvent {
    /// Configured identifier of the originating channel
    pub channel_id: String,
    /// Wall-clock time at emission
    pub timestamp: DateTime<Utc>,
    /// What went wrong
    pub kind: FaultKind,
    /// Consecutive protocol failures on the open port, including this one
    pub consecutive_failures: u32,
}

impl FaultEvent {
    /// Create a fault event stamped with the current time
    pub fn new(channel_id: impl Into<String>, kind: FaultKind, consecutive_failures: u32) -> Self {
        Self {
            channel_id: channel_id.into(),
            timestamp: Utc::now(),
            kind,
            consecutive_failures,
        }
    }
}

/// One event on the merged acquisition stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelEvent {
    /// A poll-cycle result (value or gap marker)
    Reading(Reading),
    /// A fault annotation
    Fault(FaultEvent),
}

impl ChannelEvent {
    /// The originating channel's identifier
    pub fn channel_id(&self) -> &str {
        match self {
            ChannelEvent::Reading(r) => &r.channel_id,
            ChannelEvent::Fault(f) => &f.channel_id,
        }
    }

    /// The emission timestamp
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ChannelEvent::Reading(r) => r.timestamp,
            ChannelEvent::Fault(f) => f.timestamp,
        }
    }
}

/// States of the per-channel session state machine
///
/// Transitions: `Connecting → Polling → (Faulted ↔ Polling) → Closed`,
/// with `Closed` entered only on an explicit shutdown request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ChannelStatus {
    /// Trying to open the serial port (with backoff between attempts)
    #[default]
    Connecting,
    /// Port open, poll cycles running
    Polling,
    /// Too many consecutive failures; closing the port before reconnecting
    Faulted,
    /// Terminal: shut down and port released
    Closed,
}

impl std::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelStatus::Connecting => write!(f, "connecting"),
            ChannelStatus::Polling => write!(f, "polling"),
            ChannelStatus::Faulted => write!(f, "faulted"),
            ChannelStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Read-only view of one channel's runtime state
///
/// Sessions own and mutate their state; the supervisor and external
/// observers only see these snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelSnapshot {
    /// Configured identifier of the channel
    pub channel_id: String,
    /// Current state-machine state
    pub status: ChannelStatus,
    /// Consecutive protocol failures on the currently open port
    pub consecutive_failures: u32,
    /// Time of the last successful reading, if any
    pub last_success: Option<DateTime<Utc>>,
    /// Total successful readings since the session started
    pub total_readings: u64,
    /// Total faults of any kind since the session started
    pub total_faults: u64,
    /// Events dropped because the merged stream's buffer was full
    pub dropped_events: u64,
}

/// An operator-initiated calibration command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationOperation {
    /// Zero-point calibration; the sensor must sit in ~400 ppm fresh air
    ZeroPoint,
    /// Span-point calibration against the given reference concentration
    SpanPoint(u16),
    /// Switch automatic baseline correction on or off
    SetAbc(bool),
}

impl std::fmt::Display for CalibrationOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalibrationOperation::ZeroPoint => write!(f, "zero-point calibration"),
            CalibrationOperation::SpanPoint(ppm) => {
                write!(f, "span-point calibration at {} ppm", ppm)
            }
            CalibrationOperation::SetAbc(true) => write!(f, "ABC on"),
            CalibrationOperation::SetAbc(false) => write!(f, "ABC off"),
        }
    }
}
