//! SensorLink trait for a unified sensor transport
//!
//! This module provides a common trait for all sensor transports, enabling
//! both real serial ports and scripted mock links for testing.

use crate::error::Result;
use crate::protocol::Frame;
use std::time::Duration;

/// Statistics for link operations
///
/// Tracks exchange success rates per channel; the session folds these into
/// its snapshot for observers.
#[derive(Debug, Clone, Default)]
pub struct LinkStats {
    /// Total number of successful request/response exchanges
    pub successful_exchanges: u64,
    /// Total number of failed exchanges (timeout, bad frame, I/O error)
    pub failed_exchanges: u64,
    /// Times the link was (re)opened
    pub opens: u64,
}

impl LinkStats {
    /// Record a successful exchange
    pub fn record_success(&mut self) {
        self.successful_exchanges += 1;
    }

    /// Record a failed exchange
    pub fn record_failure(&mut self) {
        self.failed_exchanges += 1;
    }

    /// Calculate success rate as percentage
    pub fn success_rate(&self) -> f64 {
        let total = self.successful_exchanges + self.failed_exchanges;
        if total == 0 {
            100.0
        } else {
            (self.successful_exchanges as f64 / total as f64) * 100.0
        }
    }
}

/// Unified interface for one sensor transport
///
/// One link maps to one serial device and is exclusively owned by one
/// session (or one calibration exchange). Implementations must be `Send`
/// so sessions can run on their own threads.
///
/// # Example
///
/// ```ignore
/// fn poll_once(link: &mut dyn SensorLink, timeout: Duration) -> Result<u16> {
///     let raw = link.exchange(&protocol::read_concentration_frame(), timeout)?;
///     protocol::decode_concentration(&raw)
/// }
/// ```
pub trait SensorLink: Send {
    /// Open the underlying device
    fn open(&mut self) -> Result<()>;

    /// Close the underlying device, releasing the handle
    ///
    /// Must be safe to call repeatedly and on a never-opened link.
    fn close(&mut self);

    /// Whether the device is currently open
    fn is_open(&self) -> bool;

    /// Send one request frame and wait for one response frame
    ///
    /// Blocks for at most `timeout`. Returns the raw 9 bytes without
    /// validating them; the caller runs the codec. Fails with
    /// [`crate::error::AcquireError::Timeout`] when no complete frame
    /// arrives in time.
    fn exchange(&mut self, request: &Frame, timeout: Duration) -> Result<Frame>;

    /// Get link operation statistics
    fn stats(&self) -> &LinkStats;

    /// Human-readable description of the endpoint (port path or mock name)
    fn describe(&self) -> String;
}
