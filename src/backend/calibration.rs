//! One-shot calibration exchanges
//!
//! Calibration is an operator-initiated, consequential action: a zero or
//! span command rewrites the sensor's reference points. The session
//! therefore sends its command exactly once and never retries on its own;
//! a silent retry could apply an unintended second calibration pulse.
//! On timeout the caller (a CLI or a GUI button) decides whether to try
//! again.
//!
//! The acknowledgment deadline is longer than the normal poll timeout
//! because the sensor settles slowly after a calibration command.
//!
//! A calibration exchange needs exclusive use of the port; run it while
//! the channel is not being polled (the original tooling calibrates with
//! the logger stopped).

use super::link::SensorLink;
use super::serial_link::SerialSensorLink;
use crate::config::{ChannelConfig, DEFAULT_CALIBRATION_TIMEOUT_MS};
use crate::error::{AcquireError, Result};
use crate::protocol::{self, Frame};
use crate::types::CalibrationOperation;
use std::time::Duration;

/// A single calibration exchange against one sensor
pub struct CalibrationSession {
    link: Box<dyn SensorLink>,
    timeout: Duration,
}

impl CalibrationSession {
    /// Create a session over a real serial port
    pub fn new(port_path: impl Into<String>, baud_rate: u32) -> Self {
        Self::with_link(Box::new(SerialSensorLink::new(port_path, baud_rate)))
    }

    /// Create a session over an arbitrary link (tests)
    pub fn with_link(link: Box<dyn SensorLink>) -> Self {
        Self {
            link,
            timeout: Duration::from_millis(DEFAULT_CALIBRATION_TIMEOUT_MS),
        }
    }

    /// Override the acknowledgment deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send the command once and wait for the sensor's acknowledgment
    ///
    /// Returns `Ok(())` on an acknowledged command,
    /// [`AcquireError::CalibrationTimedOut`] when no frame arrives in
    /// time, and [`AcquireError::CalibrationRejected`] when the sensor
    /// answers with something other than an echo of the command.
    pub fn execute(&mut self, operation: CalibrationOperation) -> Result<()> {
        let request = command_frame(operation);

        self.link.open()?;
        tracing::info!(
            link = %self.link.describe(),
            %operation,
            "sending calibration command"
        );
        let outcome = self.link.exchange(&request, self.timeout);
        // Scoped release regardless of outcome
        self.link.close();

        let raw = match outcome {
            Ok(raw) => raw,
            Err(AcquireError::Timeout(_)) => {
                return Err(AcquireError::CalibrationTimedOut(self.timeout));
            }
            Err(e) => return Err(e),
        };

        match protocol::decode(&raw) {
            Ok(response) if response.command == request[2] => {
                tracing::info!(%operation, "calibration acknowledged");
                Ok(())
            }
            Ok(response) => Err(AcquireError::CalibrationRejected(format!(
                "sensor echoed command 0x{:02X}, expected 0x{:02X}",
                response.command, request[2]
            ))),
            Err(_) => Err(AcquireError::CalibrationRejected(
                "sensor answered with an invalid frame".to_string(),
            )),
        }
    }
}

/// Build the wire frame for a calibration operation
fn command_frame(operation: CalibrationOperation) -> Frame {
    match operation {
        CalibrationOperation::ZeroPoint => protocol::zero_calibration_frame(),
        CalibrationOperation::SpanPoint(ppm) => protocol::span_calibration_frame(ppm),
        CalibrationOperation::SetAbc(enabled) => protocol::abc_frame(enabled),
    }
}

/// Synchronous calibration entry point for control surfaces
///
/// Resolves the channel's port and baud rate from its configuration and
/// runs one [`CalibrationSession`] exchange with the default deadline.
pub fn request_calibration(
    config: &ChannelConfig,
    operation: CalibrationOperation,
) -> Result<()> {
    CalibrationSession::new(config.port_path.as_str(), config.baud_rate).execute(operation)
}
