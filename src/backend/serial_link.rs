//! Serial port implementation of [`SensorLink`]
//!
//! Talks to an MH-Z19C over a USB-serial adapter with the sensor's fixed
//! UART setup: 8 data bits, no parity, 1 stop bit, 9600 baud by default.
//!
//! # Resynchronization
//!
//! Cheap adapters occasionally deliver stray bytes between frames. After a
//! read, if the buffer does not begin with the start marker, the link scans
//! one extra frame's worth of bytes for a marker-aligned window before
//! giving up, the same recovery the original diagnostics used. A window
//! that still fails the checksum is reported as a checksum fault by the
//! caller's decode, never silently accepted.

use super::link::{LinkStats, SensorLink};
use crate::error::{AcquireError, Result};
use crate::protocol::{Frame, FRAME_LEN, START_BYTE};
use std::io::{Read, Write};
use std::time::Duration;

/// A [`SensorLink`] backed by a real serial port
pub struct SerialSensorLink {
    /// Serial device path
    port_path: String,
    /// UART baud rate
    baud_rate: u32,
    /// Open port handle, `None` while closed
    port: Option<Box<dyn serialport::SerialPort>>,
    /// Link statistics
    stats: LinkStats,
}

impl SerialSensorLink {
    /// Create a closed link for the given device
    pub fn new(port_path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_path: port_path.into(),
            baud_rate,
            port: None,
            stats: LinkStats::default(),
        }
    }

    /// Read one frame, scanning past stray leading bytes
    fn read_frame(port: &mut Box<dyn serialport::SerialPort>) -> Result<Frame> {
        let mut buf = [0u8; FRAME_LEN];
        port.read_exact(&mut buf).map_err(map_read_error)?;

        if buf[0] == START_BYTE {
            return Ok(buf);
        }

        // Lost alignment: pull up to one more frame of bytes and look for
        // a start marker with a full frame behind it.
        let mut window = buf.to_vec();
        let mut extra = [0u8; FRAME_LEN];
        if let Ok(n) = port.read(&mut extra) {
            window.extend_from_slice(&extra[..n]);
        }
        for offset in 1..window.len() {
            if window[offset] == START_BYTE && window.len() - offset >= FRAME_LEN {
                let mut frame = [0u8; FRAME_LEN];
                frame.copy_from_slice(&window[offset..offset + FRAME_LEN]);
                return Ok(frame);
            }
        }
        // No aligned frame in the window; report as desync
        Err(AcquireError::ChecksumMismatch)
    }
}

/// Translate a blocking-read failure into the crate's taxonomy
fn map_read_error(e: std::io::Error) -> AcquireError {
    if e.kind() == std::io::ErrorKind::TimedOut {
        // The deadline is applied by the caller via set_timeout; report a
        // plain timeout and let the session attach the duration.
        AcquireError::Timeout(Duration::ZERO)
    } else {
        AcquireError::Io(e)
    }
}

impl SensorLink for SerialSensorLink {
    fn open(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }
        let port = serialport::new(self.port_path.as_str(), self.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(Duration::from_millis(crate::config::DEFAULT_RESPONSE_TIMEOUT_MS))
            .open()?;
        self.port = Some(port);
        self.stats.opens += 1;
        tracing::debug!(port = %self.port_path, "serial port opened");
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            tracing::debug!(port = %self.port_path, "serial port closed");
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn exchange(&mut self, request: &Frame, timeout: Duration) -> Result<Frame> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| AcquireError::Channel("exchange on closed link".to_string()))?;

        port.set_timeout(timeout)?;
        // Drop any stale bytes from a previous, abandoned response
        port.clear(serialport::ClearBuffer::Input)?;

        let result = (|| {
            port.write_all(request).map_err(AcquireError::Io)?;
            port.flush().map_err(AcquireError::Io)?;
            Self::read_frame(port).map_err(|e| match e {
                AcquireError::Timeout(_) => AcquireError::Timeout(timeout),
                other => other,
            })
        })();

        match &result {
            Ok(_) => self.stats.record_success(),
            Err(_) => self.stats.record_failure(),
        }
        result
    }

    fn stats(&self) -> &LinkStats {
        &self.stats
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.port_path, self.baud_rate)
    }
}

impl Drop for SerialSensorLink {
    fn drop(&mut self) {
        self.close();
    }
}
