//! Mock sensor link for testing without hardware
//!
//! This module provides a scripted [`SensorLink`] that plays back a
//! sequence of behaviors (valid frames, garbled frames, timeouts, I/O
//! failures) and then repeats a default behavior. Sessions exercise their
//! full fault-handling paths against it without a serial port attached.
//!
//! # Example
//!
//! ```ignore
//! use co2log_rs::backend::mock_link::{MockBehavior, MockSensorLink};
//!
//! // Three timeouts, then steady 800 ppm readings
//! let link = MockSensorLink::new("jar-1")
//!     .with_script([MockBehavior::Timeout; 3])
//!     .with_default(MockBehavior::Respond(800));
//! ```
//!
//! # Enabling
//!
//! Available in unit tests unconditionally and to downstream users with
//! the `mock-sensor` feature:
//!
//! ```bash
//! cargo test --features mock-sensor
//! ```

use super::link::{LinkStats, SensorLink};
use crate::error::{AcquireError, Result};
use crate::protocol::{self, Frame, CMD_READ_CONCENTRATION, FRAME_LEN, START_BYTE};
use std::collections::VecDeque;
use std::time::Duration;

/// One scripted exchange outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    /// Answer with a valid read-concentration frame for this ppm value
    Respond(u16),
    /// Answer with exactly these bytes
    RawFrame(Frame),
    /// Answer with a frame whose checksum byte is corrupted
    Garbled(u16),
    /// Consume the full deadline, then time out
    Timeout,
    /// Fail with a hard I/O error, as a yanked cable would
    IoError,
}

/// Build the response frame a healthy sensor would send
fn concentration_response(ppm: u16) -> Frame {
    let be = ppm.to_be_bytes();
    let mut frame: Frame = [0; FRAME_LEN];
    frame[0] = START_BYTE;
    frame[1] = CMD_READ_CONCENTRATION;
    frame[2] = be[0];
    frame[3] = be[1];
    frame[FRAME_LEN - 1] = protocol::checksum(&frame);
    frame
}

/// Scripted sensor link for tests
pub struct MockSensorLink {
    /// Display name (stands in for the port path)
    name: String,
    /// Whether the link is "open"
    open: bool,
    /// Remaining open attempts that must fail (`u32::MAX` = never opens)
    open_failures_remaining: u32,
    /// Behaviors played back in order before falling back to the default
    script: VecDeque<MockBehavior>,
    /// Behavior once the script is exhausted
    default_behavior: MockBehavior,
    /// Simulated sensor latency on successful exchanges
    response_delay: Duration,
    /// Link statistics
    stats: LinkStats,
}

impl MockSensorLink {
    /// Create a link that opens immediately and answers 400 ppm forever
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            open: false,
            open_failures_remaining: 0,
            script: VecDeque::new(),
            default_behavior: MockBehavior::Respond(400),
            response_delay: Duration::ZERO,
            stats: LinkStats::default(),
        }
    }

    /// Queue behaviors to play back before the default kicks in
    pub fn with_script(mut self, behaviors: impl IntoIterator<Item = MockBehavior>) -> Self {
        self.script.extend(behaviors);
        self
    }

    /// Set the behavior used once the script is exhausted
    pub fn with_default(mut self, behavior: MockBehavior) -> Self {
        self.default_behavior = behavior;
        self
    }

    /// Make the next `n` open attempts fail
    pub fn with_open_failures(mut self, n: u32) -> Self {
        self.open_failures_remaining = n;
        self
    }

    /// Make every open attempt fail, forever
    pub fn never_opens(self) -> Self {
        self.with_open_failures(u32::MAX)
    }

    /// Add latency to successful exchanges
    pub fn with_response_delay(mut self, delay: Duration) -> Self {
        self.response_delay = delay;
        self
    }

    fn next_behavior(&mut self) -> MockBehavior {
        self.script.pop_front().unwrap_or(self.default_behavior)
    }
}

impl SensorLink for MockSensorLink {
    fn open(&mut self) -> Result<()> {
        if self.open_failures_remaining > 0 {
            if self.open_failures_remaining != u32::MAX {
                self.open_failures_remaining -= 1;
            }
            return Err(AcquireError::Serial(serialport::Error::new(
                serialport::ErrorKind::NoDevice,
                format!("mock port {} not present", self.name),
            )));
        }
        self.open = true;
        self.stats.opens += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn exchange(&mut self, _request: &Frame, timeout: Duration) -> Result<Frame> {
        if !self.open {
            return Err(AcquireError::Channel(
                "exchange on closed link".to_string(),
            ));
        }

        let behavior = self.next_behavior();
        let result = match behavior {
            MockBehavior::Respond(ppm) => {
                if !self.response_delay.is_zero() {
                    std::thread::sleep(self.response_delay.min(timeout));
                }
                Ok(concentration_response(ppm))
            }
            MockBehavior::RawFrame(frame) => Ok(frame),
            MockBehavior::Garbled(ppm) => {
                let mut frame = concentration_response(ppm);
                frame[FRAME_LEN - 1] = frame[FRAME_LEN - 1].wrapping_add(1);
                Ok(frame)
            }
            MockBehavior::Timeout => {
                std::thread::sleep(timeout);
                Err(AcquireError::Timeout(timeout))
            }
            MockBehavior::IoError => Err(AcquireError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock device vanished",
            ))),
        };

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
        format!("{} (mock)", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_then_default() {
        let mut link = MockSensorLink::new("m")
            .with_script([MockBehavior::Garbled(500)])
            .with_default(MockBehavior::Respond(650));
        link.open().unwrap();

        let request = protocol::read_concentration_frame();
        let timeout = Duration::from_millis(10);

        let garbled = link.exchange(&request, timeout).unwrap();
        assert!(protocol::decode(&garbled).is_err());

        let ok = link.exchange(&request, timeout).unwrap();
        assert_eq!(protocol::decode_concentration(&ok).unwrap(), 650);
    }

    #[test]
    fn test_open_failures_run_out() {
        let mut link = MockSensorLink::new("m").with_open_failures(2);
        assert!(link.open().is_err());
        assert!(link.open().is_err());
        assert!(link.open().is_ok());
        assert!(link.is_open());
    }

    #[test]
    fn test_never_opens() {
        let mut link = MockSensorLink::new("m").never_opens();
        for _ in 0..10 {
            assert!(link.open().is_err());
        }
    }

    #[test]
    fn test_exchange_requires_open() {
        let mut link = MockSensorLink::new("m");
        let request = protocol::read_concentration_frame();
        assert!(link
            .exchange(&request, Duration::from_millis(1))
            .is_err());
    }

    #[test]
    fn test_response_frame_is_valid() {
        let frame = concentration_response(1234);
        assert_eq!(protocol::decode_concentration(&frame).unwrap(), 1234);
    }
}
