//! Error handling for the CO2 acquisition core
//!
//! This module defines custom error types and a Result alias for use
//! throughout the crate.

use std::time::Duration;
use thiserror::Error;

/// Main error type for CO2 acquisition operations
#[derive(Error, Debug)]
pub enum AcquireError {
    /// Errors reported by the serial port layer
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Errors in channel configuration (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// A command payload had the wrong length for the 9-byte frame
    #[error("Invalid payload: expected {expected} data bytes, got {actual}")]
    InvalidPayload { expected: usize, actual: usize },

    /// A received frame failed start-marker or checksum validation
    ///
    /// Both failure modes indicate frame desync and are folded into one kind.
    #[error("Frame checksum mismatch")]
    ChecksumMismatch,

    /// No complete response frame arrived before the deadline
    #[error("Response timed out after {0:?}")]
    Timeout(Duration),

    /// A calibration exchange received no acknowledgment in time
    #[error("Calibration timed out after {0:?}")]
    CalibrationTimedOut(Duration),

    /// The sensor answered a calibration command with an unexpected frame
    #[error("Calibration rejected: {0}")]
    CalibrationRejected(String),

    /// Errors related to channel/supervisor bookkeeping
    #[error("Channel error: {0}")]
    Channel(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV sink errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<AcquireError>,
    },
}

impl AcquireError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        AcquireError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// True for the fault kinds a polling channel tolerates up to its
    /// failure budget (as opposed to hard port errors).
    pub fn is_protocol_fault(&self) -> bool {
        matches!(
            self,
            AcquireError::ChecksumMismatch | AcquireError::Timeout(_)
        )
    }
}

/// Result type alias for CO2 acquisition operations
pub type Result<T> = std::result::Result<T, AcquireError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
