//! Reading sinks: consumers of the merged event stream
//!
//! A sink receives every [`ChannelEvent`] the supervisor delivers, in
//! arrival order. Sinks run on the consumer side of the bounded stream,
//! so a slow sink can at worst cause the sessions to drop events; it can
//! never stall acquisition itself.
//!
//! [`CsvSink`] appends one row per event in long format:
//!
//! ```csv
//! timestamp,channel_id,co2_ppm,ok,fault
//! 2025-09-24T14:41:44Z,jar-1,812,true,
//! 2025-09-24T14:41:46Z,jar-1,,false,
//! 2025-09-24T14:41:46Z,jar-1,,,timeout
//! ```
//!
//! The header is written only when the file is new or empty, so restarts
//! append to an existing log seamlessly.

use crate::error::Result;
use crate::types::ChannelEvent;
use chrono::SecondsFormat;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// A consumer of acquisition events
pub trait ReadingSink {
    /// Handle one event
    fn deliver(&mut self, event: &ChannelEvent) -> Result<()>;

    /// Flush any buffered output
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// One CSV row in long format
#[derive(Debug, Serialize)]
struct LogRecord<'a> {
    timestamp: String,
    channel_id: &'a str,
    /// Concentration for ok readings, empty otherwise
    co2_ppm: Option<u16>,
    /// `true`/`false` for readings, empty for fault rows
    ok: Option<bool>,
    /// Fault kind for fault rows, empty for readings
    fault: Option<String>,
}

/// Appends events to a CSV file, one row per event
pub struct CsvSink {
    writer: csv::Writer<File>,
}

impl CsvSink {
    /// Open (or create) the log file in append mode
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let is_new = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);

        let file = OpenOptions::new().append(true).create(true).open(path)?;
        let writer = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);
        Ok(Self { writer })
    }

    fn record_for(event: &ChannelEvent) -> LogRecord<'_> {
        let timestamp = event
            .timestamp()
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        match event {
            ChannelEvent::Reading(r) => LogRecord {
                timestamp,
                channel_id: &r.channel_id,
                co2_ppm: r.concentration_ppm,
                ok: Some(r.is_ok()),
                fault: None,
            },
            ChannelEvent::Fault(f) => LogRecord {
                timestamp,
                channel_id: &f.channel_id,
                co2_ppm: None,
                ok: None,
                fault: Some(f.kind.to_string()),
            },
        }
    }
}

impl ReadingSink for CsvSink {
    fn deliver(&mut self, event: &ChannelEvent) -> Result<()> {
        self.writer.serialize(Self::record_for(event))?;
        // Flush per row so a crash never loses more than the current line
        self.writer.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
