//! Channel supervisor: owns the set of configured channels
//!
//! The supervisor validates the channel list, spawns one
//! [`ChannelSession`](super::session::ChannelSession) thread per entry,
//! and hands the caller an [`EventStream`], the single consumer side of
//! the bounded fan-in channel every session emits into.
//!
//! Sessions share nothing except the event sender and the shutdown flag,
//! so one channel's faults can never block or slow its siblings; a
//! permanently dead channel just keeps cycling
//! `Connecting -> PortUnavailable -> backoff` on its own thread while
//! healthy channels poll at their configured cadence.
//!
//! Ordering on the stream is arrival order: FIFO per channel (the channel
//! preserves each producer's order), no guarantee across channels.
//! Consumers correlate across channels by the per-event timestamp.

use super::link::SensorLink;
use super::serial_link::SerialSensorLink;
use super::session::{ChannelSession, SharedChannelState};
use crate::config::{ChannelConfig, DEFAULT_CHANNEL_BUFFER_SIZE};
use crate::error::Result;
use crate::types::{ChannelEvent, ChannelSnapshot};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Consumer handle for the merged event stream
///
/// Wraps the receiving side of the fan-in channel. Dropping the stream
/// never stalls acquisition; sessions drop (and count) events they cannot
/// deliver.
pub struct EventStream {
    receiver: Receiver<ChannelEvent>,
}

impl EventStream {
    /// Block until the next event arrives or every session has exited
    pub fn recv(&self) -> Option<ChannelEvent> {
        self.receiver.recv().ok()
    }

    /// Block for at most `timeout`
    ///
    /// [`RecvTimeoutError`] distinguishes an empty stream from one whose
    /// sessions have all exited.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> std::result::Result<ChannelEvent, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Receive without blocking
    pub fn try_recv(&self) -> Option<ChannelEvent> {
        self.receiver.try_recv().ok()
    }

    /// Receive all pending events
    pub fn drain(&self) -> Vec<ChannelEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Handle to one spawned session
struct SessionHandle {
    channel_id: String,
    thread: JoinHandle<()>,
    shared: SharedChannelState,
}

/// Owns and supervises all channel sessions
pub struct Supervisor {
    sessions: Vec<SessionHandle>,
    shutdown: Arc<AtomicBool>,
}

impl Supervisor {
    /// Validate the configs and start one session per channel over real
    /// serial ports
    pub fn start(configs: Vec<ChannelConfig>) -> Result<(Self, EventStream)> {
        Self::start_with(configs, DEFAULT_CHANNEL_BUFFER_SIZE, |config| {
            Box::new(SerialSensorLink::new(config.port_path.as_str(), config.baud_rate))
        })
    }

    /// Start with an explicit stream capacity and link factory
    ///
    /// The factory seam is how tests (and the `--mock` logger mode) swap
    /// the serial transport for scripted links.
    pub fn start_with(
        configs: Vec<ChannelConfig>,
        buffer_size: usize,
        make_link: impl Fn(&ChannelConfig) -> Box<dyn SensorLink>,
    ) -> Result<(Self, EventStream)> {
        // Configuration-time invariants: unique ids, unique non-empty
        // ports. This is what guarantees no two sessions ever contend for
        // one device.
        crate::config::validate_channels(&configs)?;

        let (tx, rx) = bounded(buffer_size.max(1));
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut sessions = Vec::with_capacity(configs.len());
        for config in configs {
            let link = make_link(&config);
            let channel_id = config.channel_id.clone();
            let (mut session, shared) =
                ChannelSession::new(config, link, tx.clone(), shutdown.clone());
            let thread = std::thread::Builder::new()
                .name(format!("channel-{}", channel_id))
                .spawn(move || session.run())
                .map_err(crate::error::AcquireError::Io)?;
            sessions.push(SessionHandle {
                channel_id,
                thread,
                shared,
            });
        }
        // The stream ends (recv returns None) once every session exits
        drop(tx);

        tracing::info!(channels = sessions.len(), "supervisor started");
        Ok((
            Self { sessions, shutdown },
            EventStream { receiver: rx },
        ))
    }

    /// Number of supervised channels
    pub fn channel_count(&self) -> usize {
        self.sessions.len()
    }

    /// Read-only snapshot of one channel's state
    pub fn snapshot(&self, channel_id: &str) -> Option<ChannelSnapshot> {
        self.sessions
            .iter()
            .find(|s| s.channel_id == channel_id)
            .and_then(|s| s.shared.lock().ok().map(|snap| snap.clone()))
    }

    /// Read-only snapshots of every channel, in configuration order
    pub fn snapshots(&self) -> Vec<ChannelSnapshot> {
        self.sessions
            .iter()
            .filter_map(|s| s.shared.lock().ok().map(|snap| snap.clone()))
            .collect()
    }

    /// Stop every session and wait for all port handles to be released
    ///
    /// Sessions observe the shutdown flag at every suspension point, so
    /// this returns within roughly one response timeout.
    pub fn stop(self) {
        tracing::info!("supervisor stopping");
        self.shutdown.store(true, Ordering::SeqCst);
        for session in self.sessions {
            if session.thread.join().is_err() {
                tracing::error!(channel = %session.channel_id, "session thread panicked");
            }
        }
        tracing::info!("supervisor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock_link::{MockBehavior, MockSensorLink};
    use crate::types::ChannelStatus;

    fn fast_config(id: &str, port: &str) -> ChannelConfig {
        ChannelConfig::new(id, port)
            .with_poll_interval(Duration::from_millis(10))
            .with_response_timeout(Duration::from_millis(5))
    }

    #[test]
    fn test_start_rejects_duplicate_ids() {
        let configs = vec![
            fast_config("jar-1", "/dev/ttyUSB0"),
            fast_config("jar-1", "/dev/ttyUSB1"),
        ];
        assert!(Supervisor::start_with(configs, 64, |c| {
            Box::new(MockSensorLink::new(&c.channel_id))
        })
        .is_err());
    }

    #[test]
    fn test_start_rejects_shared_port() {
        let configs = vec![
            fast_config("jar-1", "/dev/ttyUSB0"),
            fast_config("jar-2", "/dev/ttyUSB0"),
        ];
        assert!(Supervisor::start_with(configs, 64, |c| {
            Box::new(MockSensorLink::new(&c.channel_id))
        })
        .is_err());
    }

    #[test]
    fn test_merged_stream_and_snapshots() {
        let configs = vec![
            fast_config("jar-1", "mock-1"),
            fast_config("jar-2", "mock-2"),
        ];
        let (supervisor, stream) = Supervisor::start_with(configs, 256, |config| {
            let ppm = if config.channel_id == "jar-1" { 500 } else { 900 };
            Box::new(MockSensorLink::new(&config.channel_id).with_default(MockBehavior::Respond(ppm)))
        })
        .unwrap();

        // Collect until both channels have reported a few readings
        let mut per_channel = std::collections::HashMap::new();
        while per_channel.len() < 2 || per_channel.values().any(|n| *n < 3) {
            let event = stream.recv_timeout(Duration::from_secs(2)).unwrap();
            if let ChannelEvent::Reading(r) = event {
                assert!(r.is_ok());
                let expected = if r.channel_id == "jar-1" { 500 } else { 900 };
                assert_eq!(r.concentration_ppm, Some(expected));
                *per_channel.entry(r.channel_id).or_insert(0u32) += 1;
            }
        }

        assert_eq!(supervisor.channel_count(), 2);
        let snapshot = supervisor.snapshot("jar-1").unwrap();
        assert_eq!(snapshot.status, ChannelStatus::Polling);
        assert!(supervisor.snapshot("jar-9").is_none());

        supervisor.stop();
    }

    #[test]
    fn test_stream_ends_after_stop() {
        let configs = vec![fast_config("jar-1", "mock-1")];
        let (supervisor, stream) = Supervisor::start_with(configs, 64, |c| {
            Box::new(MockSensorLink::new(&c.channel_id))
        })
        .unwrap();

        supervisor.stop();
        stream.drain();
        assert!(stream.recv().is_none());
    }
}
