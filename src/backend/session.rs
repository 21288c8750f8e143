//! Per-channel acquisition session
//!
//! One session runs on its own thread, exclusively owns one sensor link,
//! and drives the per-channel state machine:
//!
//! ```text
//! Connecting -> Polling -> (Faulted <-> Polling) -> Closed
//! ```
//!
//! - **Connecting**: open the port; failures emit `PortUnavailable` and
//!   retry with exponential backoff. Connect attempts never count toward
//!   the consecutive-failure budget, which tracks protocol faults on an
//!   open port.
//! - **Polling**: poll cycles anchored to the wall clock (the next cycle
//!   is scheduled from the previous deadline, not from when the previous
//!   cycle finished, so the sample rate stays stable when a cycle runs
//!   long). A timeout or checksum fault emits a `FaultEvent` plus a gap
//!   `Reading` and is tolerated until the budget is spent; single glitches
//!   from line noise on long USB cables do not tear the channel down.
//! - **Faulted**: close the port, emit `Disconnected`, back off, then
//!   reconnect with a fresh failure counter.
//! - **Closed**: terminal, entered only on a shutdown request. The link is
//!   closed on every exit path.
//!
//! The shutdown flag is observed at every suspension point, so a stop
//! request interrupts backoff waits and inter-poll sleeps promptly and
//! never waits out a full poll interval.

use super::link::SensorLink;
use crate::config::ChannelConfig;
use crate::error::AcquireError;
use crate::protocol;
use crate::types::{ChannelEvent, ChannelSnapshot, ChannelStatus, FaultEvent, FaultKind, Reading};
use crossbeam_channel::{Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// First reconnect/retry delay
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Ceiling for the exponential backoff, so a removed device is not hammered
/// but a reattached one is noticed within half a minute
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Granularity at which waits re-check the shutdown flag
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Shared, read-only view of a session's state for the supervisor
pub type SharedChannelState = Arc<Mutex<ChannelSnapshot>>;

/// One channel's acquisition loop and state machine
pub struct ChannelSession {
    /// Channel configuration (immutable for the session's lifetime)
    config: ChannelConfig,
    /// The exclusively owned sensor transport
    link: Box<dyn SensorLink>,
    /// Fan-in sender for the merged event stream
    events: Sender<ChannelEvent>,
    /// Cooperative shutdown flag shared with the supervisor
    shutdown: Arc<AtomicBool>,
    /// Snapshot published for observers
    shared: SharedChannelState,
    /// Current state-machine state
    status: ChannelStatus,
    /// Consecutive protocol failures on the currently open port
    consecutive_failures: u32,
    /// Current reconnect/retry delay
    backoff: Duration,
    /// Initial backoff (configurable for tests)
    initial_backoff: Duration,
    /// Backoff ceiling (configurable for tests)
    max_backoff: Duration,
    /// Deadline of the next poll cycle (wall-clock anchor)
    next_poll: Option<Instant>,
    /// Running totals mirrored into the snapshot
    total_readings: u64,
    total_faults: u64,
    dropped_events: u64,
}

impl ChannelSession {
    /// Create a session; returns the shared state handle for observers
    pub fn new(
        config: ChannelConfig,
        link: Box<dyn SensorLink>,
        events: Sender<ChannelEvent>,
        shutdown: Arc<AtomicBool>,
    ) -> (Self, SharedChannelState) {
        let shared = Arc::new(Mutex::new(ChannelSnapshot {
            channel_id: config.channel_id.clone(),
            ..Default::default()
        }));
        let session = Self {
            config,
            link,
            events,
            shutdown,
            shared: shared.clone(),
            status: ChannelStatus::Connecting,
            consecutive_failures: 0,
            backoff: INITIAL_BACKOFF,
            initial_backoff: INITIAL_BACKOFF,
            max_backoff: MAX_BACKOFF,
            next_poll: None,
            total_readings: 0,
            total_faults: 0,
            dropped_events: 0,
        };
        (session, shared)
    }

    /// Override the backoff schedule (tests use short delays)
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self.backoff = initial;
        self
    }

    /// Run the state machine until shutdown
    pub fn run(&mut self) {
        tracing::info!(
            channel = %self.config.channel_id,
            link = %self.link.describe(),
            "channel session started"
        );

        while !self.shutdown_requested() {
            match self.status {
                ChannelStatus::Connecting => self.connect_cycle(),
                ChannelStatus::Polling => self.poll_cycle(),
                ChannelStatus::Faulted => self.fault_cycle(),
                ChannelStatus::Closed => break,
            }
        }

        // Scoped release: the port handle goes away on every exit path
        self.link.close();
        self.transition(ChannelStatus::Closed);
        tracing::info!(channel = %self.config.channel_id, "channel session stopped");
    }

    /// One attempt to open the port, with backoff on failure
    fn connect_cycle(&mut self) {
        match self.link.open() {
            Ok(()) => {
                tracing::info!(
                    channel = %self.config.channel_id,
                    link = %self.link.describe(),
                    "channel connected"
                );
                self.backoff = self.initial_backoff;
                self.consecutive_failures = 0;
                self.next_poll = None;
                self.transition(ChannelStatus::Polling);
            }
            Err(e) => {
                tracing::warn!(
                    channel = %self.config.channel_id,
                    error = %e,
                    retry_in = ?self.backoff,
                    "failed to open port"
                );
                // Connect attempts are not protocol faults; the counter
                // stays untouched.
                self.total_faults += 1;
                self.emit(ChannelEvent::Fault(FaultEvent::new(
                    self.config.channel_id.as_str(),
                    FaultKind::PortUnavailable,
                    0,
                )));
                self.publish_snapshot();
                self.wait_interruptible(self.backoff);
                self.backoff = (self.backoff * 2).min(self.max_backoff);
            }
        }
    }

    /// One poll cycle: wait for the slot, exchange, classify the outcome
    fn poll_cycle(&mut self) {
        let interval = self.config.poll_interval();
        let now = Instant::now();
        let slot = *self.next_poll.get_or_insert(now);
        if slot > now && !self.wait_interruptible(slot - now) {
            return;
        }

        // Schedule the next slot from the anchor; if this cycle overran,
        // skip the missed slots rather than drifting.
        let mut upcoming = slot + interval;
        let now = Instant::now();
        while upcoming <= now {
            upcoming += interval;
        }
        self.next_poll = Some(upcoming);

        let request = protocol::read_concentration_frame();
        let timeout = self.config.response_timeout();
        match self.link.exchange(&request, timeout) {
            Ok(raw) => match protocol::decode_concentration(&raw) {
                Ok(ppm) => self.record_success(ppm),
                Err(_) => self.record_protocol_failure(FaultKind::ChecksumMismatch),
            },
            Err(AcquireError::Timeout(_)) => self.record_protocol_failure(FaultKind::Timeout),
            Err(e) => {
                // Hard error on an open port: the device is gone, skip the
                // tolerance budget and reconnect.
                tracing::warn!(
                    channel = %self.config.channel_id,
                    error = %e,
                    "port failed mid-poll"
                );
                self.total_faults += 1;
                self.emit(ChannelEvent::Reading(Reading::gap(self.config.channel_id.as_str())));
                self.transition(ChannelStatus::Faulted);
            }
        }
    }

    /// Give up on the open port: close, announce, back off, reconnect
    fn fault_cycle(&mut self) {
        self.link.close();
        tracing::warn!(
            channel = %self.config.channel_id,
            consecutive_failures = self.consecutive_failures,
            retry_in = ?self.backoff,
            "channel disconnected, will reconnect"
        );
        self.total_faults += 1;
        self.emit(ChannelEvent::Fault(FaultEvent::new(
            self.config.channel_id.as_str(),
            FaultKind::Disconnected,
            self.consecutive_failures,
        )));
        self.publish_snapshot();

        self.wait_interruptible(self.backoff);
        self.backoff = (self.backoff * 2).min(self.max_backoff);

        // Reconnecting starts a fresh channel state
        self.consecutive_failures = 0;
        self.transition(ChannelStatus::Connecting);
    }

    /// A decoded concentration arrived
    fn record_success(&mut self, ppm: u16) {
        self.consecutive_failures = 0;
        self.total_readings += 1;
        let reading = Reading::ok(self.config.channel_id.as_str(), ppm);
        tracing::debug!(
            channel = %self.config.channel_id,
            ppm,
            "reading"
        );
        let timestamp = reading.timestamp;
        self.emit(ChannelEvent::Reading(reading));
        if let Ok(mut shared) = self.shared.lock() {
            shared.last_success = Some(timestamp);
        }
        self.publish_snapshot();
    }

    /// A tolerated protocol fault (timeout or bad frame) on an open port
    fn record_protocol_failure(&mut self, kind: FaultKind) {
        self.consecutive_failures += 1;
        self.total_faults += 1;
        tracing::debug!(
            channel = %self.config.channel_id,
            kind = %kind,
            consecutive = self.consecutive_failures,
            "poll cycle failed"
        );
        self.emit(ChannelEvent::Fault(FaultEvent::new(
            self.config.channel_id.as_str(),
            kind,
            self.consecutive_failures,
        )));
        self.emit(ChannelEvent::Reading(Reading::gap(self.config.channel_id.as_str())));

        if self.consecutive_failures >= self.config.max_consecutive_failures {
            self.transition(ChannelStatus::Faulted);
        } else {
            self.publish_snapshot();
        }
    }

    /// Deliver an event without ever blocking acquisition
    ///
    /// A full stream buffer drops the event and counts it; a vanished
    /// consumer is treated the same way.
    fn emit(&mut self, event: ChannelEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped_events += 1;
            }
        }
    }

    /// Sleep for `duration`, waking early on shutdown
    ///
    /// Returns false if the wait was interrupted.
    fn wait_interruptible(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.shutdown_requested() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(WAIT_SLICE));
        }
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn transition(&mut self, status: ChannelStatus) {
        if self.status != status {
            tracing::debug!(
                channel = %self.config.channel_id,
                from = %self.status,
                to = %status,
                "state transition"
            );
            self.status = status;
        }
        self.publish_snapshot();
    }

    fn publish_snapshot(&self) {
        if let Ok(mut shared) = self.shared.lock() {
            shared.status = self.status;
            shared.consecutive_failures = self.consecutive_failures;
            shared.total_readings = self.total_readings;
            shared.total_faults = self.total_faults;
            shared.dropped_events = self.dropped_events;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock_link::{MockBehavior, MockSensorLink};
    use crossbeam_channel::{bounded, Receiver};
    use std::thread::JoinHandle;

    fn fast_config(max_failures: u32) -> ChannelConfig {
        ChannelConfig::new("jar-1", "mock")
            .with_poll_interval(Duration::from_millis(10))
            .with_response_timeout(Duration::from_millis(5))
            .with_max_consecutive_failures(max_failures)
    }

    fn spawn_session(
        config: ChannelConfig,
        link: MockSensorLink,
    ) -> (
        JoinHandle<()>,
        Receiver<ChannelEvent>,
        Arc<AtomicBool>,
        SharedChannelState,
    ) {
        let (tx, rx) = bounded(256);
        let shutdown = Arc::new(AtomicBool::new(false));
        let (mut session, shared) =
            ChannelSession::new(config, Box::new(link), tx, shutdown.clone());
        session = session.with_backoff(Duration::from_millis(10), Duration::from_millis(40));
        let handle = std::thread::spawn(move || session.run());
        (handle, rx, shutdown, shared)
    }

    fn stop(handle: JoinHandle<()>, shutdown: &AtomicBool) {
        shutdown.store(true, Ordering::SeqCst);
        handle.join().unwrap();
    }

    #[test]
    fn test_healthy_channel_emits_readings() {
        let link = MockSensorLink::new("m").with_default(MockBehavior::Respond(725));
        let (handle, rx, shutdown, shared) = spawn_session(fast_config(3), link);

        let mut readings = Vec::new();
        while readings.len() < 3 {
            match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
                ChannelEvent::Reading(r) => readings.push(r),
                ChannelEvent::Fault(f) => panic!("unexpected fault: {:?}", f),
            }
        }
        assert!(readings.iter().all(|r| r.concentration_ppm == Some(725)));

        stop(handle, &shutdown);
        let snapshot = shared.lock().unwrap().clone();
        assert_eq!(snapshot.status, ChannelStatus::Closed);
        assert!(snapshot.total_readings >= 3);
        assert_eq!(snapshot.total_faults, 0);
    }

    #[test]
    fn test_fault_budget_then_recovery() {
        // Three timeouts, then steady readings: expect exactly 3 gap
        // markers, a disconnect, and then a good reading.
        let link = MockSensorLink::new("m")
            .with_script([MockBehavior::Timeout, MockBehavior::Timeout, MockBehavior::Timeout])
            .with_default(MockBehavior::Respond(800));
        let (handle, rx, shutdown, _shared) = spawn_session(fast_config(3), link);

        let mut events = Vec::new();
        loop {
            let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            let done = matches!(&event, ChannelEvent::Reading(r) if r.is_ok());
            events.push(event);
            if done {
                break;
            }
        }
        stop(handle, &shutdown);

        let gaps = events
            .iter()
            .filter(|e| matches!(e, ChannelEvent::Reading(r) if !r.is_ok()))
            .count();
        assert_eq!(gaps, 3, "events: {:?}", events);

        let timeout_counts: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                ChannelEvent::Fault(f) if f.kind == FaultKind::Timeout => {
                    Some(f.consecutive_failures)
                }
                _ => None,
            })
            .collect();
        assert_eq!(timeout_counts, vec![1, 2, 3]);

        // The channel must not reconnect before the budget is spent, and
        // must reconnect after it is.
        let disconnects = events
            .iter()
            .filter(|e| matches!(e, ChannelEvent::Fault(f) if f.kind == FaultKind::Disconnected))
            .count();
        assert_eq!(disconnects, 1);

        match events.last().unwrap() {
            ChannelEvent::Reading(r) => assert_eq!(r.concentration_ppm, Some(800)),
            other => panic!("expected recovery reading, got {:?}", other),
        }
    }

    #[test]
    fn test_checksum_glitch_is_tolerated() {
        // A single garbled frame must not disconnect the channel.
        let link = MockSensorLink::new("m")
            .with_script([MockBehavior::Garbled(500)])
            .with_default(MockBehavior::Respond(500));
        let (handle, rx, shutdown, _shared) = spawn_session(fast_config(3), link);

        let mut saw_checksum_fault = false;
        loop {
            match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
                ChannelEvent::Fault(f) => {
                    assert_eq!(f.kind, FaultKind::ChecksumMismatch);
                    assert_eq!(f.consecutive_failures, 1);
                    saw_checksum_fault = true;
                }
                ChannelEvent::Reading(r) if r.is_ok() => break,
                ChannelEvent::Reading(_) => {}
            }
        }
        assert!(saw_checksum_fault);
        stop(handle, &shutdown);
    }

    #[test]
    fn test_unopenable_port_backs_off_and_never_reads() {
        let link = MockSensorLink::new("m").never_opens();
        let (handle, rx, shutdown, shared) = spawn_session(fast_config(3), link);

        std::thread::sleep(Duration::from_millis(300));
        stop(handle, &shutdown);

        let events: Vec<ChannelEvent> = rx.try_iter().collect();
        assert!(!events.is_empty());
        for event in &events {
            match event {
                ChannelEvent::Fault(f) => assert_eq!(f.kind, FaultKind::PortUnavailable),
                ChannelEvent::Reading(r) => panic!("unexpected reading: {:?}", r),
            }
        }

        // Intervals between attempts must grow toward the cap; with a
        // 10 ms initial and 40 ms cap, 300 ms fits a bounded number of
        // attempts (an unbacked-off loop would fit far more).
        assert!(events.len() >= 3);
        assert!(events.len() <= 16, "got {} attempts", events.len());

        let timestamps: Vec<_> = events.iter().map(|e| e.timestamp()).collect();
        for pair in timestamps.windows(2) {
            assert!(pair[1] >= pair[0]);
        }

        let snapshot = shared.lock().unwrap().clone();
        assert_eq!(snapshot.total_readings, 0);
    }

    #[test]
    fn test_hard_io_error_reconnects_immediately() {
        let link = MockSensorLink::new("m")
            .with_script([MockBehavior::Respond(600), MockBehavior::IoError])
            .with_default(MockBehavior::Respond(610));
        let (handle, rx, shutdown, _shared) = spawn_session(fast_config(3), link);

        let mut saw_disconnect = false;
        loop {
            match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
                ChannelEvent::Fault(f) if f.kind == FaultKind::Disconnected => {
                    saw_disconnect = true;
                }
                ChannelEvent::Reading(r) if r.concentration_ppm == Some(610) => break,
                _ => {}
            }
        }
        assert!(saw_disconnect);
        stop(handle, &shutdown);
    }

    #[test]
    fn test_stop_interrupts_promptly() {
        // Stop must not wait out the (long) poll interval.
        let config = ChannelConfig::new("jar-1", "mock")
            .with_poll_interval(Duration::from_secs(60))
            .with_response_timeout(Duration::from_millis(50));
        let link = MockSensorLink::new("m").with_default(MockBehavior::Respond(400));
        let (handle, rx, shutdown, shared) = spawn_session(config, link);

        // First reading arrives immediately, then the session sleeps
        // toward a slot a minute away.
        let _ = rx.recv_timeout(Duration::from_secs(2)).unwrap();

        let started = Instant::now();
        shutdown.store(true, Ordering::SeqCst);
        handle.join().unwrap();
        assert!(
            started.elapsed() < Duration::from_secs(1),
            "stop took {:?}",
            started.elapsed()
        );
        assert_eq!(shared.lock().unwrap().status, ChannelStatus::Closed);
    }
}
