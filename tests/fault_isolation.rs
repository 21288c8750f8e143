//! Integration tests for channel fault isolation
//!
//! A faulty or absent sensor must never block or slow its siblings: each
//! channel runs on its own thread and the only shared resource is the
//! bounded fan-in stream.
//!
//! Run with `cargo test --features mock-sensor`.

#![cfg(feature = "mock-sensor")]

mod common;

use co2log_rs::backend::{MockBehavior, MockSensorLink, Supervisor};
use co2log_rs::types::{ChannelEvent, FaultKind};
use common::{collect_for, fast_config, ok_readings};
use std::time::Duration;

#[test]
fn test_dead_port_does_not_slow_healthy_channel() {
    // jar-ok answers every poll; jar-dead's port never opens.
    let configs = vec![
        fast_config("jar-ok", "mock-ok").with_poll_interval(Duration::from_millis(50)),
        fast_config("jar-dead", "mock-dead"),
    ];
    let (supervisor, stream) = Supervisor::start_with(configs, 512, |config| {
        let link = MockSensorLink::new(&config.channel_id);
        if config.channel_id == "jar-dead" {
            Box::new(link.never_opens())
        } else {
            Box::new(link.with_default(MockBehavior::Respond(620)))
        }
    })
    .unwrap();

    let window = Duration::from_millis(1200);
    let events = collect_for(&stream, window);
    supervisor.stop();

    // ~24 polls fit the window at a 50 ms cadence; require a healthy
    // share of them even on a loaded machine.
    let healthy = ok_readings(&events, "jar-ok");
    assert!(healthy >= 15, "healthy channel produced only {} readings", healthy);

    // The dead channel produced faults, never readings.
    assert_eq!(ok_readings(&events, "jar-dead"), 0);
    let dead_faults: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            ChannelEvent::Fault(f) if f.channel_id == "jar-dead" => Some(f.kind),
            _ => None,
        })
        .collect();
    assert!(!dead_faults.is_empty());
    assert!(dead_faults.iter().all(|k| *k == FaultKind::PortUnavailable));
    assert!(events
        .iter()
        .all(|e| !matches!(e, ChannelEvent::Reading(r) if r.channel_id == "jar-dead")));
}

#[test]
fn test_noisy_channel_faults_stay_on_its_own_stream() {
    // jar-noise returns garbage frames forever: it cycles through its
    // failure budget and reconnects, emitting checksum faults and gap
    // markers. jar-ok must stay clean throughout.
    let configs = vec![
        fast_config("jar-ok", "mock-ok").with_poll_interval(Duration::from_millis(50)),
        fast_config("jar-noise", "mock-noise").with_poll_interval(Duration::from_millis(30)),
    ];
    let (supervisor, stream) = Supervisor::start_with(configs, 512, |config| {
        let link = MockSensorLink::new(&config.channel_id);
        if config.channel_id == "jar-noise" {
            Box::new(link.with_default(MockBehavior::Garbled(999)))
        } else {
            Box::new(link.with_default(MockBehavior::Respond(480)))
        }
    })
    .unwrap();

    let events = collect_for(&stream, Duration::from_millis(800));
    supervisor.stop();

    assert!(ok_readings(&events, "jar-ok") >= 8);
    assert_eq!(ok_readings(&events, "jar-noise"), 0);

    // Checksum faults carry their consecutive count and never leak onto
    // the healthy channel.
    let mut saw_checksum_fault = false;
    for event in &events {
        match event {
            ChannelEvent::Fault(f) => {
                assert_eq!(f.channel_id, "jar-noise");
                if f.kind == FaultKind::ChecksumMismatch {
                    saw_checksum_fault = true;
                    assert!(f.consecutive_failures >= 1);
                    assert!(f.consecutive_failures <= 3);
                }
            }
            ChannelEvent::Reading(r) => {
                if r.channel_id == "jar-ok" {
                    assert_eq!(r.concentration_ppm, Some(480));
                }
            }
        }
    }
    assert!(saw_checksum_fault);
}
