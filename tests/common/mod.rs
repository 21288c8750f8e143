//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

use co2log_rs::config::ChannelConfig;
use co2log_rs::types::ChannelEvent;
use co2log_rs::backend::EventStream;
use std::time::{Duration, Instant};

/// A channel config with millisecond-scale timings for fast tests
pub fn fast_config(id: &str, port: &str) -> ChannelConfig {
    ChannelConfig::new(id, port)
        .with_poll_interval(Duration::from_millis(20))
        .with_response_timeout(Duration::from_millis(10))
        .with_max_consecutive_failures(3)
}

/// Collect every event that arrives within `window`
pub fn collect_for(stream: &EventStream, window: Duration) -> Vec<ChannelEvent> {
    let deadline = Instant::now() + window;
    let mut events = Vec::new();
    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        match stream.recv_timeout(deadline - now) {
            Ok(event) => events.push(event),
            Err(_) => break,
        }
    }
    events
}

/// Count ok readings for one channel in a collected batch
pub fn ok_readings(events: &[ChannelEvent], channel_id: &str) -> usize {
    events
        .iter()
        .filter(|e| {
            matches!(e, ChannelEvent::Reading(r)
                if r.channel_id == channel_id && r.is_ok())
        })
        .count()
}
