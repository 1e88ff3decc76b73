// SPDX-License-Identifier: Apache-2.0
// Copyright CGNAT Authors

//! [`Snapshot`]: the aggregated, point-in-time view of every core's counters that the
//! telemetry sinks serialize. Nothing downstream of [`aggregate`] touches per-core
//! memory again.

use crate::counters::CounterBlock;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Snapshot {
    pub packets_rx: u64,
    pub packets_tx: u64,
    pub packets_dropped: u64,
    pub bytes_rx: u64,
    pub bytes_tx: u64,

    pub active_sessions: u64,
    pub sessions_created: u64,
    pub sessions_expired: u64,

    pub port_allocation_failures: u64,

    pub avg_latency_us: f64,
    pub max_latency_us: u64,

    pub timestamp: u64,
}

/// Sums every core's counter block into a single snapshot. `cycles_per_microsecond`
/// converts the raw cycle-counter latency samples into microseconds; `timestamp` is
/// the caller-supplied Unix-seconds stamp (this crate never reads the clock itself,
/// so it stays testable without a real time source).
#[must_use]
pub fn aggregate(blocks: &[&CounterBlock], cycles_per_microsecond: f64, timestamp: u64) -> Snapshot {
    let mut s = Snapshot {
        timestamp,
        ..Snapshot::default()
    };
    let mut nat_created = 0u64;
    let mut nat_expired = 0u64;
    let mut latency_sum = 0u64;
    let mut latency_count = 0u64;
    let mut latency_max = 0u64;

    for block in blocks {
        s.packets_rx += CounterBlock::load(&block.packets_rx);
        s.packets_tx += CounterBlock::load(&block.packets_tx);
        s.packets_dropped += CounterBlock::load(&block.packets_dropped);
        s.bytes_rx += CounterBlock::load(&block.bytes_rx);
        s.bytes_tx += CounterBlock::load(&block.bytes_tx);

        nat_created += CounterBlock::load(&block.nat_created);
        nat_expired += CounterBlock::load(&block.nat_expired);

        s.port_allocation_failures += CounterBlock::load(&block.port_alloc_fail);

        latency_sum += CounterBlock::load(&block.latency_sum);
        latency_count += CounterBlock::load(&block.latency_count);
        latency_max = latency_max.max(CounterBlock::load(&block.latency_max));
    }

    s.sessions_created = nat_created;
    s.sessions_expired = nat_expired;
    s.active_sessions = nat_created.saturating_sub(nat_expired);

    s.avg_latency_us = if latency_count > 0 {
        (latency_sum as f64 / latency_count as f64) / cycles_per_microsecond
    } else {
        0.0
    };
    s.max_latency_us = if cycles_per_microsecond > 0.0 {
        (latency_max as f64 / cycles_per_microsecond) as u64
    } else {
        0
    };

    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregates_across_cores() {
        let a = CounterBlock::new();
        let b = CounterBlock::new();
        CounterBlock::add(&a.packets_rx, 10);
        CounterBlock::add(&b.packets_rx, 5);
        CounterBlock::incr(&a.nat_created);
        CounterBlock::incr(&b.nat_created);
        CounterBlock::incr(&a.nat_expired);
        a.record_latency(1000);
        b.record_latency(3000);

        let snapshot = aggregate(&[&a, &b], 1000.0, 42);
        assert_eq!(snapshot.packets_rx, 15);
        assert_eq!(snapshot.sessions_created, 2);
        assert_eq!(snapshot.sessions_expired, 1);
        assert_eq!(snapshot.active_sessions, 1);
        assert_eq!(snapshot.timestamp, 42);
        assert!((snapshot.avg_latency_us - 2.0).abs() < f64::EPSILON);
        assert_eq!(snapshot.max_latency_us, 3);
    }

    #[test]
    fn zero_samples_yield_zero_latency() {
        let a = CounterBlock::new();
        let snapshot = aggregate(&[&a], 1000.0, 0);
        assert_eq!(snapshot.avg_latency_us, 0.0);
        assert_eq!(snapshot.max_latency_us, 0);
    }
}
