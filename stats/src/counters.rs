// SPDX-License-Identifier: Apache-2.0
// Copyright CGNAT Authors

//! The per-core counter block. Every field is an [`AtomicU64`] written with
//! `Ordering::Relaxed` by the owning core: the aggregator thread reads the same
//! fields, also `Relaxed`, without any lock. This is the idiomatic Rust rendering of
//! "64-bit natural-aligned writes are torn-free" — the language gives no such
//! guarantee for plain integers shared across threads, but it does for atomics used
//! with a relaxed ordering, which is exactly the eventually-consistent read the
//! aggregator needs.

use std::sync::atomic::{AtomicU64, Ordering};

/// Cache-line aligned so that one core's writes never false-share with another
/// core's block when blocks are held in a contiguous array.
#[repr(align(64))]
#[derive(Debug, Default)]
pub struct CounterBlock {
    pub packets_rx: AtomicU64,
    pub packets_tx: AtomicU64,
    pub packets_dropped: AtomicU64,
    pub bytes_rx: AtomicU64,
    pub bytes_tx: AtomicU64,

    pub nat_created: AtomicU64,
    pub nat_expired: AtomicU64,
    pub nat_lookup_hit: AtomicU64,
    pub nat_lookup_miss: AtomicU64,

    pub port_alloc_success: AtomicU64,
    pub port_alloc_fail: AtomicU64,
    pub port_freed: AtomicU64,

    pub errors_no_memory: AtomicU64,
    pub errors_invalid_packet: AtomicU64,
    pub errors_no_ports: AtomicU64,

    pub latency_sum: AtomicU64,
    pub latency_count: AtomicU64,
    pub latency_max: AtomicU64,
}

impl CounterBlock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn load(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Records a latency sample in cycles, folding it into the running sum/count
    /// and raising the running max if this sample is larger.
    pub fn record_latency(&self, cycles: u64) {
        Self::add(&self.latency_sum, cycles);
        Self::incr(&self.latency_count);
        self.latency_max.fetch_max(cycles, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let block = CounterBlock::new();
        assert_eq!(CounterBlock::load(&block.packets_rx), 0);
    }

    #[test]
    fn record_latency_tracks_sum_count_and_max() {
        let block = CounterBlock::new();
        block.record_latency(100);
        block.record_latency(50);
        block.record_latency(200);
        assert_eq!(CounterBlock::load(&block.latency_sum), 350);
        assert_eq!(CounterBlock::load(&block.latency_count), 3);
        assert_eq!(CounterBlock::load(&block.latency_max), 200);
    }
}
