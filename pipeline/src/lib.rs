// SPDX-License-Identifier: Apache-2.0
// Copyright CGNAT Authors

//! The worker loop (§4.H): the steady-state cycle one core runs forever, driving
//! the translation engine from whatever delivers and accepts frames for it.
//!
//! The packet I/O fabric — NIC driver init, hugepage allocation, CPU pinning — is
//! an external collaborator this crate never implements. [`PacketSource`] is the
//! contract the worker needs from it: a receive side and a transmit side, both
//! burst-oriented. Anything satisfying the trait can drive a [`Worker`], from a
//! real poll-mode driver to the loopback stub the tests use below.

use cgnat_nat::CoreContext;
use cgnat_stats::CounterBlock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Frames per `rx_burst`/`tx_burst` call, matching §4.H's fixed batch size.
pub const BURST_SIZE: usize = 32;

/// The collaborator boundary between the worker loop and the packet I/O fabric.
pub trait PacketSource {
    /// Pulls up to [`BURST_SIZE`] frames off this core's owned queue. An empty
    /// return means nothing was waiting; the worker spins back around rather than
    /// blocking, so a real implementation should do its own brief backoff.
    fn rx_burst(&mut self) -> Vec<Vec<u8>>;

    /// Submits translated frames for transmission. Returns the number the fabric
    /// accepted; any remainder is considered declined (TX ring full) and the
    /// worker counts it as a drop.
    fn tx_burst(&mut self, frames: Vec<Vec<u8>>) -> usize;
}

/// A channel-backed [`PacketSource`]: frames arrive over an `mpsc` receiver and
/// accepted frames are pushed onto an `mpsc` sender. Stands in for the real NIC
/// poll-mode driver a packet I/O fabric would provide — useful for wiring the
/// worker loop to any real frame source (a raw socket, a test harness, a future
/// driver binding) without the rest of this crate depending on one.
pub struct ChannelFabric {
    rx: std::sync::mpsc::Receiver<Vec<u8>>,
    tx: std::sync::mpsc::Sender<Vec<u8>>,
}

impl ChannelFabric {
    #[must_use]
    pub fn new(rx: std::sync::mpsc::Receiver<Vec<u8>>, tx: std::sync::mpsc::Sender<Vec<u8>>) -> Self {
        Self { rx, tx }
    }
}

impl PacketSource for ChannelFabric {
    fn rx_burst(&mut self) -> Vec<Vec<u8>> {
        let mut batch = Vec::with_capacity(BURST_SIZE);
        while batch.len() < BURST_SIZE {
            match self.rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }
        batch
    }

    fn tx_burst(&mut self, frames: Vec<Vec<u8>>) -> usize {
        let mut accepted = 0;
        for frame in frames {
            if self.tx.send(frame).is_err() {
                break;
            }
            accepted += 1;
        }
        accepted
    }
}

/// Drives one core's [`CoreContext`] against a [`PacketSource`] until told to stop.
pub struct Worker<S: PacketSource> {
    core: CoreContext,
    source: S,
    stop: Arc<AtomicBool>,
    aging_interval: Duration,
    last_age: Instant,
}

impl<S: PacketSource> Worker<S> {
    #[must_use]
    pub fn new(core: CoreContext, source: S, stop: Arc<AtomicBool>, aging_interval: Duration) -> Self {
        Self {
            core,
            source,
            stop,
            aging_interval,
            last_age: Instant::now(),
        }
    }

    #[must_use]
    pub fn counters(&self) -> &CounterBlock {
        &*self.core.counters
    }

    /// A clone of this worker's counter handle, for the aggregator thread.
    #[must_use]
    pub fn counters_handle(&self) -> std::sync::Arc<CounterBlock> {
        self.core.counters_handle()
    }

    /// Runs the loop body exactly once: one RX burst, translate each frame, one TX
    /// burst, an aging sweep if due. `now` is the session-relative clock the aging
    /// subsystem and session timestamps use; `epoch` monotonic-clock driven, not
    /// wall time, so tests can drive it deterministically.
    pub fn run_once(&mut self, now: u64) {
        let burst = self.source.rx_burst();
        CounterBlock::add(&self.core.counters.packets_rx, burst.len() as u64);

        let mut outbound_batch = Vec::with_capacity(BURST_SIZE);
        for mut frame in burst {
            CounterBlock::add(&self.core.counters.bytes_rx, frame.len() as u64);
            // Latency is sampled over the fast path only (extract + lookup +
            // rewrite); a packet that triggers a new binding also pays port-pool
            // and arena allocation cost, which this stat excludes.
            let nat_created_before = CounterBlock::load(&self.core.counters.nat_created);
            let started = Instant::now();
            let verdict = if self.core.is_customer_source(&frame) {
                self.core.translate_outbound(&mut frame, now)
            } else {
                self.core.translate_inbound(&mut frame, now)
            };
            let elapsed = started.elapsed();
            let created_binding = CounterBlock::load(&self.core.counters.nat_created) > nat_created_before;
            if !created_binding {
                self.core.counters.record_latency(elapsed.as_nanos() as u64);
            }

            match verdict {
                cgnat_nat::Verdict::Translated => outbound_batch.push(frame),
                cgnat_nat::Verdict::Drop(_) => {
                    CounterBlock::incr(&self.core.counters.packets_dropped);
                }
            }
        }

        let submitted = outbound_batch.len();
        let accepted = self.source.tx_burst(outbound_batch);
        CounterBlock::add(&self.core.counters.packets_tx, accepted as u64);
        if accepted < submitted {
            CounterBlock::add(&self.core.counters.packets_dropped, (submitted - accepted) as u64);
        }

        if self.last_age.elapsed() >= self.aging_interval {
            let expired = self.core.age(now);
            tracing::debug!(expired, "aging sweep");
            self.last_age = Instant::now();
        }
    }

    /// Runs [`Self::run_once`] until the shared stop flag is set, deriving `now`
    /// from a caller-supplied clock so the unit this loop measures time in (real
    /// seconds, simulated ticks, whatever the binary's scheduler uses) stays the
    /// caller's choice.
    pub fn run(&mut self, mut clock: impl FnMut() -> u64) {
        while !self.stop.load(Ordering::Relaxed) {
            let now = clock();
            self.run_once(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    struct LoopbackSource {
        queued: Vec<Vec<u8>>,
        transmitted: Vec<Vec<u8>>,
    }

    impl PacketSource for LoopbackSource {
        fn rx_burst(&mut self) -> Vec<Vec<u8>> {
            std::mem::take(&mut self.queued)
        }

        fn tx_burst(&mut self, frames: Vec<Vec<u8>>) -> usize {
            let n = frames.len();
            self.transmitted.extend(frames);
            n
        }
    }

    fn udp_frame(src_ip: [u8; 4], src_port: u16) -> Vec<u8> {
        let mut data = vec![0u8; 14 + 20 + 8];
        data[12] = 0x08;
        data[13] = 0x00;
        data[14] = 0x45;
        data[14 + 9] = 17;
        data[14 + 12..14 + 16].copy_from_slice(&src_ip);
        data[14 + 16..14 + 20].copy_from_slice(&[8, 8, 8, 8]);
        let l4 = 14 + 20;
        data[l4..l4 + 2].copy_from_slice(&src_port.to_be_bytes());
        data[l4 + 2..l4 + 4].copy_from_slice(&53u16.to_be_bytes());
        data
    }

    #[test]
    fn translates_and_transmits_customer_frame() {
        let core = CoreContext::new(
            vec![Ipv4Addr::new(203, 0, 113, 1)],
            8,
            Ipv4Addr::new(10, 0, 0, 0),
            24,
        );
        let source = LoopbackSource {
            queued: vec![udp_frame([10, 0, 0, 5], 40000)],
            transmitted: Vec::new(),
        };
        let stop = Arc::new(AtomicBool::new(false));
        let mut worker = Worker::new(core, source, stop, Duration::from_secs(3600));
        worker.run_once(0);

        assert_eq!(worker.source.transmitted.len(), 1);
        assert_eq!(CounterBlock::load(&worker.counters().packets_tx), 1);
        assert_eq!(CounterBlock::load(&worker.counters().nat_created), 1);
    }

    #[test]
    fn latency_sample_excludes_binding_allocation_but_includes_cache_hit() {
        let core = CoreContext::new(
            vec![Ipv4Addr::new(203, 0, 113, 1)],
            8,
            Ipv4Addr::new(10, 0, 0, 0),
            24,
        );
        let source = LoopbackSource {
            queued: vec![udp_frame([10, 0, 0, 5], 40000)],
            transmitted: Vec::new(),
        };
        let stop = Arc::new(AtomicBool::new(false));
        let mut worker = Worker::new(core, source, stop, Duration::from_secs(3600));

        // First packet creates a new binding: allocation cost must not pollute
        // the latency sample.
        worker.run_once(0);
        assert_eq!(CounterBlock::load(&worker.counters().nat_created), 1);
        assert_eq!(CounterBlock::load(&worker.counters().latency_count), 0);

        // Second packet on the same flow is a lookup hit: the fast path is timed.
        worker.source.queued.push(udp_frame([10, 0, 0, 5], 40000));
        worker.run_once(1);
        assert_eq!(CounterBlock::load(&worker.counters().nat_created), 1);
        assert_eq!(CounterBlock::load(&worker.counters().latency_count), 1);
    }

    #[test]
    fn drops_unsolicited_inbound_frame() {
        let core = CoreContext::new(
            vec![Ipv4Addr::new(203, 0, 113, 1)],
            8,
            Ipv4Addr::new(10, 0, 0, 0),
            24,
        );
        let source = LoopbackSource {
            queued: vec![udp_frame([198, 51, 100, 9], 9000)],
            transmitted: Vec::new(),
        };
        let stop = Arc::new(AtomicBool::new(false));
        let mut worker = Worker::new(core, source, stop, Duration::from_secs(3600));
        worker.run_once(0);

        assert!(worker.source.transmitted.is_empty());
        assert_eq!(CounterBlock::load(&worker.counters().packets_dropped), 1);
    }

    #[test]
    fn run_exits_once_stop_flag_is_set() {
        let core = CoreContext::new(vec![Ipv4Addr::new(203, 0, 113, 1)], 8, Ipv4Addr::new(10, 0, 0, 0), 24);
        let source = LoopbackSource { queued: Vec::new(), transmitted: Vec::new() };
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = Arc::clone(&stop);
        let mut worker = Worker::new(core, source, stop, Duration::from_secs(3600));
        let calls = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let calls_clone = Arc::clone(&calls);
        worker.run(move || {
            let n = calls_clone.fetch_add(1, Ordering::Relaxed) + 1;
            if n >= 3 {
                stop_clone.store(true, Ordering::Relaxed);
            }
            n
        });
        assert!(calls.load(Ordering::Relaxed) >= 3);
    }

    #[test]
    fn channel_fabric_moves_frames_through_the_worker() {
        let (rx_tx, rx_rx) = std::sync::mpsc::channel();
        let (tx_tx, tx_rx) = std::sync::mpsc::channel();
        rx_tx.send(udp_frame([10, 0, 0, 5], 40000)).unwrap();
        let fabric = ChannelFabric::new(rx_rx, tx_tx);

        let core = CoreContext::new(vec![Ipv4Addr::new(203, 0, 113, 1)], 8, Ipv4Addr::new(10, 0, 0, 0), 24);
        let stop = Arc::new(AtomicBool::new(false));
        let mut worker = Worker::new(core, fabric, stop, Duration::from_secs(3600));
        worker.run_once(0);

        assert!(tx_rx.try_recv().is_ok());
    }
}
