// SPDX-License-Identifier: Apache-2.0
// Copyright CGNAT Authors

//! [`CoreContext`]: everything one worker core owns exclusively — its two flow
//! indexes, its session arena, its replica of every public IP's port pool, and its
//! counter block. Nothing here is shared for writing with any other core.

use crate::arena::Arena;
use crate::flow_key::FlowKey;
use crate::flow_table::FlowTable;
use crate::port_pool::PortPool;
use crate::session::{SessionEntry, SessionState};
use crate::verdict::{DropReason, Verdict};
use cgnat_net::frame::{Frame, L4};
use cgnat_net::ip::Protocol;
use cgnat_stats::CounterBlock;
use std::net::Ipv4Addr;
use std::sync::Arc;

pub struct CoreContext {
    pub flow_table: FlowTable,
    pub arena: Arena,
    pub port_pools: Vec<PortPool>,
    pub counters: Arc<CounterBlock>,
    customer_subnet: Ipv4Addr,
    customer_prefix_len: u8,
}

impl CoreContext {
    #[must_use]
    pub fn new(
        public_ips: Vec<Ipv4Addr>,
        sessions_capacity: usize,
        customer_subnet: Ipv4Addr,
        customer_prefix_len: u8,
    ) -> Self {
        Self {
            flow_table: FlowTable::with_capacity(sessions_capacity),
            arena: Arena::with_capacity(sessions_capacity),
            port_pools: public_ips.into_iter().map(PortPool::new).collect(),
            counters: Arc::new(CounterBlock::new()),
            customer_subnet,
            customer_prefix_len,
        }
    }

    /// A clone of this core's counter handle, for handing to an aggregator
    /// thread before the core itself is moved onto its worker thread.
    #[must_use]
    pub fn counters_handle(&self) -> Arc<CounterBlock> {
        Arc::clone(&self.counters)
    }

    fn in_customer_subnet(&self, addr: Ipv4Addr) -> bool {
        let mask = if self.customer_prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - self.customer_prefix_len)
        };
        u32::from(addr) & mask == u32::from(self.customer_subnet) & mask
    }

    fn customer_id_of(addr: Ipv4Addr) -> u64 {
        u64::from(u32::from(addr)).wrapping_mul(0x9E37_79B9_7F4A_7C15)
    }

    /// Classifies a frame's direction for the worker loop: `true` if its IPv4
    /// source falls inside this core's customer subnet, `false` otherwise.
    /// Malformed frames classify as customer-sourced so they fall through to
    /// `translate_outbound`'s own parse, which reports the real error.
    #[must_use]
    pub fn is_customer_source(&self, data: &[u8]) -> bool {
        match Frame::parse(data) {
            Ok(frame) => self.in_customer_subnet(frame.source_addr(data)),
            Err(_) => true,
        }
    }

    /// Translates a packet arriving from the customer side. Rewrites `data` in
    /// place on a hit or on a successful new binding.
    pub fn translate_outbound(&mut self, data: &mut [u8], now: u64) -> Verdict {
        let frame = match Frame::parse(data) {
            Ok(frame) => frame,
            Err(_) => {
                CounterBlock::incr(&self.counters.errors_invalid_packet);
                return Verdict::Drop(DropReason::InvalidPacket);
            }
        };
        let src_addr = frame.source_addr(data);
        if !self.in_customer_subnet(src_addr) {
            CounterBlock::incr(&self.counters.errors_invalid_packet);
            return Verdict::Drop(DropReason::InvalidPacket);
        }
        let key = FlowKey::new(
            src_addr,
            frame.destination_addr(data),
            frame.source_port(data),
            frame.destination_port(data),
            frame.l4.protocol(),
        );

        let index = if let Some(index) = self.flow_table.lookup_outbound(&key) {
            CounterBlock::incr(&self.counters.nat_lookup_hit);
            let len = data.len() as u64;
            let entry = self
                .arena
                .get_mut(index)
                .expect("outbound index never points at a freed slot");
            entry.touch(now, len);
            if let L4::Tcp(view) = &frame.l4 {
                entry.state = entry.state.on_tcp_flags(view.flags(data));
            }
            index
        } else {
            match self.create_binding(key, now) {
                Ok(index) => index,
                Err(reason) => return Verdict::Drop(reason),
            }
        };

        let entry = self.arena.get(index).expect("just inserted or found");
        frame.rewrite_source(data, entry.public_addr, entry.public_port);
        Verdict::Translated
    }

    fn create_binding(&mut self, key: FlowKey, now: u64) -> Result<usize, DropReason> {
        if self.port_pools.is_empty() {
            return Err(DropReason::NoPorts);
        }
        let start = (CounterBlock::load(&self.counters.nat_created) as usize) % self.port_pools.len();
        let mut allocation = None;
        for offset in 0..self.port_pools.len() {
            let pool_index = (start + offset) % self.port_pools.len();
            if let Some(port) = self.port_pools[pool_index].alloc() {
                allocation = Some((pool_index, port));
                break;
            }
        }
        let Some((pool_index, port)) = allocation else {
            CounterBlock::incr(&self.counters.errors_no_ports);
            CounterBlock::incr(&self.counters.port_alloc_fail);
            return Err(DropReason::NoPorts);
        };
        CounterBlock::incr(&self.counters.port_alloc_success);

        let public_addr = self.port_pools[pool_index].public_ip();
        let customer_id = Self::customer_id_of(key.src_addr);
        let entry = match key.protocol {
            Protocol::Tcp => SessionEntry::new_tcp(key, public_addr, port, customer_id, now),
            Protocol::Udp => SessionEntry::new_udp(key, public_addr, port, customer_id, now),
            Protocol::Icmp => SessionEntry::new_icmp(key, public_addr, port, customer_id, now),
        };

        let Some(index) = self.arena.acquire(entry) else {
            self.port_pools[pool_index].free(port);
            CounterBlock::incr(&self.counters.errors_no_memory);
            return Err(DropReason::NoMemory);
        };

        let inbound_key = FlowKey::new(key.dst_addr, public_addr, key.dst_port, port, key.protocol);
        if !self.flow_table.insert(key, inbound_key, index) {
            self.arena.release(index);
            self.port_pools[pool_index].free(port);
            return Err(DropReason::Collision);
        }

        CounterBlock::incr(&self.counters.nat_created);
        Ok(index)
    }

    /// Translates a packet arriving from the public side. Drops on a lookup miss:
    /// this translator never accepts unsolicited inbound traffic.
    pub fn translate_inbound(&mut self, data: &mut [u8], now: u64) -> Verdict {
        let frame = match Frame::parse(data) {
            Ok(frame) => frame,
            Err(_) => {
                CounterBlock::incr(&self.counters.errors_invalid_packet);
                return Verdict::Drop(DropReason::InvalidPacket);
            }
        };
        let key = FlowKey::new(
            frame.source_addr(data),
            frame.destination_addr(data),
            frame.source_port(data),
            frame.destination_port(data),
            frame.l4.protocol(),
        );
        let Some(index) = self.flow_table.lookup_inbound(&key) else {
            CounterBlock::incr(&self.counters.nat_lookup_miss);
            return Verdict::Drop(DropReason::LookupMissInbound);
        };
        CounterBlock::incr(&self.counters.nat_lookup_hit);

        let len = data.len() as u64;
        let entry = self
            .arena
            .get_mut(index)
            .expect("inbound index never points at a freed slot");
        entry.touch(now, len);
        if let L4::Tcp(view) = &frame.l4 {
            entry.state = entry.state.on_tcp_flags(view.flags(data));
        }
        let (private_addr, private_port) = (entry.private_flow.src_addr, entry.private_flow.src_port);
        frame.rewrite_destination(data, private_addr, private_port);
        Verdict::Translated
    }

    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.flow_table.outbound_len()
    }

    #[must_use]
    pub fn session_state(&self, index: usize) -> Option<SessionState> {
        self.arena.get(index).map(|e| e.state)
    }
}
