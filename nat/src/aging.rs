// SPDX-License-Identifier: Apache-2.0
// Copyright CGNAT Authors

//! Sweep-based aging: the simpler of the two strategies §4.G allows, and the one
//! this implementation commits to. Never call this while a packet is mid-rewrite on
//! the same core — the worker loop invokes it between bursts, never inside one.

use crate::core::CoreContext;
use cgnat_stats::CounterBlock;

impl CoreContext {
    /// Removes every session whose idle time has crossed its state's timeout.
    /// Returns the number of sessions expired. Teardown order is fixed: inbound
    /// index slot, outbound index slot, port, arena slot — so no other thread can
    /// observe a freed port still claimed by a live index entry.
    pub fn age(&mut self, now: u64) -> usize {
        let expired: Vec<usize> = self
            .flow_table
            .iter_outbound()
            .filter_map(|(_, &index)| {
                let entry = self.arena.get(index)?;
                entry.is_expired(now).then_some(index)
            })
            .collect();

        for index in &expired {
            let Some(entry) = self.arena.get(*index) else {
                continue;
            };
            let outbound_key = entry.private_flow;
            let inbound_key = crate::flow_key::FlowKey::new(
                outbound_key.dst_addr,
                entry.public_addr,
                outbound_key.dst_port,
                entry.public_port,
                outbound_key.protocol,
            );
            let public_port = entry.public_port;
            let public_addr = entry.public_addr;

            self.flow_table.remove(&outbound_key, &inbound_key);
            if let Some(pool) = self
                .port_pools
                .iter_mut()
                .find(|pool| pool.public_ip() == public_addr)
            {
                pool.free(public_port);
                CounterBlock::incr(&self.counters.port_freed);
            }
            self.arena.release(*index);
            CounterBlock::incr(&self.counters.nat_expired);
        }

        expired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgnat_net::frame::Frame;
    use std::net::Ipv4Addr;

    fn sample_udp_frame(src_port: u16) -> Vec<u8> {
        let mut data = vec![0u8; 14 + 20 + 8];
        data[12] = 0x08;
        data[13] = 0x00;
        data[14] = 0x45;
        data[14 + 9] = 17; // UDP
        data[14 + 12..14 + 16].copy_from_slice(&[10, 0, 0, 5]);
        data[14 + 16..14 + 20].copy_from_slice(&[8, 8, 8, 8]);
        let l4 = 14 + 20;
        data[l4..l4 + 2].copy_from_slice(&src_port.to_be_bytes());
        data[l4 + 2..l4 + 4].copy_from_slice(&53u16.to_be_bytes());
        data
    }

    #[test]
    fn aging_frees_port_and_removes_entry() {
        let mut ctx = CoreContext::new(
            vec![Ipv4Addr::new(203, 0, 113, 1)],
            8,
            Ipv4Addr::new(10, 0, 0, 0),
            24,
        );
        let mut packet = sample_udp_frame(40000);
        ctx.translate_outbound(&mut packet, 0);
        assert_eq!(ctx.active_sessions(), 1);
        assert_eq!(ctx.port_pools[0].allocated_count(), 1);

        let expired = ctx.age(301);
        assert_eq!(expired, 1);
        assert_eq!(ctx.active_sessions(), 0);
        assert_eq!(ctx.port_pools[0].allocated_count(), 0);
        assert_eq!(ctx.arena.free_count(), ctx.arena.capacity());
        let _ = Frame::parse(&packet);
    }

    #[test]
    fn aging_leaves_fresh_entries_alone() {
        let mut ctx = CoreContext::new(
            vec![Ipv4Addr::new(203, 0, 113, 1)],
            8,
            Ipv4Addr::new(10, 0, 0, 0),
            24,
        );
        let mut packet = sample_udp_frame(40000);
        ctx.translate_outbound(&mut packet, 0);
        assert_eq!(ctx.age(10), 0);
        assert_eq!(ctx.active_sessions(), 1);
    }
}
