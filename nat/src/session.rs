// SPDX-License-Identifier: Apache-2.0
// Copyright CGNAT Authors

//! Session entries and the TCP-aware state machine that drives their idle timeout.

use crate::flow_key::FlowKey;
use cgnat_net::tcp::Flags;
use std::net::Ipv4Addr;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SessionFlags: u8 {
        /// Set between arena acquisition and the first successful index insert;
        /// never observed by anything outside entry creation.
        const CREATING = 0b01;
        const PENDING_EXPIRE = 0b10;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    SynSent,
    Established,
    FinWait,
    Closing,
    TimeWait,
    UdpActive,
    IcmpActive,
}

impl SessionState {
    /// Idle timeout in seconds for a session currently in this state.
    #[must_use]
    pub fn timeout_secs(self) -> u64 {
        match self {
            SessionState::SynSent => 60,
            SessionState::Established => 7200,
            SessionState::FinWait | SessionState::Closing | SessionState::TimeWait => 120,
            SessionState::UdpActive => 300,
            SessionState::IcmpActive => 30,
        }
    }

    /// Applies one side's observed TCP flags, advancing the state per §4.D. State
    /// transitions only ever shorten the remaining lifetime; out-of-state packets
    /// (e.g. an ACK while still `SynSent`) are accepted without rejecting the packet.
    #[must_use]
    pub fn on_tcp_flags(self, flags: Flags) -> Self {
        if flags.contains(Flags::RST) {
            return SessionState::TimeWait;
        }
        match self {
            SessionState::SynSent => {
                if flags.contains(Flags::FIN) {
                    SessionState::FinWait
                } else if !flags.contains(Flags::SYN) {
                    SessionState::Established
                } else {
                    self
                }
            }
            SessionState::Established => {
                if flags.contains(Flags::FIN) {
                    SessionState::FinWait
                } else {
                    self
                }
            }
            SessionState::FinWait => {
                if flags.contains(Flags::FIN) {
                    SessionState::Closing
                } else {
                    self
                }
            }
            SessionState::Closing => {
                if flags.contains(Flags::ACK) {
                    SessionState::TimeWait
                } else {
                    self
                }
            }
            SessionState::TimeWait | SessionState::UdpActive | SessionState::IcmpActive => self,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub private_flow: FlowKey,
    pub public_addr: Ipv4Addr,
    pub public_port: u16,
    pub state: SessionState,
    pub last_activity: u64,
    pub packet_count: u64,
    pub byte_count: u64,
    pub customer_id: u64,
    pub flags: SessionFlags,
}

impl SessionEntry {
    #[must_use]
    pub fn new_tcp(
        private_flow: FlowKey,
        public_addr: Ipv4Addr,
        public_port: u16,
        customer_id: u64,
        now: u64,
    ) -> Self {
        Self::new(
            private_flow,
            public_addr,
            public_port,
            SessionState::SynSent,
            customer_id,
            now,
        )
    }

    #[must_use]
    pub fn new_udp(
        private_flow: FlowKey,
        public_addr: Ipv4Addr,
        public_port: u16,
        customer_id: u64,
        now: u64,
    ) -> Self {
        Self::new(
            private_flow,
            public_addr,
            public_port,
            SessionState::UdpActive,
            customer_id,
            now,
        )
    }

    #[must_use]
    pub fn new_icmp(
        private_flow: FlowKey,
        public_addr: Ipv4Addr,
        public_port: u16,
        customer_id: u64,
        now: u64,
    ) -> Self {
        Self::new(
            private_flow,
            public_addr,
            public_port,
            SessionState::IcmpActive,
            customer_id,
            now,
        )
    }

    fn new(
        private_flow: FlowKey,
        public_addr: Ipv4Addr,
        public_port: u16,
        state: SessionState,
        customer_id: u64,
        now: u64,
    ) -> Self {
        Self {
            private_flow,
            public_addr,
            public_port,
            state,
            last_activity: now,
            packet_count: 0,
            byte_count: 0,
            customer_id,
            flags: SessionFlags::empty(),
        }
    }

    /// Refreshes activity and accounting on every packet that matches this entry,
    /// regardless of direction. `last_activity` is monotonically non-decreasing:
    /// a stale `now` (reordered call) never moves it backwards.
    pub fn touch(&mut self, now: u64, bytes: u64) {
        if now > self.last_activity {
            self.last_activity = now;
        }
        self.packet_count += 1;
        self.byte_count += bytes;
    }

    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.last_activity) >= self.state.timeout_secs()
    }
}
