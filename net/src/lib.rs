// SPDX-License-Identifier: Apache-2.0
// Copyright CGNAT Authors

//! Wire-format types for the packets the translator rewrites in place: Ethernet II,
//! IPv4, TCP, UDP and ICMPv4. Everything here operates on byte slices borrowed from the
//! packet I/O fabric's own buffers; nothing in this crate allocates.

pub mod buffer;
pub mod checksum;
pub mod eth;
pub mod frame;
pub mod icmp4;
pub mod ip;
pub mod ipv4;
pub mod tcp;
pub mod udp;

pub use frame::{Frame, FrameError, L4};
