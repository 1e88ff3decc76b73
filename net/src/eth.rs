// SPDX-License-Identifier: Apache-2.0
// Copyright CGNAT Authors

//! Ethernet II framing. The translator never touches MAC addresses; this module exists
//! only so [`crate::frame::Frame`] can skip over the 14-byte header and tell IPv4
//! traffic apart from everything else.

/// An Ethernet II header is always 14 bytes: two 6-byte MAC addresses and a 2-byte
/// EtherType.
pub const HEADER_LEN: usize = 14;

/// EtherType for IPv4, as carried in the last two bytes of the Ethernet header.
pub const ETHERTYPE_IPV4: u16 = 0x0800;

/// Reads the EtherType field of an Ethernet II header.
///
/// # Errors
///
/// Returns `None` if `frame` is shorter than [`HEADER_LEN`].
#[must_use]
pub fn ether_type(frame: &[u8]) -> Option<u16> {
    let bytes: [u8; 2] = frame.get(12..14)?.try_into().ok()?;
    Some(u16::from_be_bytes(bytes))
}
