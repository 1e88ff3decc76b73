// SPDX-License-Identifier: Apache-2.0
// Copyright CGNAT Authors

//! [`Frame`]: the single entry point the packet rewriter uses to make sense of a raw
//! Ethernet frame. Parsing produces borrowed views (see [`crate::ipv4`], [`crate::tcp`],
//! [`crate::udp`], [`crate::icmp4`]) rather than an owned copy, since the rewriter
//! mutates the same bytes it just parsed.

use crate::{eth, icmp4, ip::Protocol, ipv4, tcp, udp};
use std::net::Ipv4Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("not an IPv4 frame")]
    NotIpv4,
    #[error(transparent)]
    Ipv4(#[from] ipv4::Ipv4Error),
    #[error("unsupported IP protocol {0}")]
    UnsupportedProtocol(u8),
    #[error(transparent)]
    Tcp(#[from] tcp::TcpError),
    #[error(transparent)]
    Udp(#[from] udp::UdpError),
    #[error(transparent)]
    Icmp(#[from] icmp4::Icmp4Error),
}

/// The transport-layer view of a parsed frame, borrowed from the same buffer as the
/// IPv4 header.
#[derive(Debug, PartialEq)]
pub enum L4 {
    Tcp(tcp::TcpView),
    Udp(udp::UdpView),
    Icmp(icmp4::Icmp4View),
}

impl L4 {
    #[must_use]
    pub fn protocol(&self) -> Protocol {
        match self {
            Self::Tcp(_) => Protocol::Tcp,
            Self::Udp(_) => Protocol::Udp,
            Self::Icmp(_) => Protocol::Icmp,
        }
    }

    #[must_use]
    pub fn header_len(&self) -> usize {
        match self {
            Self::Tcp(v) => v.header_len(),
            Self::Udp(v) => v.header_len(),
            Self::Icmp(v) => v.header_len(),
        }
    }
}

/// A parsed Ethernet+IPv4+L4 frame: the IPv4 header view plus whichever L4 view
/// matched its protocol field.
#[derive(Debug, PartialEq)]
pub struct Frame {
    pub ipv4: ipv4::Ipv4View,
    pub l4: L4,
}

impl Frame {
    /// Parses an Ethernet II frame carrying IPv4 and one of TCP, UDP or ICMP, far
    /// enough to locate every field the translator needs to read or rewrite.
    pub fn parse(data: &[u8]) -> Result<Self, FrameError> {
        if eth::ether_type(data) != Some(eth::ETHERTYPE_IPV4) {
            return Err(FrameError::NotIpv4);
        }
        let ipv4 = ipv4::Ipv4View::parse(data, eth::HEADER_LEN)?;
        let l4_start = ipv4.l4_offset();
        let l4 = match Protocol::from_ip_number(ipv4.protocol(data)) {
            Some(Protocol::Tcp) => L4::Tcp(tcp::TcpView::parse(data, l4_start)?),
            Some(Protocol::Udp) => L4::Udp(udp::UdpView::parse(data, l4_start)?),
            Some(Protocol::Icmp) => L4::Icmp(icmp4::Icmp4View::parse(data, l4_start)?),
            None => return Err(FrameError::UnsupportedProtocol(ipv4.protocol(data))),
        };
        Ok(Self { ipv4, l4 })
    }

    #[must_use]
    pub fn source_addr(&self, data: &[u8]) -> Ipv4Addr {
        self.ipv4.source(data)
    }

    #[must_use]
    pub fn destination_addr(&self, data: &[u8]) -> Ipv4Addr {
        self.ipv4.destination(data)
    }

    /// The port or ICMP identifier that the flow key uses as the "source" endpoint.
    #[must_use]
    pub fn source_port(&self, data: &[u8]) -> u16 {
        match &self.l4 {
            L4::Tcp(v) => v.source_port(data),
            L4::Udp(v) => v.source_port(data),
            L4::Icmp(v) => v.identifier(data),
        }
    }

    #[must_use]
    pub fn destination_port(&self, data: &[u8]) -> u16 {
        match &self.l4 {
            L4::Tcp(v) => v.destination_port(data),
            L4::Udp(v) => v.destination_port(data),
            L4::Icmp(v) => v.identifier(data),
        }
    }

    /// Rewrites the source address and port (or ICMP identifier), then recomputes
    /// every checksum the mutation invalidated.
    pub fn rewrite_source(&self, data: &mut [u8], addr: Ipv4Addr, port: u16) {
        self.ipv4.set_source(data, addr);
        let dst = self.ipv4.destination(data);
        let l4_start = self.ipv4.l4_offset();
        match &self.l4 {
            L4::Tcp(v) => {
                v.set_source_port(data, port);
                v.fix_checksum(data, l4_start, addr, dst);
            }
            L4::Udp(v) => {
                v.set_source_port(data, port);
                v.fix_checksum(data, l4_start, addr, dst);
            }
            L4::Icmp(v) => {
                v.set_identifier(data, port);
                v.fix_checksum(data);
            }
        }
        self.ipv4.fix_checksum(data);
    }

    /// Rewrites the destination address and port (or ICMP identifier), then
    /// recomputes every checksum the mutation invalidated.
    pub fn rewrite_destination(&self, data: &mut [u8], addr: Ipv4Addr, port: u16) {
        self.ipv4.set_destination(data, addr);
        let src = self.ipv4.source(data);
        let l4_start = self.ipv4.l4_offset();
        match &self.l4 {
            L4::Tcp(v) => {
                v.set_destination_port(data, port);
                v.fix_checksum(data, l4_start, src, addr);
            }
            L4::Udp(v) => {
                v.set_destination_port(data, port);
                v.fix_checksum(data, l4_start, src, addr);
            }
            L4::Icmp(v) => {
                v.set_identifier(data, port);
                v.fix_checksum(data);
            }
        }
        self.ipv4.fix_checksum(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tcp_frame() -> Vec<u8> {
        let mut data = vec![0u8; eth::HEADER_LEN + 20 + 20];
        data[12] = 0x08;
        data[13] = 0x00;
        let ip_start = eth::HEADER_LEN;
        data[ip_start] = 0x45;
        data[ip_start + 9] = Protocol::TCP_NUMBER;
        data[ip_start + 12..ip_start + 16].copy_from_slice(&[10, 0, 0, 5]);
        data[ip_start + 16..ip_start + 20].copy_from_slice(&[203, 0, 113, 1]);
        let tcp_start = ip_start + 20;
        data[tcp_start..tcp_start + 2].copy_from_slice(&50000u16.to_be_bytes());
        data[tcp_start + 2..tcp_start + 4].copy_from_slice(&443u16.to_be_bytes());
        data[tcp_start + 12] = 5 << 4;
        data
    }

    #[test]
    fn parses_tcp_frame() {
        let data = sample_tcp_frame();
        let frame = Frame::parse(&data).unwrap();
        assert_eq!(frame.source_addr(&data), Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(frame.source_port(&data), 50000);
        assert_eq!(frame.destination_port(&data), 443);
    }

    #[test]
    fn rewrite_source_updates_port_and_checksums() {
        let mut data = sample_tcp_frame();
        let frame = Frame::parse(&data).unwrap();
        frame.rewrite_source(&mut data, Ipv4Addr::new(198, 51, 100, 9), 61000);
        let frame2 = Frame::parse(&data).unwrap();
        assert_eq!(frame2.source_addr(&data), Ipv4Addr::new(198, 51, 100, 9));
        assert_eq!(frame2.source_port(&data), 61000);
        assert_eq!(frame2.ipv4.checksum(&data) != 0, true);
    }

    #[test]
    fn rejects_non_ipv4_ethertype() {
        let mut data = sample_tcp_frame();
        data[12] = 0x86;
        data[13] = 0xDD;
        assert_eq!(Frame::parse(&data), Err(FrameError::NotIpv4));
    }
}
