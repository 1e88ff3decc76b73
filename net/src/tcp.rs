// SPDX-License-Identifier: Apache-2.0
// Copyright CGNAT Authors

//! An offset-based view over a TCP header, plus the flag bits the session state
//! machine reads to drive its transitions.

use crate::checksum::{fold_checksum, sum_bytes};
use std::net::Ipv4Addr;

pub const MIN_HEADER_LEN: usize = 20;

bitflags::bitflags! {
    /// The six flag bits the state machine cares about. The URG/ECE/CWR bits are
    /// carried on the wire but never consulted here.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u8 {
        const FIN = 0b0000_0001;
        const SYN = 0b0000_0010;
        const RST = 0b0000_0100;
        const PSH = 0b0000_1000;
        const ACK = 0b0001_0000;
        const URG = 0b0010_0000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TcpError {
    #[error("packet shorter than a minimal TCP header")]
    Truncated,
    #[error("data offset ({0} words) shorter than the minimum header")]
    BadDataOffset(u8),
}

#[derive(Debug, PartialEq)]
pub struct TcpView {
    start: usize,
    header_len: usize,
}

impl TcpView {
    pub fn parse(data: &[u8], start: usize) -> Result<Self, TcpError> {
        if data.len() < start + MIN_HEADER_LEN {
            return Err(TcpError::Truncated);
        }
        let data_offset = data[start + 12] >> 4;
        if data_offset < 5 {
            return Err(TcpError::BadDataOffset(data_offset));
        }
        let header_len = usize::from(data_offset) * 4;
        if data.len() < start + header_len {
            return Err(TcpError::Truncated);
        }
        Ok(Self { start, header_len })
    }

    #[must_use]
    pub fn header_len(&self) -> usize {
        self.header_len
    }

    #[must_use]
    pub fn source_port(&self, data: &[u8]) -> u16 {
        u16::from_be_bytes([data[self.start], data[self.start + 1]])
    }

    #[must_use]
    pub fn destination_port(&self, data: &[u8]) -> u16 {
        u16::from_be_bytes([data[self.start + 2], data[self.start + 3]])
    }

    pub fn set_source_port(&self, data: &mut [u8], port: u16) {
        data[self.start..self.start + 2].copy_from_slice(&port.to_be_bytes());
    }

    pub fn set_destination_port(&self, data: &mut [u8], port: u16) {
        data[self.start + 2..self.start + 4].copy_from_slice(&port.to_be_bytes());
    }

    #[must_use]
    pub fn flags(&self, data: &[u8]) -> Flags {
        Flags::from_bits_truncate(data[self.start + 13])
    }

    /// Recomputes the TCP checksum over the pseudo-header plus the full segment
    /// (header and payload), with the checksum field zeroed during the fold.
    pub fn fix_checksum(&self, data: &mut [u8], l4_start: usize, src: Ipv4Addr, dst: Ipv4Addr) {
        let l4_len = (data.len() - l4_start) as u16;
        data[self.start + 16] = 0;
        data[self.start + 17] = 0;
        let mut sum = crate::checksum::pseudo_header_sum(src, dst, crate::ip::Protocol::TCP_NUMBER, l4_len);
        sum += sum_bytes(&data[l4_start..]);
        let checksum = fold_checksum(sum);
        data[self.start + 16..self.start + 18].copy_from_slice(&checksum.to_be_bytes());
    }

    #[must_use]
    pub fn checksum(&self, data: &[u8]) -> u16 {
        u16::from_be_bytes([data[self.start + 16], data[self.start + 17]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_segment() -> Vec<u8> {
        let mut segment = vec![0u8; 20];
        segment[0..2].copy_from_slice(&1234u16.to_be_bytes());
        segment[2..4].copy_from_slice(&80u16.to_be_bytes());
        segment[12] = 5 << 4;
        segment[13] = Flags::SYN.bits();
        segment
    }

    #[test]
    fn parses_ports_and_flags() {
        let data = sample_segment();
        let view = TcpView::parse(&data, 0).unwrap();
        assert_eq!(view.source_port(&data), 1234);
        assert_eq!(view.destination_port(&data), 80);
        assert!(view.flags(&data).contains(Flags::SYN));
        assert!(!view.flags(&data).contains(Flags::ACK));
    }

    #[test]
    fn rejects_truncated_header() {
        assert_eq!(TcpView::parse(&[0u8; 10], 0), Err(TcpError::Truncated));
    }

    #[test]
    fn checksum_is_self_consistent() {
        let mut data = sample_segment();
        let view = TcpView::parse(&data, 0).unwrap();
        let src = Ipv4Addr::new(10, 0, 0, 1);
        let dst = Ipv4Addr::new(203, 0, 113, 5);
        view.fix_checksum(&mut data, 0, src, dst);
        let mut sum = crate::checksum::pseudo_header_sum(src, dst, crate::ip::Protocol::TCP_NUMBER, data.len() as u16);
        sum += sum_bytes(&data);
        assert_eq!(fold_checksum(sum), 0);
    }
}
