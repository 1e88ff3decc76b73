// SPDX-License-Identifier: Apache-2.0
// Copyright CGNAT Authors

//! A thin, offset-based view over an IPv4 header living inside a packet buffer.
//!
//! Unlike a general-purpose parser this does not build an owned copy of the header:
//! the translator only ever needs to read a handful of fields and overwrite the
//! source/destination address and the header checksum, so it reads and writes
//! straight through to the buffer at fixed offsets derived from the IHL.

use crate::checksum::{fold_checksum, sum_bytes};
use std::net::Ipv4Addr;

/// Minimum legal IHL: a 20-byte header with no options.
pub const MIN_HEADER_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Ipv4Error {
    #[error("packet shorter than a minimal IPv4 header")]
    Truncated,
    #[error("not an IPv4 packet (version {0})")]
    WrongVersion(u8),
    #[error("bogus IHL ({0} words)")]
    BadIhl(u8),
    #[error("header declares more bytes than the packet has")]
    TruncatedHeader,
}

/// A view over the bytes `[start, start + header_len)` of a packet buffer, known to
/// hold a syntactically valid IPv4 header.
#[derive(Debug, PartialEq)]
pub struct Ipv4View {
    start: usize,
    header_len: usize,
}

impl Ipv4View {
    /// Parses the fixed fields of the IPv4 header beginning at `start` in `data`,
    /// validating just enough to find the L4 payload offset safely: version, IHL
    /// range, and that the buffer is long enough to hold the declared header.
    pub fn parse(data: &[u8], start: usize) -> Result<Self, Ipv4Error> {
        let first = *data.get(start).ok_or(Ipv4Error::Truncated)?;
        let version = first >> 4;
        if version != 4 {
            return Err(Ipv4Error::WrongVersion(version));
        }
        let ihl = first & 0x0F;
        if ihl < 5 {
            return Err(Ipv4Error::BadIhl(ihl));
        }
        let header_len = usize::from(ihl) * 4;
        if data.len() < start + header_len {
            return Err(Ipv4Error::TruncatedHeader);
        }
        Ok(Self { start, header_len })
    }

    #[must_use]
    pub fn header_len(&self) -> usize {
        self.header_len
    }

    #[must_use]
    pub fn l4_offset(&self) -> usize {
        self.start + self.header_len
    }

    #[must_use]
    pub fn total_len(&self, data: &[u8]) -> u16 {
        u16::from_be_bytes([data[self.start + 2], data[self.start + 3]])
    }

    #[must_use]
    pub fn protocol(&self, data: &[u8]) -> u8 {
        data[self.start + 9]
    }

    #[must_use]
    pub fn source(&self, data: &[u8]) -> Ipv4Addr {
        Ipv4Addr::new(
            data[self.start + 12],
            data[self.start + 13],
            data[self.start + 14],
            data[self.start + 15],
        )
    }

    #[must_use]
    pub fn destination(&self, data: &[u8]) -> Ipv4Addr {
        Ipv4Addr::new(
            data[self.start + 16],
            data[self.start + 17],
            data[self.start + 18],
            data[self.start + 19],
        )
    }

    pub fn set_source(&self, data: &mut [u8], addr: Ipv4Addr) {
        data[self.start + 12..self.start + 16].copy_from_slice(&addr.octets());
    }

    pub fn set_destination(&self, data: &mut [u8], addr: Ipv4Addr) {
        data[self.start + 16..self.start + 20].copy_from_slice(&addr.octets());
    }

    /// Recomputes and writes the IPv4 header checksum from scratch, with the
    /// checksum field itself treated as zero during the fold.
    pub fn fix_checksum(&self, data: &mut [u8]) {
        data[self.start + 10] = 0;
        data[self.start + 11] = 0;
        let sum = sum_bytes(&data[self.start..self.start + self.header_len]);
        let checksum = fold_checksum(sum);
        data[self.start + 10..self.start + 12].copy_from_slice(&checksum.to_be_bytes());
    }

    #[must_use]
    pub fn checksum(&self, data: &[u8]) -> u16 {
        u16::from_be_bytes([data[self.start + 10], data[self.start + 11]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> Vec<u8> {
        #[rustfmt::skip]
        let header: Vec<u8> = vec![
            0x45, 0x00, 0x00, 0x3c, 0x1c, 0x46, 0x40, 0x00,
            0x40, 0x06, 0x00, 0x00, 10, 0, 0, 5,
            8, 8, 8, 8,
        ];
        header
    }

    #[test]
    fn parses_minimal_header() {
        let data = sample_header();
        let view = Ipv4View::parse(&data, 0).unwrap();
        assert_eq!(view.header_len(), 20);
        assert_eq!(view.source(&data), Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(view.destination(&data), Ipv4Addr::new(8, 8, 8, 8));
        assert_eq!(view.protocol(&data), 6);
    }

    #[test]
    fn rejects_bad_version() {
        let mut data = sample_header();
        data[0] = 0x55; // version 5
        assert_eq!(Ipv4View::parse(&data, 0), Err(Ipv4Error::WrongVersion(5)));
    }

    #[test]
    fn rejects_truncated_header() {
        let data = vec![0x45, 0x00];
        assert_eq!(Ipv4View::parse(&data, 0), Err(Ipv4Error::TruncatedHeader));
    }

    #[test]
    fn checksum_round_trips() {
        let mut data = sample_header();
        let view = Ipv4View::parse(&data, 0).unwrap();
        view.fix_checksum(&mut data);
        assert_eq!(view.checksum(&data), 0xb1e6);
    }

    #[test]
    fn rewrites_addresses() {
        let mut data = sample_header();
        let view = Ipv4View::parse(&data, 0).unwrap();
        view.set_source(&mut data, Ipv4Addr::new(203, 0, 113, 1));
        view.fix_checksum(&mut data);
        assert_eq!(view.source(&data), Ipv4Addr::new(203, 0, 113, 1));
        let sum = sum_bytes(&data[0..20]);
        assert_eq!(fold_checksum(sum), 0);
    }
}
