// SPDX-License-Identifier: Apache-2.0
// Copyright CGNAT Authors

//! The transport-layer protocol discriminant the translator cares about.

/// IANA protocol numbers for the three protocols the translator rewrites. Anything
/// else is an `invalid-packet` per the translator's error model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
}

impl Protocol {
    pub const TCP_NUMBER: u8 = 6;
    pub const UDP_NUMBER: u8 = 17;
    pub const ICMP_NUMBER: u8 = 1;

    #[must_use]
    pub fn from_ip_number(n: u8) -> Option<Self> {
        match n {
            Self::TCP_NUMBER => Some(Self::Tcp),
            Self::UDP_NUMBER => Some(Self::Udp),
            Self::ICMP_NUMBER => Some(Self::Icmp),
            _ => None,
        }
    }

    #[must_use]
    pub fn ip_number(self) -> u8 {
        match self {
            Self::Tcp => Self::TCP_NUMBER,
            Self::Udp => Self::UDP_NUMBER,
            Self::Icmp => Self::ICMP_NUMBER,
        }
    }
}
