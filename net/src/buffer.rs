// SPDX-License-Identifier: Apache-2.0
// Copyright CGNAT Authors

//! [`PacketBuffer`] and [`PacketBufferMut`]: the narrow contract the translator needs
//! from whatever buffer type the packet I/O fabric hands it. The fabric itself (mbuf
//! pools, hugepage-backed rings, DMA descriptors) is out of scope; this crate only
//! needs a mutable, contiguous view of the bytes.

use std::fmt::Debug;

/// A read-only view of packet bytes.
pub trait PacketBuffer: AsRef<[u8]> + Debug {}
impl<T: AsRef<[u8]> + Debug> PacketBuffer for T {}

/// A mutable view of packet bytes. The translator never changes a packet's length, so
/// unlike a general-purpose packet buffer this trait has no prepend/trim operations.
pub trait PacketBufferMut: PacketBuffer + AsMut<[u8]> + Send {}
impl<T: PacketBuffer + AsMut<[u8]> + Send> PacketBufferMut for T {}

#[cfg(any(test, feature = "test_buffer"))]
pub mod test_buffer {
    //! A heap-backed buffer usable in unit tests, in lieu of a real mbuf.

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct TestBuffer(pub Vec<u8>);

    impl AsRef<[u8]> for TestBuffer {
        fn as_ref(&self) -> &[u8] {
            &self.0
        }
    }

    impl AsMut<[u8]> for TestBuffer {
        fn as_mut(&mut self) -> &mut [u8] {
            &mut self.0
        }
    }
}
