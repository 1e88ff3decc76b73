// SPDX-License-Identifier: Apache-2.0
// Copyright CGNAT Authors

//! Per-core counters and the lock-free aggregation of them into a single snapshot.
//!
//! Each worker core owns one [`CounterBlock`] and never shares it for writing. A
//! separate aggregator thread sums every core's block into a [`Snapshot`] on a
//! read-only basis; see [`aggregate`].

mod counters;
mod snapshot;

pub use counters::CounterBlock;
pub use snapshot::{Snapshot, aggregate};
