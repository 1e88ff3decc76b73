// SPDX-License-Identifier: Apache-2.0
// Copyright CGNAT Authors

//! The two hash indexes a core keeps over its session entries: outbound, keyed by
//! the private-side 5-tuple, and inbound, keyed by the reverse public-side 5-tuple.
//! Both store the same arena index, never an owning reference — see [`crate::arena`].

use crate::flow_key::FlowKey;
use ahash::AHashMap;

#[derive(Debug, Default)]
pub struct FlowTable {
    outbound: AHashMap<FlowKey, usize>,
    inbound: AHashMap<FlowKey, usize>,
}

impl FlowTable {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            outbound: AHashMap::with_capacity_and_hasher(capacity, ahash::RandomState::new()),
            inbound: AHashMap::with_capacity_and_hasher(capacity, ahash::RandomState::new()),
        }
    }

    #[must_use]
    pub fn lookup_outbound(&self, key: &FlowKey) -> Option<usize> {
        self.outbound.get(key).copied()
    }

    #[must_use]
    pub fn lookup_inbound(&self, key: &FlowKey) -> Option<usize> {
        self.inbound.get(key).copied()
    }

    /// Inserts both directions for a freshly created entry. Returns `false` without
    /// mutating anything if either key is already present — a concurrent-creation
    /// collision the caller should treat as a drop.
    #[must_use]
    pub fn insert(&mut self, outbound_key: FlowKey, inbound_key: FlowKey, index: usize) -> bool {
        if self.outbound.contains_key(&outbound_key) || self.inbound.contains_key(&inbound_key) {
            return false;
        }
        self.outbound.insert(outbound_key, index);
        self.inbound.insert(inbound_key, index);
        true
    }

    /// Removes both index slots for an entry, in the order §4.G mandates: inbound
    /// first, then outbound.
    pub fn remove(&mut self, outbound_key: &FlowKey, inbound_key: &FlowKey) {
        self.inbound.remove(inbound_key);
        self.outbound.remove(outbound_key);
    }

    #[must_use]
    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    /// Iterates `(outbound_key, arena_index)` pairs, for the aging sweep.
    pub fn iter_outbound(&self) -> impl Iterator<Item = (&FlowKey, &usize)> {
        self.outbound.iter()
    }
}
