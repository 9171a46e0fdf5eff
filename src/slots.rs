// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Generational slot-map shards.
//!
//! A slot maps a handle index to its entity's `(archetype, row)` location.
//! Slots never deallocate; erasing bumps the version so stale handles can
//! never resolve, and freed slots chain through their value field.

use crate::entity::{Handle, VERSION_MASK};
use crate::segvec::SegVec;

/// Free-chain terminator.
pub(crate) const NIL: u32 = u32::MAX;

/// Where an entity currently lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Location {
    pub archetype: u32,
    pub row: u32,
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum SlotValue {
    Full(Location),
    Free { next: u32 },
}

pub(crate) struct Slot {
    pub version: u32,
    pub value: SlotValue,
}

/// One shard: a segmented slot vector plus its free-chain head.
pub(crate) struct Shard {
    slots: SegVec<Slot>,
    first_free: u32,
    len: usize,
}

impl Shard {
    /// Create with `initial` slots pre-linked into the free chain, so the
    /// first `initial` inserts allocate nothing.
    pub fn new(segment_bits: u32, initial: usize) -> Self {
        let mut slots = SegVec::with_segment_bits(segment_bits);
        for i in 0..initial {
            let next = if i + 1 < initial { (i + 1) as u32 } else { NIL };
            slots.push(Slot {
                version: 0,
                value: SlotValue::Free { next },
            });
        }
        Self {
            slots,
            first_free: if initial > 0 { 0 } else { NIL },
            len: 0,
        }
    }

    /// Live entities in this shard.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Allocated slots, free ones included.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Claim a slot for `location`. Reused slots keep their bumped version,
    /// so any handle issued before the last erase stays dead. Returns
    /// `(index, version)` for handle packing.
    pub fn insert(&mut self, location: Location) -> (u32, u32) {
        let index = if self.first_free != NIL {
            let index = self.first_free;
            let slot = self
                .slots
                .get_mut(index as usize)
                .expect("free chain index out of bounds");
            self.first_free = match slot.value {
                SlotValue::Free { next } => next,
                SlotValue::Full(_) => unreachable!("free chain points at a full slot"),
            };
            slot.value = SlotValue::Full(location);
            index
        } else {
            self.slots.push(Slot {
                version: 0,
                value: SlotValue::Full(location),
            }) as u32
        };
        self.len += 1;
        (index, self.slots[index as usize].version)
    }

    /// Release a slot: bump its version and push it on the free chain.
    pub fn erase(&mut self, index: u32) {
        let head = self.first_free;
        let slot = self
            .slots
            .get_mut(index as usize)
            .expect("slot index out of bounds");
        debug_assert!(
            matches!(slot.value, SlotValue::Full(_)),
            "erase of a free slot"
        );
        slot.version = (slot.version + 1) & VERSION_MASK;
        slot.value = SlotValue::Free { next: head };
        self.first_free = index;
        self.len -= 1;
    }

    /// Location for `handle`, or `None` when the version mismatches or the
    /// slot is free.
    pub fn resolve(&self, handle: Handle) -> Option<Location> {
        let slot = self.slots.get(handle.index() as usize)?;
        if slot.version != handle.version() {
            return None;
        }
        match slot.value {
            SlotValue::Full(location) => Some(location),
            SlotValue::Free { .. } => None,
        }
    }

    /// Re-point a full slot, e.g. after its row was swapped or its entity
    /// migrated archetypes.
    pub fn set_location(&mut self, index: u32, location: Location) {
        let slot = self
            .slots
            .get_mut(index as usize)
            .expect("slot index out of bounds");
        debug_assert!(
            matches!(slot.value, SlotValue::Full(_)),
            "relocating a free slot"
        );
        slot.value = SlotValue::Full(location);
    }

    /// Free every slot, preserving versions: handles issued before the
    /// clear must never resolve again.
    pub fn clear(&mut self) {
        let total = self.slots.len();
        for i in 0..total {
            let next = if i + 1 < total { (i + 1) as u32 } else { NIL };
            let slot = &mut self.slots[i];
            if matches!(slot.value, SlotValue::Full(_)) {
                slot.version = (slot.version + 1) & VERSION_MASK;
            }
            slot.value = SlotValue::Free { next };
        }
        self.first_free = if total > 0 { 0 } else { NIL };
        self.len = 0;
    }

    /// Iterate `(index, slot)` pairs; validation walks this.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Slot)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, slot)| (i as u32, slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(archetype: u32, row: u32) -> Location {
        Location { archetype, row }
    }

    #[test]
    fn preallocated_chain_serves_inserts_in_order() {
        let mut shard = Shard::new(2, 4);
        assert_eq!(shard.capacity(), 4);
        for expected in 0..4u32 {
            let (index, version) = shard.insert(loc(0, expected));
            assert_eq!(index, expected);
            assert_eq!(version, 0);
        }
        // Chain exhausted: the next insert grows the vector.
        let (index, version) = shard.insert(loc(0, 4));
        assert_eq!(index, 4);
        assert_eq!(version, 0);
        assert_eq!(shard.len(), 5);
    }

    #[test]
    fn erase_bumps_version_and_recycles() {
        let mut shard = Shard::new(2, 2);
        let (index, v0) = shard.insert(loc(0, 0));
        shard.erase(index);
        assert_eq!(shard.len(), 0);

        let (reused, v1) = shard.insert(loc(1, 7));
        assert_eq!(reused, index);
        assert_eq!(v1, (v0 + 1) & VERSION_MASK);
    }

    #[test]
    fn stale_handles_do_not_resolve() {
        let mut shard = Shard::new(2, 2);
        let (index, version) = shard.insert(loc(3, 9));
        let live = Handle::new(index, version, 0);
        assert_eq!(shard.resolve(live), Some(loc(3, 9)));

        shard.erase(index);
        assert_eq!(shard.resolve(live), None);

        let (index2, version2) = shard.insert(loc(4, 0));
        assert_eq!(index2, index);
        let fresh = Handle::new(index2, version2, 0);
        assert_eq!(shard.resolve(fresh), Some(loc(4, 0)));
        assert_eq!(shard.resolve(live), None);
    }

    #[test]
    fn clear_keeps_old_handles_dead() {
        let mut shard = Shard::new(2, 2);
        let (index, version) = shard.insert(loc(0, 0));
        let old = Handle::new(index, version, 0);

        shard.clear();
        assert_eq!(shard.len(), 0);
        assert_eq!(shard.resolve(old), None);

        // Reuse after clear hands out a different version.
        let (index2, version2) = shard.insert(loc(0, 0));
        assert_eq!(index2, index);
        assert_ne!(version2, version);
    }

    #[test]
    fn set_location_repoints_rows() {
        let mut shard = Shard::new(2, 2);
        let (index, version) = shard.insert(loc(0, 5));
        shard.set_location(index, loc(0, 1));
        let handle = Handle::new(index, version, 0);
        assert_eq!(shard.resolve(handle), Some(loc(0, 1)));
    }
}
