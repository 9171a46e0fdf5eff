//! Diagnostics: console summary, invariant validation, memory accounting.

use crate::archetype::signature_hash;
use crate::column::Column;
use crate::entity::Handle;
use crate::error::{EcsError, Result};
use crate::registry::Registry;
use crate::slots::{Slot, SlotValue};

/// Memory accounting for the live-view size estimate.
#[derive(Debug, Clone, Copy)]
pub struct MemoryStats {
    /// Bytes held by component columns.
    pub component_bytes: usize,
    /// Bytes held by the implicit handle columns.
    pub handle_bytes: usize,
    /// Bytes held by slot-map shards, free slots included.
    pub slot_bytes: usize,
    pub total_bytes: usize,
}

impl Registry {
    /// Estimate resident storage, columns plus slot maps.
    pub fn memory_stats(&self) -> MemoryStats {
        let mut component_bytes = 0;
        let mut handle_bytes = 0;
        for archetype in self.archetypes() {
            handle_bytes += archetype.number() * std::mem::size_of::<Handle>();
            for column in archetype.columns() {
                component_bytes += column.len() * column.element_size();
            }
        }
        let slot_bytes: usize = self
            .shards()
            .iter()
            .map(|shard| shard.capacity() * std::mem::size_of::<Slot>())
            .sum();
        MemoryStats {
            component_bytes,
            handle_bytes,
            slot_bytes,
            total_bytes: component_bytes + handle_bytes + slot_bytes,
        }
    }

    /// Print registry summary to console
    pub fn print(&self) {
        println!("=== Registry Summary ===");
        println!("Entities: {}", self.len());
        println!("Archetypes: {}", self.archetype_count());
        for (id, archetype) in self.archetypes().iter().enumerate() {
            let tags = archetype
                .signature()
                .iter()
                .filter(|key| key.is_tag())
                .count();
            println!(
                "Archetype {id}: hash {}, {} entities, {} components, {tags} tags",
                archetype.hash(),
                archetype.size(),
                archetype.component_count(),
            );
        }
        for (id, shard) in self.shards().iter().enumerate() {
            println!(
                "Shard {id}: {} live, {} slots",
                shard.len(),
                shard.capacity()
            );
        }
    }

    /// Check every structural invariant; returns the first violation.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(EcsError::ValidationFailed(msg));

        let mut total = 0;
        for (id, archetype) in self.archetypes().iter().enumerate() {
            if !archetype.check_aligned() {
                return fail(format!("archetype {id}: column lengths diverge"));
            }
            if signature_hash(archetype.signature()) != archetype.hash() {
                return fail(format!("archetype {id}: stored hash is stale"));
            }
            if self.archetype_index_of(archetype.hash()) != Some(id) {
                return fail(format!(
                    "archetype {id}: not indexed under its signature hash"
                ));
            }
            let invalid_rows = (0..archetype.number())
                .filter(|&row| !archetype.handle_at(row).is_valid())
                .count();
            if invalid_rows != archetype.number() - archetype.size() {
                return fail(format!(
                    "archetype {id}: gap list does not cover its invalid rows"
                ));
            }
            total += archetype.size();

            for row in 0..archetype.number() {
                let handle = archetype.handle_at(row);
                if !handle.is_valid() {
                    continue;
                }
                match self.location(handle) {
                    Some((arch, slot_row)) if arch == id && slot_row == row => {}
                    other => {
                        return fail(format!(
                            "archetype {id} row {row}: handle {handle:?} resolves to {other:?}"
                        ));
                    }
                }
            }
        }

        if total != self.len() {
            return fail(format!(
                "entity count {} != sum of archetype sizes {total}",
                self.len()
            ));
        }

        let mut live_slots = 0;
        for (shard_id, shard) in self.shards().iter().enumerate() {
            for (index, slot) in shard.iter() {
                let Slot { version, value } = slot;
                let SlotValue::Full(location) = value else {
                    continue;
                };
                live_slots += 1;
                let Some(archetype) = self.archetypes().get(location.archetype as usize) else {
                    return fail(format!(
                        "shard {shard_id} slot {index}: dangling archetype {}",
                        location.archetype
                    ));
                };
                let expected = Handle::new(index, *version, shard_id as u8);
                let stored = archetype.handle_at(location.row as usize);
                if stored != expected || stored.shard() != shard_id {
                    return fail(format!(
                        "shard {shard_id} slot {index}: row {} holds {stored:?}",
                        location.row
                    ));
                }
            }
        }
        if live_slots != self.len() {
            return fail(format!(
                "entity count {} != live slots {live_slots}",
                self.len()
            ));
        }

        Ok(())
    }
}
