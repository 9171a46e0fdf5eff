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

//! Registry: central entity and archetype storage
//!
//! The registry creates entities, resolves handles through the slot-map
//! shards, forges archetypes per component signature and migrates entities
//! between archetypes on schema change.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use ahash::AHashMap;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::archetype::{signature_hash, Archetype, Signature};
use crate::component::{Bundle, Component, ComponentSet};
use crate::entity::{Handle, TagId, TypeKey};
use crate::error::{EcsError, Result};
use crate::segvec::DEFAULT_SEGMENT_BITS;
use crate::slots::{Location, Shard};

/// Storage parameters, fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    /// Slot-map fan-out; must be a power of two, at most 256.
    pub shards: usize,
    /// Segment size exponent for every segmented container.
    pub segment_bits: u32,
    /// Slots pre-linked into each shard's free chain.
    pub initial_slots: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            shards: if cfg!(feature = "parallel") { 16 } else { 1 },
            segment_bits: DEFAULT_SEGMENT_BITS,
            initial_slots: 64,
        }
    }
}

const ACTIVE_NONE: u64 = u64::MAX;

/// Central ECS registry
///
/// Holds all archetypes, the sharded slot map and the iteration cursor
/// state. Structural operations take `&mut self`; reads are shared.
pub struct Registry {
    /// All archetypes, append-only; slots address them by index.
    archetypes: Vec<Archetype>,

    /// Maps commutative signature hashes to archetype indices.
    archetype_index: AHashMap<u64, usize>,

    /// Slot-map shards; a handle's shard field routes here.
    shards: Vec<Shard>,

    /// Total live entities.
    size: usize,

    /// Round-robin cursor spreading new slots across shards.
    alloc_cursor: AtomicUsize,

    /// Packed `(archetype << 32 | row)` the active view cursor stands on,
    /// or `ACTIVE_NONE`. Erases at or before this row defer into the gap
    /// list instead of collapsing.
    active: AtomicU64,

    config: RegistryConfig,
}

impl Registry {
    /// Create a registry with the default configuration (one shard, or 16
    /// with the `parallel` feature).
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a registry with explicit storage parameters.
    ///
    /// # Panics
    /// Panics if the shard count is not a power of two in `1..=256`.
    pub fn with_config(config: RegistryConfig) -> Self {
        assert!(
            config.shards.is_power_of_two() && config.shards <= 256,
            "shard count must be a power of two in 1..=256"
        );
        let shards = (0..config.shards)
            .map(|_| Shard::new(config.segment_bits, config.initial_slots))
            .collect();
        Self {
            archetypes: Vec::with_capacity(64),
            archetype_index: AHashMap::with_capacity(64),
            shards,
            size: 0,
            alloc_cursor: AtomicUsize::new(0),
            active: AtomicU64::new(ACTIVE_NONE),
            config,
        }
    }

    /// Total live entities.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Is empty
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of forged archetypes.
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// All archetypes, in creation order.
    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    pub(crate) fn shards(&self) -> &[Shard] {
        &self.shards
    }

    pub(crate) fn archetype_index_of(&self, hash: u64) -> Option<usize> {
        self.archetype_index.get(&hash).copied()
    }

    /// Create an entity from a bundle of component values and return its
    /// handle.
    pub fn insert<B: Bundle>(&mut self, bundle: B) -> Handle {
        #[cfg(feature = "profiling")]
        let span = info_span!(
            "registry.insert",
            bundle_components = B::type_ids().len(),
            archetype_count = self.archetypes.len()
        );
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        let keys = B::type_keys();
        debug_assert!(
            {
                let mut sorted = keys.clone();
                sorted.sort_unstable();
                sorted.windows(2).all(|w| w[0] != w[1])
            },
            "bundle repeats a component type"
        );

        let arch_id = self.archetype_for(keys.into_iter().collect(), None, |archetype| {
            B::register_columns(archetype);
        });
        let shard_id = self.next_shard();
        // Claim the slot first so the handle can ride along in the handle
        // column; the final row lands in the slot right after the push.
        let (index, version) = self.shards[shard_id].insert(Location {
            archetype: arch_id as u32,
            row: 0,
        });
        let handle = Handle::new(index, version, shard_id as u8);
        let row = self.archetypes[arch_id].insert(handle, bundle);
        self.shards[shard_id].set_location(
            index,
            Location {
                archetype: arch_id as u32,
                row: row as u32,
            },
        );
        self.size += 1;
        handle
    }

    /// Create many entities sharing one bundle type. The archetype is
    /// forged once up front.
    pub fn insert_batch<B, I>(&mut self, bundles: I) -> Result<Vec<Handle>>
    where
        B: Bundle,
        I: IntoIterator<Item = B>,
        I::IntoIter: ExactSizeIterator,
    {
        let bundles = bundles.into_iter();
        if bundles.len() > 10_000_000 {
            return Err(EcsError::BatchTooLarge);
        }
        let arch_id = self.archetype_for(B::type_keys().into_iter().collect(), None, |archetype| {
            B::register_columns(archetype);
        });
        let mut handles = Vec::with_capacity(bundles.len());
        for bundle in bundles {
            let shard_id = self.next_shard();
            let (index, version) = self.shards[shard_id].insert(Location {
                archetype: arch_id as u32,
                row: 0,
            });
            let handle = Handle::new(index, version, shard_id as u8);
            let row = self.archetypes[arch_id].insert(handle, bundle);
            self.shards[shard_id].set_location(
                index,
                Location {
                    archetype: arch_id as u32,
                    row: row as u32,
                },
            );
            self.size += 1;
            handles.push(handle);
        }
        Ok(handles)
    }

    /// Whether `handle` names a live entity.
    pub fn exists(&self, handle: Handle) -> bool {
        self.resolve(handle).is_ok()
    }

    /// Whether the entity carries component type `T`. False for dead
    /// handles.
    pub fn has<T: Component>(&self, handle: Handle) -> bool {
        self.resolve(handle)
            .map(|loc| self.archetypes[loc.archetype as usize].has_component::<T>())
            .unwrap_or(false)
    }

    /// Whether the entity carries `tag`. False for dead handles.
    pub fn has_tag(&self, handle: Handle, tag: TagId) -> bool {
        self.resolve(handle)
            .map(|loc| self.archetypes[loc.archetype as usize].contains(TypeKey::Tag(tag)))
            .unwrap_or(false)
    }

    /// The entity's current signature.
    pub fn types(&self, handle: Handle) -> Result<Vec<TypeKey>> {
        let location = self.resolve(handle)?;
        Ok(self.archetypes[location.archetype as usize]
            .signature()
            .to_vec())
    }

    /// Current `(archetype index, row)` of the entity. Rows shift on
    /// structural changes; this is a diagnostic observation, not a stable
    /// address.
    pub fn location(&self, handle: Handle) -> Option<(usize, usize)> {
        self.resolve(handle)
            .ok()
            .map(|loc| (loc.archetype as usize, loc.row as usize))
    }

    /// Borrow component `T` of the entity.
    ///
    /// When the entity does not carry `T` yet it is moved into the
    /// neighbouring archetype extending its signature with `T`, with a
    /// default value filled in, and the reference points there.
    pub fn get<T: Component>(&mut self, handle: Handle) -> Result<&T> {
        let location = self.ensure_components(handle, &[TypeKey::of::<T>()], |archetype| {
            archetype.register_component::<T>();
        })?;
        Ok(self.archetypes[location.archetype as usize]
            .get::<T>(location.row as usize)
            .expect("component ensured by the move above"))
    }

    /// Borrow component `T` of the entity mutably, materialising it like
    /// [`Registry::get`] when missing.
    pub fn get_mut<T: Component>(&mut self, handle: Handle) -> Result<&mut T> {
        let location = self.ensure_components(handle, &[TypeKey::of::<T>()], |archetype| {
            archetype.register_component::<T>();
        })?;
        Ok(self.archetypes[location.archetype as usize]
            .get_mut::<T>(location.row as usize)
            .expect("component ensured by the move above"))
    }

    /// Borrow several components at once. Missing types are materialised
    /// with exactly one archetype move for the whole union.
    pub fn get_all<'r, Q: ComponentSet<'r>>(&'r mut self, handle: Handle) -> Result<Q::Refs> {
        let keys: Signature = Q::type_ids()
            .into_iter()
            .map(TypeKey::Component)
            .collect();
        let location = self.ensure_components(handle, &keys, |archetype| {
            Q::register_columns(archetype);
        })?;
        let archetype: &'r Archetype = &self.archetypes[location.archetype as usize];
        Ok(Q::fetch(archetype, location.row as usize))
    }

    /// Write component values. In place when the entity already carries all
    /// the bundle's types, otherwise move-then-write.
    pub fn put<B: Bundle>(&mut self, handle: Handle, values: B) -> Result<()> {
        let location = self.ensure_components(handle, &B::type_keys(), |archetype| {
            B::register_columns(archetype);
        })?;
        values.put_values(
            &mut self.archetypes[location.archetype as usize],
            location.row as usize,
        );
        Ok(())
    }

    /// Attach tags; a no-op for tags already present.
    pub fn add_tags(&mut self, handle: Handle, tags: &[TagId]) -> Result<()> {
        let location = self.resolve(handle)?;
        let mut signature: Signature = self.archetypes[location.archetype as usize]
            .signature()
            .iter()
            .copied()
            .collect();
        signature.extend(tags.iter().copied().map(TypeKey::Tag));
        let dest = self.archetype_for(signature, Some(location.archetype as usize), |_| {});
        self.move_entity(handle, location, dest);
        Ok(())
    }

    /// Detach tags; tags the entity does not carry are ignored.
    pub fn erase_tags(&mut self, handle: Handle, tags: &[TagId]) -> Result<()> {
        let location = self.resolve(handle)?;
        let signature: Signature = self.archetypes[location.archetype as usize]
            .signature()
            .iter()
            .copied()
            .filter(|key| !matches!(key, TypeKey::Tag(tag) if tags.contains(tag)))
            .collect();
        let dest = self.archetype_for(signature, Some(location.archetype as usize), |_| {});
        self.move_entity(handle, location, dest);
        Ok(())
    }

    /// Strip the bundle's component types from the entity.
    ///
    /// The entity must carry every named type; `ComponentNotFound`
    /// otherwise.
    pub fn remove<B: Bundle>(&mut self, handle: Handle) -> Result<()> {
        let location = self.resolve(handle)?;
        let keys = B::type_keys();
        let archetype = &self.archetypes[location.archetype as usize];
        if !keys.iter().all(|key| archetype.contains(*key)) {
            return Err(EcsError::ComponentNotFound);
        }
        let signature: Signature = archetype
            .signature()
            .iter()
            .copied()
            .filter(|key| !keys.contains(key))
            .collect();
        let dest = self.archetype_for(signature, Some(location.archetype as usize), |_| {});
        self.move_entity(handle, location, dest);
        Ok(())
    }

    /// Destroy the entity. Its row collapses by swap-with-last, or joins
    /// the archetype's gap list when a view cursor stands at or past it.
    pub fn erase(&mut self, handle: Handle) -> Result<()> {
        #[cfg(feature = "profiling")]
        let span = info_span!("registry.erase", entity_count = self.size);
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        let location = self.resolve(handle)?;
        let arch_id = location.archetype as usize;
        let deferred = matches!(
            self.active(),
            Some((active_arch, active_row))
                if active_arch as usize == arch_id && location.row <= active_row
        );
        let archetype = &mut self.archetypes[arch_id];
        if deferred {
            archetype.defer_erase(location.row as usize);
        } else {
            let moved = archetype.collapse_row(location.row as usize);
            if moved.is_valid() {
                self.shards[moved.shard()].set_location(moved.index(), location);
            }
        }
        // The logical erase is immediate either way: the slot frees and the
        // version bump kills the handle now.
        self.shards[handle.shard()].erase(handle.index());
        self.size -= 1;
        Ok(())
    }

    /// Drop every entity. Archetypes survive emptied; slot versions are
    /// preserved so pre-clear handles stay dead.
    pub fn clear(&mut self) {
        for archetype in &mut self.archetypes {
            archetype.clear();
        }
        for shard in &mut self.shards {
            shard.clear();
        }
        self.size = 0;
        self.set_active(None);
    }

    // ========== Internal plumbing ==========

    pub(crate) fn resolve(&self, handle: Handle) -> Result<Location> {
        if !handle.is_valid() {
            return Err(EcsError::EntityNotFound);
        }
        self.shards
            .get(handle.shard())
            .and_then(|shard| shard.resolve(handle))
            .ok_or(EcsError::EntityNotFound)
    }

    fn next_shard(&self) -> usize {
        self.alloc_cursor.fetch_add(1, Ordering::Relaxed) & (self.shards.len() - 1)
    }

    pub(crate) fn active(&self) -> Option<(u32, u32)> {
        let packed = self.active.load(Ordering::Relaxed);
        if packed == ACTIVE_NONE {
            None
        } else {
            Some(((packed >> 32) as u32, packed as u32))
        }
    }

    pub(crate) fn set_active(&self, cursor: Option<(u32, u32)>) {
        let packed = match cursor {
            Some((archetype, row)) => (u64::from(archetype) << 32) | u64::from(row),
            None => ACTIVE_NONE,
        };
        self.active.store(packed, Ordering::Relaxed);
    }

    /// Look up or forge the archetype for `signature`. A parent contributes
    /// empty clones of the columns both signatures name; `on_create`
    /// registers columns for types the parent does not cover. Signatures
    /// de-duplicate by commutative hash, so every path to the same type set
    /// converges on one archetype.
    pub(crate) fn archetype_for<F>(
        &mut self,
        mut signature: Signature,
        parent: Option<usize>,
        on_create: F,
    ) -> usize
    where
        F: FnOnce(&mut Archetype),
    {
        signature.sort_unstable();
        signature.dedup();
        let hash = signature_hash(&signature);
        if let Some(&id) = self.archetype_index.get(&hash) {
            debug_assert_eq!(
                self.archetypes[id].signature(),
                &signature[..],
                "signature hash collision"
            );
            return id;
        }

        let mut archetype = Archetype::new(signature, self.config.segment_bits);
        if let Some(parent) = parent {
            archetype.adopt_columns_from(&self.archetypes[parent]);
        }
        on_create(&mut archetype);

        self.archetypes.push(archetype);
        let id = self.archetypes.len() - 1;
        self.archetype_index.insert(hash, id);
        id
    }

    /// Move the entity to the archetype that carries every key in `wanted`,
    /// forging it if needed. No-op when the current archetype already does.
    fn ensure_components<F>(
        &mut self,
        handle: Handle,
        wanted: &[TypeKey],
        register: F,
    ) -> Result<Location>
    where
        F: FnOnce(&mut Archetype),
    {
        let location = self.resolve(handle)?;
        let archetype = &self.archetypes[location.archetype as usize];
        if wanted.iter().all(|key| archetype.contains(*key)) {
            return Ok(location);
        }
        let mut signature: Signature = archetype.signature().iter().copied().collect();
        signature.extend_from_slice(wanted);
        let dest = self.archetype_for(signature, Some(location.archetype as usize), register);
        Ok(self.move_entity(handle, location, dest))
    }

    /// Migrate one entity between archetypes, re-pointing its slot and the
    /// slot of whichever row got swapped into its old place.
    fn move_entity(&mut self, handle: Handle, from: Location, dest: usize) -> Location {
        let from_arch = from.archetype as usize;
        if from_arch == dest {
            return from;
        }
        let (source, target) = index_pair(&mut self.archetypes, from_arch, dest);
        let (new_row, moved) = target.move_from(source, from.row as usize);
        if moved.is_valid() {
            self.shards[moved.shard()].set_location(moved.index(), from);
        }
        let to = Location {
            archetype: dest as u32,
            row: new_row as u32,
        };
        self.shards[handle.shard()].set_location(handle.index(), to);
        to
    }

    /// Collapse the archetype's pending gaps, largest row first. Called by
    /// view cursors once they leave an archetype; the iteration cursor must
    /// be cleared beforehand so the erases collapse normally.
    pub(crate) fn fill_gaps(&mut self, arch_id: usize) {
        debug_assert!(
            self.active().is_none(),
            "gap fill with an active iteration cursor"
        );
        if !self.archetypes[arch_id].has_gaps() {
            return;
        }
        let gaps = self.archetypes[arch_id].take_gaps();
        for gap in gaps {
            let moved = self.archetypes[arch_id].collapse_row(gap as usize);
            if moved.is_valid() {
                self.shards[moved.shard()].set_location(
                    moved.index(),
                    Location {
                        archetype: arch_id as u32,
                        row: gap,
                    },
                );
            }
        }
    }
}

/// Borrow two distinct archetypes mutably.
fn index_pair(archetypes: &mut [Archetype], a: usize, b: usize) -> (&mut Archetype, &mut Archetype) {
    debug_assert_ne!(a, b);
    if a < b {
        let (left, right) = archetypes.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = archetypes.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_read_back() {
        let mut registry = Registry::new();
        let h = registry.insert((7u32, 2.5f32));
        assert!(registry.exists(h));
        assert_eq!(registry.get::<u32>(h), Ok(&7));
        assert_eq!(registry.get::<f32>(h), Ok(&2.5));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn signatures_deduplicate_by_permutation() {
        let mut registry = Registry::new();
        let a = registry.insert((1u32, 1.0f32));
        let b = registry.insert((2.0f32, 2u32));
        assert_eq!(
            registry.location(a).map(|(arch, _)| arch),
            registry.location(b).map(|(arch, _)| arch)
        );
        assert_eq!(registry.archetype_count(), 1);
    }

    #[test]
    fn get_materialises_missing_components() {
        let mut registry = Registry::new();
        let h = registry.insert((1u32,));
        // bool is absent: the entity moves and a default fills in.
        assert_eq!(registry.get::<bool>(h), Ok(&false));
        assert!(registry.has::<bool>(h));
        assert!(registry.has::<u32>(h));
        assert_eq!(registry.archetype_count(), 2);
    }

    #[test]
    fn put_moves_then_writes() {
        let mut registry = Registry::new();
        let h = registry.insert((1u32,));
        registry.put(h, (true,)).unwrap();
        assert_eq!(registry.get::<bool>(h), Ok(&true));
        assert_eq!(registry.get::<u32>(h), Ok(&1));
    }

    #[test]
    fn remove_requires_presence() {
        let mut registry = Registry::new();
        let h = registry.insert((1u32,));
        assert_eq!(registry.remove::<(bool,)>(h), Err(EcsError::ComponentNotFound));
        registry.remove::<(u32,)>(h).unwrap();
        assert!(!registry.has::<u32>(h));
        assert!(registry.exists(h));
    }

    #[test]
    fn erase_repoints_swapped_row() {
        let mut registry = Registry::new();
        let a = registry.insert((10u32,));
        let b = registry.insert((20u32,));
        let c = registry.insert((30u32,));
        let b_row = registry.location(b).unwrap().1;

        registry.erase(b).unwrap();
        assert!(!registry.exists(b));
        assert_eq!(registry.get::<u32>(a), Ok(&10));
        assert_eq!(registry.get::<u32>(c), Ok(&30));
        assert_eq!(registry.location(c).unwrap().1, b_row);
    }

    #[test]
    fn handle_reuse_separates_versions() {
        // One shard so the second insert reuses the freed slot.
        let mut registry = Registry::with_config(RegistryConfig {
            shards: 1,
            ..RegistryConfig::default()
        });
        let h1 = registry.insert((1u32,));
        registry.erase(h1).unwrap();
        let h2 = registry.insert((2u32,));
        assert_eq!(h2.index(), h1.index());
        assert_ne!(h2.version(), h1.version());
        assert!(!registry.exists(h1));
        assert!(registry.exists(h2));
    }

    #[test]
    fn tags_move_entities_between_archetypes() {
        let mut registry = Registry::new();
        const RED: TagId = TagId(1);
        let h = registry.insert((1u32,));
        let plain_arch = registry.location(h).unwrap().0;

        registry.add_tags(h, &[RED]).unwrap();
        assert!(registry.has_tag(h, RED));
        assert_ne!(registry.location(h).unwrap().0, plain_arch);
        assert_eq!(registry.get::<u32>(h), Ok(&1));

        registry.erase_tags(h, &[RED]).unwrap();
        assert!(!registry.has_tag(h, RED));
        assert_eq!(registry.location(h).unwrap().0, plain_arch);
    }

    #[test]
    fn clear_empties_everything() {
        let mut registry = Registry::new();
        let handles: Vec<_> = (0..10u32).map(|i| registry.insert((i,))).collect();
        registry.clear();
        assert_eq!(registry.len(), 0);
        for h in handles {
            assert!(!registry.exists(h));
        }
        // Storage is reusable after a clear.
        let h = registry.insert((1u32,));
        assert!(registry.exists(h));
    }

    #[test]
    fn batch_insert_lands_in_one_archetype() {
        let mut registry = Registry::new();
        let handles = registry
            .insert_batch((0..100u32).map(|i| (i, i as f32)).collect::<Vec<_>>())
            .unwrap();
        assert_eq!(handles.len(), 100);
        assert_eq!(registry.len(), 100);
        assert_eq!(registry.archetype_count(), 1);
    }

    #[test]
    fn shards_round_robin() {
        let mut registry = Registry::with_config(RegistryConfig {
            shards: 4,
            ..RegistryConfig::default()
        });
        let handles: Vec<_> = (0..8u32).map(|i| registry.insert((i,))).collect();
        for (i, h) in handles.iter().enumerate() {
            assert_eq!(h.shard(), i % 4);
        }
    }
}
