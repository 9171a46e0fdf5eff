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

//! Archetype storage: parallel columns for one exact type set.
//!
//! Every entity whose signature is `{types}` lives in the one archetype
//! keyed by that set. All columns, including the implicit handle column,
//! stay the same length; rows leave by swap-with-last, or through the gap
//! list while a view iteration stands on the archetype.

use std::any::TypeId;
use std::hash::{Hash, Hasher};

use rustc_hash::{FxHashMap, FxHasher};
use serde_json::Value;
use smallvec::SmallVec;

use crate::column::{Column, TypedColumn};
use crate::component::{Bundle, Component};
use crate::entity::{Handle, TypeKey};
use crate::segvec::SegVec;

/// Component signature: sorted set of type keys
pub type Signature = SmallVec<[TypeKey; 8]>;

/// Commutative hash over a signature's elements. Permutations of the same
/// set produce the same value.
pub fn signature_hash(signature: &[TypeKey]) -> u64 {
    signature
        .iter()
        .map(|key| {
            let mut state = FxHasher::default();
            key.hash(&mut state);
            state.finish()
        })
        .fold(0u64, u64::wrapping_add)
}

/// Archetype: Structure of Arrays storage for one type set
pub struct Archetype {
    signature: Signature,
    hash: u64,
    /// Implicit column: the owning entity handle for every row.
    handles: SegVec<Handle>,
    columns: Vec<Box<dyn Column>>,
    column_index: FxHashMap<TypeId, usize>,
    /// Bumped on every structural modification.
    change_counter: u64,
    /// Rows logically erased while a view iteration stands here.
    gaps: Vec<u32>,
    segment_bits: u32,
}

impl Archetype {
    /// Create an empty archetype for `signature`. The set is sorted and
    /// de-duplicated; columns are registered separately.
    pub fn new(mut signature: Signature, segment_bits: u32) -> Self {
        signature.sort_unstable();
        signature.dedup();
        let hash = signature_hash(&signature);
        Self {
            signature,
            hash,
            handles: SegVec::with_segment_bits(segment_bits),
            columns: Vec::new(),
            column_index: FxHashMap::default(),
            change_counter: 0,
            gaps: Vec::new(),
            segment_bits,
        }
    }

    /// Get signature
    pub fn signature(&self) -> &[TypeKey] {
        &self.signature
    }

    /// Commutative hash of the signature; the key this archetype is stored
    /// under.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Live rows (physical rows minus pending gaps).
    pub fn size(&self) -> usize {
        self.handles.len() - self.gaps.len()
    }

    /// Physical rows, gaps included.
    pub fn number(&self) -> usize {
        self.handles.len()
    }

    /// Is empty
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Structural change counter; safe references snapshot this.
    pub fn change_counter(&self) -> u64 {
        self.change_counter
    }

    /// Whether `key` is part of this archetype's signature.
    pub fn contains(&self, key: TypeKey) -> bool {
        self.signature.binary_search(&key).is_ok()
    }

    /// Whether component type `T` has a column here.
    pub fn has_component<T: Component>(&self) -> bool {
        self.column_index.contains_key(&TypeId::of::<T>())
    }

    /// Number of component columns (tags carry none).
    pub fn component_count(&self) -> usize {
        self.columns.len()
    }

    /// Handle stored at `row`, or invalid when the row is a gap or out of
    /// bounds.
    pub fn handle_at(&self, row: usize) -> Handle {
        self.handles.get(row).copied().unwrap_or(Handle::INVALID)
    }

    /// Register component column
    pub fn register_component<T: Component>(&mut self) {
        let type_id = TypeId::of::<T>();
        debug_assert!(
            self.contains(TypeKey::Component(type_id)),
            "column registered for a type outside the signature"
        );
        if !self.column_index.contains_key(&type_id) {
            let idx = self.columns.len();
            self.columns
                .push(Box::new(TypedColumn::<T>::with_segment_bits(
                    self.segment_bits,
                )));
            self.column_index.insert(type_id, idx);
        }
    }

    /// Clone every column of `source` that this signature also names, as an
    /// empty column of the same concrete type.
    pub(crate) fn adopt_columns_from(&mut self, source: &Archetype) {
        for i in 0..self.signature.len() {
            let TypeKey::Component(type_id) = self.signature[i] else {
                continue;
            };
            if self.column_index.contains_key(&type_id) {
                continue;
            }
            if let Some(&src_idx) = source.column_index.get(&type_id) {
                let idx = self.columns.len();
                self.columns.push(source.columns[src_idx].clone_empty());
                self.column_index.insert(type_id, idx);
            }
        }
    }

    /// Append one value onto the column for `T`.
    pub(crate) fn push_value<T: Component>(&mut self, value: T) {
        let idx = *self
            .column_index
            .get(&TypeId::of::<T>())
            .expect("bundle type outside the archetype signature");
        self.columns[idx]
            .as_any_mut()
            .downcast_mut::<TypedColumn<T>>()
            .expect("column type mismatch")
            .push(value);
    }

    /// Overwrite row `row` of the column for `T`.
    pub(crate) fn put_value<T: Component>(&mut self, row: usize, value: T) {
        let idx = *self
            .column_index
            .get(&TypeId::of::<T>())
            .expect("put type outside the archetype signature");
        self.columns[idx]
            .as_any_mut()
            .downcast_mut::<TypedColumn<T>>()
            .expect("column type mismatch")
            .put(row, value)
            .expect("put row out of bounds");
    }

    /// Insert a full row: one value per component type in the signature.
    /// Returns the new row index.
    pub(crate) fn insert<B: Bundle>(&mut self, handle: Handle, bundle: B) -> usize {
        bundle.push_values(self);
        let row = self.handles.push(handle);
        debug_assert!(self.columns_aligned());
        row
    }

    /// Borrow component `T` at `row`.
    ///
    /// References stay valid until the next structural mutation; safe
    /// references re-validate against `change_counter`.
    pub fn get<T: Component>(&self, row: usize) -> Option<&T> {
        let idx = *self.column_index.get(&TypeId::of::<T>())?;
        self.columns[idx]
            .as_any()
            .downcast_ref::<TypedColumn<T>>()?
            .get(row)
    }

    /// Borrow component `T` at `row` mutably.
    pub fn get_mut<T: Component>(&mut self, row: usize) -> Option<&mut T> {
        let idx = *self.column_index.get(&TypeId::of::<T>())?;
        self.columns[idx]
            .as_any_mut()
            .downcast_mut::<TypedColumn<T>>()?
            .get_mut(row)
    }

    /// Remove `row` by swapping the last row over it in every column.
    /// Returns the handle that now occupies `row`, or invalid when `row`
    /// was the last row.
    pub(crate) fn collapse_row(&mut self, row: usize) -> Handle {
        for column in &mut self.columns {
            column.swap_remove_row(row);
        }
        self.handles.swap_remove(row);
        self.change_counter += 1;
        if row < self.handles.len() {
            self.handles[row]
        } else {
            Handle::INVALID
        }
    }

    /// Logically erase `row` without moving any data: the handle entry is
    /// invalidated so iterators skip it, and the index joins the gap list
    /// until the active iteration over this archetype finishes.
    pub(crate) fn defer_erase(&mut self, row: usize) {
        debug_assert!(row < self.handles.len(), "gap row out of bounds");
        self.handles[row] = Handle::INVALID;
        self.gaps.push(row as u32);
        self.change_counter += 1;
    }

    /// Drain the gap list, largest row first, ready for collapse.
    pub(crate) fn take_gaps(&mut self) -> Vec<u32> {
        self.gaps.sort_unstable_by(|a, b| b.cmp(a));
        std::mem::take(&mut self.gaps)
    }

    pub(crate) fn has_gaps(&self) -> bool {
        !self.gaps.is_empty()
    }

    /// Migrate `source_row` out of `source` into this archetype: per
    /// component type, copy the row when `source` has the column, append a
    /// default otherwise, then collapse the source row. Returns the new row
    /// here and the handle that moved inside `source` (for slot re-mapping).
    pub(crate) fn move_from(
        &mut self,
        source: &mut Archetype,
        source_row: usize,
    ) -> (usize, Handle) {
        for i in 0..self.signature.len() {
            let TypeKey::Component(type_id) = self.signature[i] else {
                continue;
            };
            let dst_idx = self.column_index[&type_id];
            match source.column_index.get(&type_id) {
                Some(&src_idx) => {
                    let (dst, src) = (&mut self.columns[dst_idx], &source.columns[src_idx]);
                    dst.copy_push_from(src.as_ref(), source_row);
                }
                None => self.columns[dst_idx].push_default(),
            }
        }
        let handle = source.handles[source_row];
        let row = self.handles.push(handle);
        let moved = source.collapse_row(source_row);
        self.change_counter += 1;
        debug_assert!(self.columns_aligned());
        (row, moved)
    }

    /// Drop every row of every column; the signature and column structure
    /// survive.
    pub fn clear(&mut self) {
        for column in &mut self.columns {
            column.clear();
        }
        self.handles.clear();
        self.gaps.clear();
        self.change_counter += 1;
    }

    /// Snapshot form of one row.
    pub(crate) fn row_json(&self, row: usize) -> Value {
        let handle = self.handle_at(row);
        let values: Vec<Value> = self
            .columns
            .iter()
            .map(|column| column.value_json(row))
            .collect();
        serde_json::json!({
            "index": handle.index(),
            "version": handle.version(),
            "stgindex": handle.shard(),
            "value": handle.bits(),
            "values": values,
        })
    }

    pub(crate) fn columns(&self) -> &[Box<dyn Column>] {
        &self.columns
    }

    fn columns_aligned(&self) -> bool {
        self.columns
            .iter()
            .all(|column| column.len() == self.handles.len())
    }

    /// Whether every column, handle column included, has equal length.
    pub(crate) fn check_aligned(&self) -> bool {
        self.columns_aligned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::TagId;
    use smallvec::smallvec;

    fn archetype_of<B: Bundle>(tags: &[TagId]) -> Archetype {
        let mut signature: Signature = B::type_keys().into_iter().collect();
        signature.extend(tags.iter().copied().map(TypeKey::Tag));
        let mut arch = Archetype::new(signature, 2);
        B::register_columns(&mut arch);
        arch
    }

    fn handle(index: u32) -> Handle {
        Handle::new(index, 0, 0)
    }

    #[test]
    fn signature_hash_is_permutation_invariant() {
        let a: Signature = smallvec![TypeKey::of::<u32>(), TypeKey::of::<f32>()];
        let b: Signature = smallvec![TypeKey::of::<f32>(), TypeKey::of::<u32>()];
        assert_eq!(signature_hash(&a), signature_hash(&b));

        let c: Signature = smallvec![TypeKey::of::<u32>()];
        assert_ne!(signature_hash(&a), signature_hash(&c));
    }

    #[test]
    fn insert_keeps_columns_aligned() {
        let mut arch = archetype_of::<(u32, f32)>(&[]);
        let row = arch.insert(handle(0), (7u32, 2.5f32));
        assert_eq!(row, 0);
        assert_eq!(arch.size(), 1);
        assert_eq!(arch.get::<u32>(0), Some(&7));
        assert_eq!(arch.get::<f32>(0), Some(&2.5));
        assert!(arch.check_aligned());
    }

    #[test]
    fn collapse_swaps_last_row_in() {
        let mut arch = archetype_of::<(u32,)>(&[]);
        arch.insert(handle(0), (10u32,));
        arch.insert(handle(1), (11u32,));
        arch.insert(handle(2), (12u32,));

        let moved = arch.collapse_row(0);
        assert_eq!(moved, handle(2));
        assert_eq!(arch.get::<u32>(0), Some(&12));
        assert_eq!(arch.size(), 2);

        // Collapsing the last row pops without a swap.
        let moved = arch.collapse_row(1);
        assert!(!moved.is_valid());
        assert_eq!(arch.size(), 1);
    }

    #[test]
    fn deferred_erase_leaves_data_in_place() {
        let mut arch = archetype_of::<(u32,)>(&[]);
        for i in 0..4u32 {
            arch.insert(handle(i), (i,));
        }
        arch.defer_erase(1);
        assert_eq!(arch.number(), 4);
        assert_eq!(arch.size(), 3);
        assert!(!arch.handle_at(1).is_valid());
        // The data column is untouched until the gap collapses.
        assert_eq!(arch.get::<u32>(1), Some(&1));

        let gaps = arch.take_gaps();
        assert_eq!(gaps, vec![1]);
        assert!(!arch.has_gaps());
    }

    #[test]
    fn move_fills_missing_columns_with_defaults() {
        let mut src = archetype_of::<(u32,)>(&[]);
        src.insert(handle(0), (41u32,));
        src.insert(handle(1), (42u32,));

        let mut dst = archetype_of::<(u32, bool)>(&[]);
        let (row, moved_in_src) = dst.move_from(&mut src, 0);
        assert_eq!(row, 0);
        assert_eq!(moved_in_src, handle(1));
        assert_eq!(dst.get::<u32>(0), Some(&41));
        assert_eq!(dst.get::<bool>(0), Some(&false));
        assert_eq!(src.size(), 1);
        assert!(dst.check_aligned());
        assert!(src.check_aligned());
    }

    #[test]
    fn tags_join_signature_without_columns() {
        let arch = archetype_of::<(u32,)>(&[TagId(5)]);
        assert!(arch.contains(TypeKey::Tag(TagId(5))));
        assert!(arch.contains(TypeKey::of::<u32>()));
        assert_eq!(arch.component_count(), 1);
    }

    #[test]
    fn clear_bumps_change_counter() {
        let mut arch = archetype_of::<(u32,)>(&[]);
        arch.insert(handle(0), (1u32,));
        let before = arch.change_counter();
        arch.clear();
        assert!(arch.change_counter() > before);
        assert_eq!(arch.size(), 0);
        assert!(arch.contains(TypeKey::of::<u32>()));
    }
}
