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

//! Views: filtered iteration over archetypes.
//!
//! A view names required component types plus required and forbidden tag
//! sets. Evaluation is lazy: the matching archetypes and their row bounds
//! are snapshotted when iteration begins, so rows appended mid-iteration
//! are not visited. `ViewCursor` detaches from the registry borrow so the
//! loop body can mutate: erases under the cursor defer into the gap list
//! and compact once the cursor leaves the archetype.

use std::any::TypeId;
use std::marker::PhantomData;

use smallvec::SmallVec;

use crate::archetype::Archetype;
use crate::component::ComponentSet;
use crate::entity::{Handle, TagId, TypeKey};
use crate::registry::Registry;

fn matches_filter(
    archetype: &Archetype,
    required: &[TypeId],
    with_tags: &[TagId],
    without_tags: &[TagId],
) -> bool {
    !archetype.is_empty()
        && required
            .iter()
            .all(|&tid| archetype.contains(TypeKey::Component(tid)))
        && with_tags
            .iter()
            .all(|&tag| archetype.contains(TypeKey::Tag(tag)))
        && without_tags
            .iter()
            .all(|&tag| !archetype.contains(TypeKey::Tag(tag)))
}

/// Lazy iterable over entities carrying the component set `Q`.
pub struct View<'r, Q> {
    registry: &'r Registry,
    with_tags: SmallVec<[TagId; 4]>,
    without_tags: SmallVec<[TagId; 4]>,
    _marker: PhantomData<Q>,
}

impl Registry {
    /// Build a view over component set `Q`; filter tags with
    /// [`View::with_tags`] / [`View::without_tags`]. Nothing is evaluated
    /// until iteration begins.
    pub fn view<'r, Q: ComponentSet<'r>>(&'r self) -> View<'r, Q> {
        View {
            registry: self,
            with_tags: SmallVec::new(),
            without_tags: SmallVec::new(),
            _marker: PhantomData,
        }
    }
}

impl<'r, Q: ComponentSet<'r>> View<'r, Q> {
    /// Only visit entities carrying every one of `tags`.
    pub fn with_tags(mut self, tags: &[TagId]) -> Self {
        self.with_tags.extend_from_slice(tags);
        self
    }

    /// Skip entities carrying any of `tags`.
    pub fn without_tags(mut self, tags: &[TagId]) -> Self {
        self.without_tags.extend_from_slice(tags);
        self
    }

    /// Snapshot of matching archetypes and their current row bounds.
    fn matching(&self) -> Vec<(u32, u32)> {
        let required = Q::type_ids();
        self.registry
            .archetypes()
            .iter()
            .enumerate()
            .filter(|(_, archetype)| {
                matches_filter(archetype, &required, &self.with_tags, &self.without_tags)
            })
            .map(|(id, archetype)| (id as u32, archetype.number() as u32))
            .collect()
    }

    /// Begin iteration, yielding `(handle, component refs)` per row.
    pub fn iter(&self) -> ViewIter<'r, Q> {
        ViewIter {
            registry: self.registry,
            matched: self.matching(),
            arch_pos: 0,
            row: 0,
            _marker: PhantomData,
        }
    }

    /// Count matching entities without touching component data.
    pub fn count(&self) -> usize {
        let required = Q::type_ids();
        self.registry
            .archetypes()
            .iter()
            .filter(|archetype| {
                matches_filter(archetype, &required, &self.with_tags, &self.without_tags)
            })
            .map(Archetype::size)
            .sum()
    }

    /// Detach a cursor for iteration that tolerates structural mutation:
    /// the cursor holds no registry borrow and is driven with
    /// [`ViewCursor::next`].
    pub fn cursor(&self) -> ViewCursor {
        ViewCursor {
            matched: self.matching(),
            arch_pos: 0,
            row: 0,
        }
    }

    /// Visit every matching row from rayon worker threads, one task per
    /// archetype. Read-only: the shared registry borrow keeps structural
    /// operations out for the duration.
    #[cfg(feature = "parallel")]
    pub fn par_for_each<F>(&self, func: F)
    where
        F: Fn(Handle, Q::Refs) + Send + Sync,
    {
        use rayon::prelude::*;

        let matched = self.matching();
        matched.par_iter().for_each(|&(arch_id, bound)| {
            let archetype: &'r Archetype = &self.registry.archetypes()[arch_id as usize];
            let limit = (bound as usize).min(archetype.number());
            for row in 0..limit {
                let handle = archetype.handle_at(row);
                if !handle.is_valid() {
                    continue;
                }
                func(handle, Q::fetch(archetype, row));
            }
        });
    }
}

/// Read-path iterator produced by [`View::iter`].
pub struct ViewIter<'r, Q> {
    registry: &'r Registry,
    matched: Vec<(u32, u32)>,
    arch_pos: usize,
    row: u32,
    _marker: PhantomData<Q>,
}

impl<'r, Q: ComponentSet<'r>> Iterator for ViewIter<'r, Q> {
    type Item = (Handle, Q::Refs);

    fn next(&mut self) -> Option<Self::Item> {
        let registry: &'r Registry = self.registry;
        loop {
            let &(arch_id, bound) = self.matched.get(self.arch_pos)?;
            let archetype = &registry.archetypes()[arch_id as usize];
            let limit = bound.min(archetype.number() as u32);
            if self.row >= limit {
                self.arch_pos += 1;
                self.row = 0;
                continue;
            }
            let row = self.row as usize;
            self.row += 1;
            let handle = archetype.handle_at(row);
            if !handle.is_valid() {
                // Leftover gap; data is stale until the owning cursor
                // compacts it.
                continue;
            }
            return Some((handle, Q::fetch(archetype, row)));
        }
    }
}

/// Detached iteration cursor: yields handles while the loop body keeps the
/// `&mut Registry`.
///
/// The cursor publishes its position so that erases landing at or before
/// it defer into the archetype's gap list; leaving an archetype compacts
/// the gaps. Drive it to completion or call [`ViewCursor::finish`];
/// abandoning it mid-archetype leaves gaps pending until the next cursor
/// pass over that archetype.
pub struct ViewCursor {
    matched: Vec<(u32, u32)>,
    arch_pos: usize,
    row: u32,
}

impl ViewCursor {
    /// Advance to the next live row, skipping gaps. Clears the published
    /// cursor and compacts gaps whenever an archetype is left behind.
    pub fn next(&mut self, registry: &mut Registry) -> Option<Handle> {
        loop {
            let Some(&(arch_id, bound)) = self.matched.get(self.arch_pos) else {
                registry.set_active(None);
                return None;
            };
            let archetype = &registry.archetypes()[arch_id as usize];
            let limit = bound.min(archetype.number() as u32);
            if self.row >= limit {
                registry.set_active(None);
                registry.fill_gaps(arch_id as usize);
                self.arch_pos += 1;
                self.row = 0;
                continue;
            }
            let row = self.row;
            self.row += 1;
            let handle = archetype.handle_at(row as usize);
            if !handle.is_valid() {
                continue;
            }
            registry.set_active(Some((arch_id, row)));
            return Some(handle);
        }
    }

    /// Abort the iteration: clear the published cursor and compact every
    /// remaining matched archetype.
    pub fn finish(&mut self, registry: &mut Registry) {
        registry.set_active(None);
        while let Some(&(arch_id, _)) = self.matched.get(self.arch_pos) {
            registry.fill_gaps(arch_id as usize);
            self.arch_pos += 1;
        }
        self.row = 0;
    }
}
