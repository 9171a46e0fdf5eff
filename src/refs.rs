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

//! Safe re-resolving component references.
//!
//! A `Ref` survives registry calls that would invalidate a plain borrow:
//! it snapshots the entity's archetype and change counter and re-resolves
//! through the slot map when either moved. Losing the component entirely
//! is fatal on `resolve`, since silently surviving would mask
//! stale-reference bugs.

use std::marker::PhantomData;

use crate::component::Component;
use crate::entity::Handle;
use crate::error::Result;
use crate::registry::Registry;

/// Re-resolving reference to one entity's component of type `T`.
pub struct Ref<T: Component> {
    handle: Handle,
    archetype: u32,
    row: u32,
    counter: u64,
    _marker: PhantomData<fn() -> T>,
}

impl Registry {
    /// Build a safe reference to the entity's `T`, materialising the
    /// component like [`Registry::get`] when missing.
    pub fn get_ref<T: Component>(&mut self, handle: Handle) -> Result<Ref<T>> {
        self.get::<T>(handle)?;
        let location = self.resolve(handle)?;
        let counter = self.archetypes()[location.archetype as usize].change_counter();
        Ok(Ref {
            handle,
            archetype: location.archetype,
            row: location.row,
            counter,
            _marker: PhantomData,
        })
    }
}

impl<T: Component> Ref<T> {
    /// The referenced entity.
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Borrow the component, or `None` when the handle died or the entity
    /// no longer carries `T`. The snapshot refreshes on success.
    pub fn try_resolve<'r>(&mut self, registry: &'r Registry) -> Option<&'r T> {
        let location = registry.resolve(self.handle).ok()?;
        let archetype = &registry.archetypes()[location.archetype as usize];
        if location.archetype != self.archetype || archetype.change_counter() != self.counter {
            // The entity moved or rows shifted underneath: take the slot's
            // word for where it lives now.
            self.archetype = location.archetype;
            self.counter = archetype.change_counter();
        }
        self.row = location.row;
        archetype.get::<T>(self.row as usize)
    }

    /// Borrow the component.
    ///
    /// # Panics
    /// Panics when the handle no longer resolves or its archetype stopped
    /// carrying `T`.
    pub fn resolve<'r>(&mut self, registry: &'r Registry) -> &'r T {
        match self.try_resolve(registry) {
            Some(value) => value,
            None => panic!(
                "stale reference: {:?} no longer provides {}",
                self.handle,
                std::any::type_name::<T>()
            ),
        }
    }
}
