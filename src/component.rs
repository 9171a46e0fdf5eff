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

//! Component, Bundle and ComponentSet traits
//!
//! Components are data attached to entities. Bundles carry component
//! values into the registry; component sets name component types for
//! typed reads and views.

use std::any::TypeId;

use smallvec::{smallvec, SmallVec};

use crate::archetype::Archetype;
use crate::entity::TypeKey;

/// Maximum number of components supported by Bundle implementations
pub const MAX_BUNDLE_COMPONENTS: usize = 8;

/// Marker trait for components
///
/// `Clone` feeds row migration between archetypes; `Default` feeds the
/// fill-in path when a read materialises a missing component.
pub trait Component: 'static + Send + Sync + Clone + Default {}

/// Automatically implement Component for all valid types
impl<T: 'static + Send + Sync + Clone + Default> Component for T {}

/// Bundle of component values
///
/// Allows creating or updating entities with multiple components at once.
pub trait Bundle: 'static {
    /// Get type IDs of all components in the bundle
    fn type_ids() -> SmallVec<[TypeId; MAX_BUNDLE_COMPONENTS]>
    where
        Self: Sized;

    /// The same ids as signature keys
    fn type_keys() -> SmallVec<[TypeKey; MAX_BUNDLE_COMPONENTS]>
    where
        Self: Sized;

    /// Ensure component columns exist in an archetype
    fn register_columns(archetype: &mut Archetype)
    where
        Self: Sized;

    /// Append one value per component onto the archetype's columns
    fn push_values(self, archetype: &mut Archetype);

    /// Overwrite row `row` of each component's column
    fn put_values(self, archetype: &mut Archetype, row: usize);
}

// DO NOT implement Bundle for T: Component
// This conflicts with tuple implementations
// Instead, implement only for tuples

// Macro for tuple Bundle implementations
macro_rules! impl_bundle {
    ($($T:ident),*) => {
        impl<$($T: Component),*> Bundle for ($($T,)*) {
            fn type_ids() -> SmallVec<[TypeId; MAX_BUNDLE_COMPONENTS]> {
                smallvec![$(TypeId::of::<$T>()),*]
            }

            fn type_keys() -> SmallVec<[TypeKey; MAX_BUNDLE_COMPONENTS]> {
                smallvec![$(TypeKey::of::<$T>()),*]
            }

            fn register_columns(archetype: &mut Archetype) {
                $(archetype.register_component::<$T>();)*
            }

            #[allow(non_snake_case)]
            fn push_values(self, archetype: &mut Archetype) {
                let ($($T,)*) = self;
                $(archetype.push_value($T);)*
            }

            #[allow(non_snake_case)]
            fn put_values(self, archetype: &mut Archetype, row: usize) {
                let ($($T,)*) = self;
                $(archetype.put_value(row, $T);)*
            }
        }
    };
}

// Implement for tuples of 1-8 components
impl_bundle!(A);
impl_bundle!(A, B);
impl_bundle!(A, B, C);
impl_bundle!(A, B, C, D);
impl_bundle!(A, B, C, D, E);
impl_bundle!(A, B, C, D, E, F);
impl_bundle!(A, B, C, D, E, F, G);
impl_bundle!(A, B, C, D, E, F, G, H);

/// Set of component types, without values
///
/// Names the columns a typed read or a view pulls from an archetype.
pub trait ComponentSet<'a>: 'static {
    /// Tuple of references produced for one row
    type Refs;

    /// Get type IDs of all components in the set
    fn type_ids() -> SmallVec<[TypeId; MAX_BUNDLE_COMPONENTS]>;

    /// Ensure component columns exist in an archetype
    fn register_columns(archetype: &mut Archetype);

    /// Borrow one row. The archetype must carry every type in the set.
    fn fetch(archetype: &'a Archetype, row: usize) -> Self::Refs;
}

macro_rules! impl_component_set {
    ($($T:ident),*) => {
        impl<'a, $($T: Component),*> ComponentSet<'a> for ($($T,)*) {
            type Refs = ($(&'a $T,)*);

            fn type_ids() -> SmallVec<[TypeId; MAX_BUNDLE_COMPONENTS]> {
                smallvec![$(TypeId::of::<$T>()),*]
            }

            fn register_columns(archetype: &mut Archetype) {
                $(archetype.register_component::<$T>();)*
            }

            fn fetch(archetype: &'a Archetype, row: usize) -> Self::Refs {
                ($(archetype
                    .get::<$T>(row)
                    .expect("archetype matched a view without the column"),)*)
            }
        }
    };
}

impl_component_set!(A);
impl_component_set!(A, B);
impl_component_set!(A, B, C);
impl_component_set!(A, B, C, D);
impl_component_set!(A, B, C, D, E);
impl_component_set!(A, B, C, D, E, F);
impl_component_set!(A, B, C, D, E, F, G);
impl_component_set!(A, B, C, D, E, F, G, H);
