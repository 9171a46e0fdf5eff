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

//! Strata ECS - archetype entity registry
//!
//! Segmented columnar storage, sharded generational handles, tag-filtered
//! views with delayed compaction, and live JSON snapshots.

pub mod archetype;
pub mod component;
pub mod entity;
pub mod error;
pub mod inspect;
pub mod refs;
pub mod registry;
pub mod segvec;
pub mod view;

mod access;
mod column;
mod slots;
mod snapshot;

#[cfg(feature = "profiling")]
pub mod profiling;

// Re-exports for convenience
pub use archetype::{signature_hash, Archetype, Signature};
pub use component::{Bundle, Component, ComponentSet, MAX_BUNDLE_COMPONENTS};
pub use entity::{Handle, TagId, TypeKey};
pub use error::{EcsError, Result};
pub use inspect::MemoryStats;
pub use refs::Ref;
pub use registry::{Registry, RegistryConfig};
pub use segvec::{SegVec, DEFAULT_SEGMENT_BITS};
pub use view::{View, ViewCursor, ViewIter};
