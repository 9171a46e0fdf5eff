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

//! Snapshot and live-view JSON production.
//!
//! The registry serialises its state for the diagnostic endpoint; the wire
//! framing and transport live outside this crate. Numeric component ids
//! are assigned per registry in first-seen column order, so they are
//! stable for the life of the process but not across runs.

use std::any::TypeId;

use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::Value;

use crate::column::Column;
use crate::entity::{Handle, TypeKey};
use crate::error::{EcsError, Result};
use crate::registry::Registry;

#[derive(Serialize)]
struct SnapshotDoc {
    cmd: &'static str,
    entities: usize,
    archetypes: Vec<SnapshotArchetype>,
}

#[derive(Serialize)]
struct SnapshotArchetype {
    /// Decimal form of the signature hash, for clients that treat it as an
    /// opaque key.
    hash: String,
    archetype: ArchetypeDoc,
}

#[derive(Serialize)]
struct ArchetypeDoc {
    hash: u64,
    /// Ordered component and tag ids.
    types: Vec<u64>,
    /// Component columns only: mangled name plus numeric id.
    maps: Vec<TypeMapEntry>,
    entities: Vec<Value>,
}

#[derive(Serialize)]
struct TypeMapEntry {
    name: &'static str,
    id: u64,
}

#[derive(Serialize)]
struct LiveViewDoc {
    cmd: &'static str,
    entities: usize,
    #[serde(rename = "avgComp")]
    avg_comp: f64,
    #[serde(rename = "estSize")]
    est_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    watched: Option<Vec<WatchedDoc>>,
}

#[derive(Serialize)]
struct WatchedDoc {
    entity: u64,
    /// `None` serialises as `null` and signals deletion.
    values: Option<Vec<Value>>,
}

fn to_string<T: Serialize>(doc: &T) -> Result<String> {
    serde_json::to_string(doc).map_err(|e| EcsError::SerializationError(e.to_string()))
}

impl Registry {
    /// Numeric ids for every component type any archetype stores, assigned
    /// in first-seen order over the append-only archetype list.
    fn component_ids(&self) -> FxHashMap<TypeId, u64> {
        let mut ids = FxHashMap::default();
        let mut next = 0u64;
        for archetype in self.archetypes() {
            for column in archetype.columns() {
                ids.entry(column.type_id_of()).or_insert_with(|| {
                    let id = next;
                    next += 1;
                    id
                });
            }
        }
        ids
    }

    fn numeric_key(key: TypeKey, ids: &FxHashMap<TypeId, u64>) -> u64 {
        match key {
            TypeKey::Component(tid) => ids.get(&tid).copied().unwrap_or(u64::MAX),
            TypeKey::Tag(tag) => tag.0,
        }
    }

    /// Full state snapshot under the diagnostic JSON contract.
    pub fn snapshot(&self) -> Result<String> {
        let ids = self.component_ids();
        let archetypes = self
            .archetypes()
            .iter()
            .map(|archetype| {
                let types = archetype
                    .signature()
                    .iter()
                    .map(|&key| Self::numeric_key(key, &ids))
                    .collect();
                let maps = archetype
                    .columns()
                    .iter()
                    .map(|column| TypeMapEntry {
                        name: column.type_name(),
                        id: ids.get(&column.type_id_of()).copied().unwrap_or(u64::MAX),
                    })
                    .collect();
                let entities = (0..archetype.number())
                    .filter(|&row| archetype.handle_at(row).is_valid())
                    .map(|row| archetype.row_json(row))
                    .collect();
                SnapshotArchetype {
                    hash: archetype.hash().to_string(),
                    archetype: ArchetypeDoc {
                        hash: archetype.hash(),
                        types,
                        maps,
                        entities,
                    },
                }
            })
            .collect();
        to_string(&SnapshotDoc {
            cmd: "snapshot",
            entities: self.len(),
            archetypes,
        })
    }

    /// Snapshot form of a single entity row.
    pub fn to_json(&self, handle: Handle) -> Result<String> {
        let location = self.resolve(handle)?;
        let row = self.archetypes()[location.archetype as usize].row_json(location.row as usize);
        to_string(&row)
    }

    /// Live-view summary, with per-entity column values for each watched
    /// handle; a deleted entity reports `values: null`.
    pub fn liveview(&self, watched: &[Handle]) -> Result<String> {
        let entities = self.len();
        let component_values: usize = self
            .archetypes()
            .iter()
            .map(|archetype| archetype.size() * archetype.component_count())
            .sum();
        let avg_comp = if entities == 0 {
            0.0
        } else {
            component_values as f64 / entities as f64
        };
        let watched = if watched.is_empty() {
            None
        } else {
            Some(
                watched
                    .iter()
                    .map(|&handle| {
                        let values = self.resolve(handle).ok().map(|location| {
                            let archetype = &self.archetypes()[location.archetype as usize];
                            archetype
                                .columns()
                                .iter()
                                .map(|column| column.value_json(location.row as usize))
                                .collect()
                        });
                        WatchedDoc {
                            entity: handle.bits(),
                            values,
                        }
                    })
                    .collect(),
            )
        };
        to_string(&LiveViewDoc {
            cmd: "liveview",
            entities,
            avg_comp,
            est_size: self.memory_stats().total_bytes,
            watched,
        })
    }
}
