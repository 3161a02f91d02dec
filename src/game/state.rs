//! World State Snapshots
//!
//! Immutable per-tick snapshots, viewport culling and snapshot diffs.
//! Entities are kept sorted by id for deterministic output and hashing.

use std::collections::BTreeMap;
use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::coord::{Bounds, Cell, Direction};
use crate::core::hash::{StateHash, StateHasher};
use crate::core::path::PathAction;
use crate::core::time::WorldTime;
use crate::game::motion::MotionInfo;
use crate::game::quad::Entity;
use crate::game::terrain::{TerrainDiff, TerrainMap};

// =============================================================================
// ENTITY ID
// =============================================================================

/// Unique entity identifier.
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// ENTITY STATE
// =============================================================================

/// Snapshot value of one entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityState {
    /// Entity
    pub id: EntityId,
    /// Display name
    pub name: String,
    /// Current cell
    pub coord: Cell,
    /// Facing
    pub facing: Direction,
    /// In-flight motion, at most one
    pub path_actions: Vec<PathAction>,
}

impl EntityState {
    /// Snapshot an entity's motion state.
    pub fn from_motion(id: EntityId, name: impl Into<String>, motion: &MotionInfo) -> Self {
        Self {
            id,
            name: name.into(),
            coord: motion.coord,
            facing: motion.facing,
            path_actions: motion.path_actions().to_vec(),
        }
    }

    /// True if anything a client can see differs.
    pub fn is_different_from(&self, other: &EntityState) -> bool {
        self.coord != other.coord
            || self.facing != other.facing
            || self.path_actions != other.path_actions
            || self.name != other.name
    }

    /// Hash this entity's state for verification.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u64(self.id.0);
        hasher.update_u64(self.name.len() as u64);
        hasher.update_bytes(self.name.as_bytes());
        hasher.update_cell(self.coord);
        hasher.update_u8(self.facing as u8);
        hasher.update_u64(self.path_actions.len() as u64);
        for path in &self.path_actions {
            hasher.update_path(path);
        }
    }
}

impl Entity for EntityState {
    fn id(&self) -> EntityId {
        self.id
    }

    fn cell(&self) -> Cell {
        self.coord
    }

    fn bounds(&self) -> Bounds {
        match self.path_actions.first() {
            Some(path) => path.bounds(),
            None => Bounds::cell(self.coord),
        }
    }

    fn path_action(&self) -> Option<PathAction> {
        self.path_actions.first().copied()
    }
}

// =============================================================================
// WORLD STATE
// =============================================================================

/// Snapshot of the world at one tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorldState {
    /// Tick of the snapshot
    pub time: WorldTime,
    /// Region the snapshot covers
    pub bounds: Bounds,
    /// Entities, sorted by id
    pub entities: Vec<EntityState>,
    /// Terrain under `bounds`
    pub terrain: Option<TerrainMap>,
}

impl WorldState {
    /// Create a snapshot. Entities are sorted by id.
    pub fn new(
        time: WorldTime,
        bounds: Bounds,
        mut entities: Vec<EntityState>,
        terrain: Option<TerrainMap>,
    ) -> Self {
        entities.sort_by_key(|e| e.id);
        Self { time, bounds, entities, terrain }
    }

    /// An empty snapshot, the starting point for a first full diff.
    pub fn empty(time: WorldTime, bounds: Bounds) -> Self {
        Self::new(time, bounds, Vec::new(), None)
    }

    /// Look up an entity by id.
    pub fn entity(&self, id: EntityId) -> Option<&EntityState> {
        self.entities
            .binary_search_by_key(&id, |e| e.id)
            .ok()
            .map(|i| &self.entities[i])
    }

    /// The part of the snapshot visible inside `bounds`.
    pub fn cull(&self, bounds: &Bounds) -> WorldState {
        let entities = self
            .entities
            .iter()
            .filter(|e| e.bounds().overlaps(bounds))
            .cloned()
            .collect();

        let terrain = self
            .terrain
            .as_ref()
            .filter(|map| map.bounds().overlaps(bounds))
            .and_then(|map| map.slice(bounds).ok());

        WorldState {
            time: self.time,
            bounds: *bounds,
            entities,
            terrain,
        }
    }

    /// Changes needed to go from `self` to `next`.
    pub fn diff(&self, next: &WorldState) -> WorldStateDiff {
        let old: BTreeMap<EntityId, &EntityState> =
            self.entities.iter().map(|e| (e.id, e)).collect();
        let new: BTreeMap<EntityId, &EntityState> =
            next.entities.iter().map(|e| (e.id, e)).collect();

        let entities = next
            .entities
            .iter()
            .filter(|e| old.get(&e.id).map_or(true, |prev| prev.is_different_from(e)))
            .cloned()
            .collect();

        let removed = self
            .entities
            .iter()
            .filter(|e| !new.contains_key(&e.id))
            .cloned()
            .collect();

        let terrain = match (&self.terrain, &next.terrain) {
            (_, None) => None,
            (None, Some(map)) => Some(TerrainDiff::full(map)),
            (Some(prev), Some(map)) => Some(prev.diff(map)),
        }
        .filter(|diff| !diff.is_empty());

        WorldStateDiff {
            time: next.time,
            bounds: next.bounds,
            entities,
            removed,
            terrain,
        }
    }

    /// Deterministic digest of the snapshot.
    pub fn digest(&self) -> StateHash {
        let mut hasher = StateHasher::for_world_state();
        hasher.update_u64(self.time);
        hasher.update_bounds(&self.bounds);
        hasher.update_u64(self.entities.len() as u64);
        for entity in &self.entities {
            entity.hash_into(&mut hasher);
        }
        if let Some(map) = &self.terrain {
            hasher.update_bounds(&map.bounds());
            for (_, terrain) in map.cells() {
                hasher.update_u8(terrain.as_u8());
            }
        }
        hasher.finalize()
    }
}

// =============================================================================
// DIFF
// =============================================================================

/// Minimal changes between two snapshots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorldStateDiff {
    /// Tick of the newer snapshot
    pub time: WorldTime,
    /// Region of the newer snapshot
    pub bounds: Bounds,
    /// New or changed entities
    pub entities: Vec<EntityState>,
    /// Entities no longer present, as last seen
    pub removed: Vec<EntityState>,
    /// Terrain changes, `None` if there are none
    pub terrain: Option<TerrainDiff>,
}

impl WorldStateDiff {
    /// True if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.removed.is_empty() && self.terrain.is_none()
    }
}
