//! World
//!
//! Spatial index plus terrain. Applies committed motions each tick and
//! produces snapshots.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::core::coord::Bounds;
use crate::core::time::WorldTime;
use crate::game::motion::MotionInfo;
use crate::game::phase::{self, Chunk, EntityCollision};
use crate::game::quad::{Entity, Quad, QuadError};
use crate::game::state::{EntityId, EntityState, WorldState};
use crate::game::terrain::TerrainMap;

/// Outcome of running the phases for one tick.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PhaseReport {
    /// Entities that left the world, removed from the index
    pub out_of_bounds: Vec<EntityState>,
    /// Realized collisions
    pub collisions: Vec<EntityCollision>,
}

/// The simulated world.
#[derive(Debug, Clone)]
pub struct World {
    quad: Quad<EntityState>,
    terrain: Option<TerrainMap>,
}

impl World {
    /// Create an empty world over `bounds`.
    pub fn new(bounds: Bounds, threshold: usize) -> Result<Self, QuadError> {
        Ok(Self {
            quad: Quad::new(bounds, threshold)?,
            terrain: None,
        })
    }

    /// Region covered by the world.
    #[inline]
    pub fn bounds(&self) -> Bounds {
        self.quad.bounds()
    }

    /// Number of entities.
    #[inline]
    pub fn len(&self) -> usize {
        self.quad.len()
    }

    /// True if the world has no entities.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.quad.is_empty()
    }

    /// The spatial index.
    #[inline]
    pub fn quad(&self) -> &Quad<EntityState> {
        &self.quad
    }

    /// Terrain, if any.
    #[inline]
    pub fn terrain(&self) -> Option<&TerrainMap> {
        self.terrain.as_ref()
    }

    /// Replace the terrain.
    pub fn set_terrain(&mut self, terrain: TerrainMap) {
        self.terrain = Some(terrain);
    }

    /// Add an entity, replacing any entity with the same id.
    pub fn insert(&mut self, entity: EntityState) -> Result<(), QuadError> {
        let base = match self.quad.find(entity.id) {
            Some(old) => self.quad.remove(&old),
            None => self.quad.clone(),
        };
        self.quad = base.insert(entity)?;
        Ok(())
    }

    /// Remove an entity by id.
    pub fn remove(&mut self, id: EntityId) -> Option<EntityState> {
        let entity = self.quad.find(id)?;
        self.quad = self.quad.remove(&entity);
        Some(entity)
    }

    /// Look up an entity by id.
    pub fn entity(&self, id: EntityId) -> Option<EntityState> {
        self.quad.find(id)
    }

    /// Fold committed motions into the index and detect collisions.
    ///
    /// Entities with no entry in `motions` keep their current state.
    pub fn apply_motions(
        &mut self,
        motions: &BTreeMap<EntityId, MotionInfo>,
        now: WorldTime,
    ) -> Result<PhaseReport, QuadError> {
        let mut update = |mut chunk: Chunk<EntityState>, _now: WorldTime| {
            for entity in &mut chunk.entities {
                if let Some(motion) = motions.get(&entity.id) {
                    let name = std::mem::take(&mut entity.name);
                    *entity = EntityState::from_motion(entity.id, name, motion);
                }
            }
            chunk
        };

        let (quad, out_of_bounds) = phase::run_input_phase(&self.quad, &mut update, now)?;
        self.quad = quad;

        for entity in &out_of_bounds {
            warn!(id = %entity.id, coord = %entity.cell(), "entity left the world");
        }

        let chunks = phase::run_broad_phase(&self.quad);
        let collisions = phase::run_narrow_phase(&chunks, now);
        debug!(
            entities = self.quad.len(),
            chunks = chunks.len(),
            collisions = collisions.len(),
            "phases complete"
        );

        Ok(PhaseReport { out_of_bounds, collisions })
    }

    /// Snapshot of the whole world.
    pub fn snapshot(&self, time: WorldTime) -> WorldState {
        WorldState::new(time, self.bounds(), self.quad.entities(), self.terrain.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::coord::{Cell, Direction};
    use crate::game::input::InputCmd;
    use crate::game::terrain::TerrainType;
    use crate::game::tick::step_to;

    fn bounds() -> Bounds {
        Bounds::new(Cell::new(-10, 9), Cell::new(9, -10))
    }

    fn state(id: u64, x: i32, y: i32) -> EntityState {
        EntityState {
            id: EntityId(id),
            name: format!("p{}", id),
            coord: Cell::new(x, y),
            facing: Direction::North,
            path_actions: Vec::new(),
        }
    }

    #[test]
    fn test_insert_replaces_same_id() {
        let mut world = World::new(bounds(), 2).unwrap();
        world.insert(state(1, 0, 0)).unwrap();
        world.insert(state(1, 3, 3)).unwrap();
        assert_eq!(world.len(), 1);
        assert_eq!(world.entity(EntityId(1)).map(|e| e.coord), Some(Cell::new(3, 3)));

        assert!(world.remove(EntityId(1)).is_some());
        assert!(world.is_empty());
        assert!(world.remove(EntityId(1)).is_none());
    }

    #[test]
    fn test_walk_off_the_edge() {
        let mut world = World::new(bounds(), 2).unwrap();
        world.insert(state(1, 9, 0)).unwrap();

        let mut motions = BTreeMap::new();
        let mut mi = MotionInfo::new(Cell::new(9, 0), Direction::North, 4);
        mi.apply(&InputCmd::move_to(0, Direction::East));
        motions.insert(EntityId(1), mi);

        step_to(&mut motions, 0, 1).unwrap();
        let report = world.apply_motions(&motions, 1).unwrap();
        assert!(report.out_of_bounds.is_empty());
        assert_eq!(world.len(), 1);

        step_to(&mut motions, 1, 4).unwrap();
        let report = world.apply_motions(&motions, 4).unwrap();
        assert!(report.out_of_bounds.is_empty());

        step_to(&mut motions, 4, 5).unwrap();
        let report = world.apply_motions(&motions, 5).unwrap();
        assert_eq!(report.out_of_bounds.len(), 1);
        assert_eq!(report.out_of_bounds[0].coord, Cell::new(10, 0));
        assert!(world.is_empty());
    }

    #[test]
    fn test_apply_motions_keeps_names_and_reports_collisions() {
        let mut world = World::new(bounds(), 4).unwrap();
        world.insert(state(1, 0, 0)).unwrap();
        world.insert(state(2, 0, 2)).unwrap();

        let mut motions = BTreeMap::new();
        let mut a = MotionInfo::new(Cell::new(0, 0), Direction::North, 10);
        a.apply(&InputCmd::move_to(0, Direction::North));
        let mut b = MotionInfo::new(Cell::new(0, 2), Direction::South, 10);
        b.apply(&InputCmd::move_to(1, Direction::West));
        motions.insert(EntityId(1), a);
        motions.insert(EntityId(2), b);

        step_to(&mut motions, 0, 1).unwrap();
        let report = world.apply_motions(&motions, 1).unwrap();
        assert!(report.collisions.is_empty());

        let snapshot = world.snapshot(1);
        assert_eq!(snapshot.entities[0].name, "p1");
        assert_eq!(snapshot.entities[0].path_actions.len(), 1);
        assert_eq!(snapshot.entities[1].facing, Direction::West);
    }

    #[test]
    fn test_snapshot_includes_terrain() {
        let mut world = World::new(bounds(), 4).unwrap();
        world.set_terrain(TerrainMap::filled(bounds(), TerrainType::Dirt));
        world.insert(state(1, 0, 0)).unwrap();

        let snapshot = world.snapshot(7);
        assert_eq!(snapshot.time, 7);
        assert_eq!(snapshot.bounds, bounds());
        assert_eq!(snapshot.terrain.map(|t| t.bounds()), Some(bounds()));
    }
}
