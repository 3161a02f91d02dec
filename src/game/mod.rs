//! Game Logic Module
//!
//! All simulation code. Deterministic given the same inputs.
//!
//! ## Module Structure
//!
//! - `input`: Command string parsing
//! - `motion`: Per-entity motion state
//! - `quad`: Persistent quad-tree spatial index
//! - `phase`: Input, broad and narrow phase traversal
//! - `collision`: Continuous-time collision classification
//! - `tick`: Move request resolution and path action commits
//! - `terrain`: Terrain maps, slicing and terrain diffs
//! - `state`: Snapshots, culling and diffs
//! - `world`: Index plus terrain, driven once per tick

pub mod input;
pub mod motion;
pub mod quad;
pub mod phase;
pub mod collision;
pub mod tick;
pub mod terrain;
pub mod state;
pub mod world;

// Re-export key types
pub use input::{CommandKind, InputCmd, InputError};
pub use motion::{MotionInfo, MoveRequest};
pub use quad::{Entity, Quad, QuadError};
pub use phase::{Chunk, EntityCollision, InputPhaseHandler};
pub use collision::{AnyCollision, Collidable, Collision, CollisionType, PathCollision, CellCollision};
pub use tick::{step_to, TickError, TickResult};
pub use terrain::{TerrainDiff, TerrainError, TerrainMap, TerrainType, TerrainTypeChange};
pub use state::{EntityId, EntityState, WorldState, WorldStateDiff};
pub use world::{PhaseReport, World};
