//! Core grid primitives.
//!
//! Time, coordinates, path actions and state hashing. Everything here is a
//! plain value type with no knowledge of entities or the simulation loop.

pub mod time;
pub mod coord;
pub mod path;
pub mod hash;

// Re-export core types
pub use time::{Clock, Span, WorldTime};
pub use coord::{Bounds, Cell, Direction, UnknownDirection};
pub use path::{PartialCell, PathAction, PathError};
pub use hash::{StateHash, StateHasher};
