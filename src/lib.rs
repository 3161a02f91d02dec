//! # Tilesim Server
//!
//! Authoritative simulation core for a tile-based multiplayer world.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TILESIM SERVER                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Grid primitives                           │
//! │  ├── time.rs     - Ticks, spans, clock                       │
//! │  ├── coord.rs    - Cells, directions, bounds                 │
//! │  ├── path.rs     - Path actions (one-cell moves)             │
//! │  └── hash.rs     - Snapshot digests                          │
//! │                                                              │
//! │  game/           - Simulation (deterministic)                │
//! │  ├── input.rs    - Command string parsing                    │
//! │  ├── motion.rs   - Per-entity motion state                   │
//! │  ├── quad.rs     - Persistent quad-tree                      │
//! │  ├── phase.rs    - Input / broad / narrow phases             │
//! │  ├── collision.rs- Continuous-time collisions                │
//! │  ├── tick.rs     - Move resolution                           │
//! │  ├── terrain.rs  - Terrain maps and diffs                    │
//! │  ├── state.rs    - Snapshots, cull, diff                     │
//! │  └── world.rs    - Index plus terrain                        │
//! │                                                              │
//! │  network/        - Actors and orchestration                  │
//! │  ├── protocol.rs - Wire frames                               │
//! │  ├── actor.rs    - Per-entity player mux                     │
//! │  └── session.rs  - Tick orchestrator                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `game/` modules are deterministic:
//! - Integer ticks and cells only
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - No system time dependencies
//! - Ties broken by request tick, then entity id
//!
//! Given the same commands at the same ticks, every run produces the same
//! snapshots and digests.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::coord::{Bounds, Cell, Direction};
pub use core::path::PathAction;
pub use core::time::{Span, WorldTime};
pub use game::state::{EntityId, EntityState, WorldState, WorldStateDiff};
pub use network::session::{PlayerDef, Session, SessionConfig, SessionHandle};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
