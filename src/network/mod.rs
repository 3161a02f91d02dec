//! Network Layer
//!
//! Per-entity actors, the tick orchestrator and the wire format.
//! This layer is **non-deterministic** (task scheduling, wall-clock ticks);
//! all simulation rules live in `game/`.

pub mod protocol;
pub mod actor;
pub mod session;

pub use protocol::{
    ClientMessage, ServerMessage, ErrorCode,
    WorldStateFrame, EntityFrame, PathActionFrame, TerrainMapFrame, TerrainSliceFrame,
};
pub use actor::{spawn_player, ActorError, Handled, MuxState, PlayerController, PlayerHandle, PlayerMux, Submitted};
pub use session::{PlayerDef, Session, SessionConfig, SessionError, SessionHandle, TickReport};
