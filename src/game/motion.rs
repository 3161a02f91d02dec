//! Motion State
//!
//! Per-entity mutable motion record. Owned by the entity's actor; the
//! orchestrator only ever works on a granted copy.

use serde::{Serialize, Deserialize};

use crate::core::coord::{Bounds, Cell, Direction};
use crate::core::path::PathAction;
use crate::core::time::WorldTime;
use crate::game::input::{CommandKind, InputCmd};

/// A pending request to move one cell. Consumed within a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    /// Tick the controller issued the request at
    pub issued_at: WorldTime,
    /// Direction to move in
    pub direction: Direction,
}

/// Motion state of one entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionInfo {
    /// Current cell (origin of the active path action, if any)
    pub coord: Cell,
    /// Facing direction
    pub facing: Direction,
    /// Ticks needed to cross one cell
    pub speed: WorldTime,
    /// Queued move request
    pub move_request: Option<MoveRequest>,
    /// In-flight motion. The FIFO holds at most one action.
    path_action: Option<PathAction>,
}

impl MotionInfo {
    /// Create a stationary entity.
    pub fn new(coord: Cell, facing: Direction, speed: WorldTime) -> Self {
        Self {
            coord,
            facing,
            speed,
            move_request: None,
            path_action: None,
        }
    }

    /// True while a path action is in flight.
    #[inline]
    pub fn is_moving(&self) -> bool {
        self.path_action.is_some()
    }

    /// The path action FIFO.
    #[inline]
    pub fn path_actions(&self) -> &[PathAction] {
        self.path_action.as_slice()
    }

    /// The active path action, if any.
    #[inline]
    pub fn path_action(&self) -> Option<&PathAction> {
        self.path_action.as_ref()
    }

    /// Make `action` the sole in-flight action.
    pub fn push_path_action(&mut self, action: PathAction) {
        self.path_action = Some(action);
    }

    /// Clear the FIFO, returning the action that was in flight.
    pub fn clear_path_actions(&mut self) -> Option<PathAction> {
        self.path_action.take()
    }

    /// Bounding box: both cells of the active motion, or the current cell.
    pub fn aabb(&self) -> Bounds {
        match &self.path_action {
            Some(action) => action.bounds(),
            None => Bounds::cell(self.coord),
        }
    }

    /// Apply a controller command.
    ///
    /// A cancel only removes the queued request if the directions match;
    /// otherwise it's dropped.
    pub fn apply(&mut self, cmd: &InputCmd) {
        match cmd.kind {
            CommandKind::Move => {
                self.move_request = Some(MoveRequest {
                    issued_at: cmd.issued_at,
                    direction: cmd.direction,
                });
            }
            CommandKind::MoveCancel => {
                if self
                    .move_request
                    .is_some_and(|req| req.direction == cmd.direction)
                {
                    self.move_request = None;
                }
            }
        }
    }
}
