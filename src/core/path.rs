//! Path Actions
//!
//! A committed, time-bounded linear motion between two adjacent cells and the
//! occupancy model used by the collision engine.

use serde::{Serialize, Deserialize};
use thiserror::Error;

use super::coord::{Bounds, Cell, Direction};
use super::time::{Span, WorldTime};

/// Invariant violations when building a path action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// Orig and dest must be exactly one cell apart.
    #[error("path from {orig} to {dest} is not between adjacent cells")]
    NotAdjacent {
        /// Origin cell
        orig: Cell,
        /// Destination cell
        dest: Cell,
    },

    /// The span must cover at least one tick.
    #[error("path span {0} is empty")]
    EmptySpan(Span),
}

/// The fraction of a cell occupied by a moving entity at some tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PartialCell {
    /// The cell
    pub cell: Cell,
    /// Occupied fraction in `[0, 1]`
    pub percentage: f64,
}

/// Linear motion from `orig` to `dest` over `span`.
///
/// Only built through `new`, so orig and dest are always adjacent and the
/// span is never empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PathActionFields")]
pub struct PathAction {
    #[serde(flatten)]
    span: Span,
    orig: Cell,
    dest: Cell,
}

#[derive(Deserialize)]
struct PathActionFields {
    #[serde(flatten)]
    span: Span,
    orig: Cell,
    dest: Cell,
}

impl TryFrom<PathActionFields> for PathAction {
    type Error = PathError;

    fn try_from(fields: PathActionFields) -> Result<Self, Self::Error> {
        PathAction::new(fields.span, fields.orig, fields.dest)
    }
}

impl PathAction {
    /// Create a path action, validating adjacency and a non-empty span.
    pub fn new(span: Span, orig: Cell, dest: Cell) -> Result<Self, PathError> {
        if orig.manhattan(dest) != 1 {
            return Err(PathError::NotAdjacent { orig, dest });
        }
        if !span.is_valid() {
            return Err(PathError::EmptySpan(span));
        }
        Ok(Self { span, orig, dest })
    }

    /// When the motion happens.
    #[inline]
    pub fn span(&self) -> Span {
        self.span
    }

    /// Cell being left.
    #[inline]
    pub fn orig(&self) -> Cell {
        self.orig
    }

    /// Cell being entered.
    #[inline]
    pub fn dest(&self) -> Cell {
        self.dest
    }

    /// Direction of travel.
    #[inline]
    pub fn direction(&self) -> Direction {
        match (self.dest.x - self.orig.x, self.dest.y - self.orig.y) {
            (1, _) => Direction::East,
            (-1, _) => Direction::West,
            (_, -1) => Direction::South,
            _ => Direction::North,
        }
    }

    /// Number of ticks the motion takes.
    #[inline]
    pub fn duration(&self) -> WorldTime {
        self.span.duration()
    }

    /// Elapsed fraction of the span at `t`, clamped to `[0, 1]`.
    pub fn elapsed(&self, t: WorldTime) -> f64 {
        if t <= self.span.start {
            return 0.0;
        }
        if t >= self.span.end {
            return 1.0;
        }
        (t - self.span.start) as f64 / self.duration() as f64
    }

    /// Occupancy of the origin cell at `t`, falling from 1 to 0.
    pub fn orig_partial(&self, t: WorldTime) -> PartialCell {
        PartialCell {
            cell: self.orig,
            percentage: 1.0 - self.elapsed(t),
        }
    }

    /// Occupancy of the destination cell at `t`, rising from 0 to 1.
    pub fn dest_partial(&self, t: WorldTime) -> PartialCell {
        PartialCell {
            cell: self.dest,
            percentage: self.elapsed(t),
        }
    }

    /// Rectangle covering both cells.
    #[inline]
    pub fn bounds(&self) -> Bounds {
        Bounds::join(self.orig, self.dest)
    }
}
