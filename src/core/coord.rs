//! Grid Coordinates
//!
//! Cells, cardinal directions and inclusive cell rectangles.
//!
//! The y axis grows northwards, so a rectangle's top-left corner has the
//! smallest x and the largest y of the cells it covers.

use std::fmt;
use std::str::FromStr;
use serde::{Serialize, Deserialize};
use thiserror::Error;

// =============================================================================
// CELL
// =============================================================================

/// Integer grid coordinate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cell {
    /// Column
    pub x: i32,
    /// Row (north is +y)
    pub y: i32,
}

impl Cell {
    /// Create a cell.
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The adjacent cell in `direction`.
    #[inline]
    pub fn neighbor(self, direction: Direction) -> Cell {
        match direction {
            Direction::North => Cell::new(self.x, self.y + 1),
            Direction::East => Cell::new(self.x + 1, self.y),
            Direction::South => Cell::new(self.x, self.y - 1),
            Direction::West => Cell::new(self.x - 1, self.y),
        }
    }

    /// Manhattan distance to another cell.
    #[inline]
    pub fn manhattan(self, other: Cell) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// Direction of an adjacent cell, `None` if `other` is not adjacent.
    pub fn direction_to(self, other: Cell) -> Option<Direction> {
        match (other.x - self.x, other.y - self.y) {
            (0, 1) => Some(Direction::North),
            (1, 0) => Some(Direction::East),
            (0, -1) => Some(Direction::South),
            (-1, 0) => Some(Direction::West),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// =============================================================================
// DIRECTION
// =============================================================================

/// Cardinal direction of travel or facing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// +y
    North,
    /// +x
    East,
    /// -y
    South,
    /// -x
    West,
}

impl Direction {
    /// All directions, clockwise from north.
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    /// The opposite direction.
    #[inline]
    pub fn reverse(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::East => Direction::West,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
        }
    }

    /// Wire name of the direction.
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::East => "east",
            Direction::South => "south",
            Direction::West => "west",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A direction string that isn't one of north/east/south/west.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown direction: {0:?}")]
pub struct UnknownDirection(pub String);

impl FromStr for Direction {
    type Err = UnknownDirection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "north" => Ok(Direction::North),
            "east" => Ok(Direction::East),
            "south" => Ok(Direction::South),
            "west" => Ok(Direction::West),
            other => Err(UnknownDirection(other.to_string())),
        }
    }
}

// =============================================================================
// BOUNDS
// =============================================================================

/// Inclusive rectangle of cells, also used as an entity's AABB.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    /// Smallest x, largest y
    pub top_l: Cell,
    /// Largest x, smallest y
    pub bot_r: Cell,
}

impl Bounds {
    /// Create bounds from already ordered corners.
    #[inline]
    pub const fn new(top_l: Cell, bot_r: Cell) -> Self {
        Self { top_l, bot_r }
    }

    /// Bounds covering a single cell.
    #[inline]
    pub const fn cell(cell: Cell) -> Self {
        Self { top_l: cell, bot_r: cell }
    }

    /// Smallest bounds covering both cells, in any order.
    pub fn join(a: Cell, b: Cell) -> Self {
        Self {
            top_l: Cell::new(a.x.min(b.x), a.y.max(b.y)),
            bot_r: Cell::new(a.x.max(b.x), a.y.min(b.y)),
        }
    }

    /// Square bounds of `radius` cells around `center`.
    pub fn around(center: Cell, radius: i32) -> Self {
        Self {
            top_l: Cell::new(center.x - radius, center.y + radius),
            bot_r: Cell::new(center.x + radius, center.y - radius),
        }
    }

    /// Corners are ordered.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.top_l.x <= self.bot_r.x && self.top_l.y >= self.bot_r.y
    }

    /// Number of columns.
    #[inline]
    pub fn width(&self) -> i32 {
        self.bot_r.x - self.top_l.x + 1
    }

    /// Number of rows.
    #[inline]
    pub fn height(&self) -> i32 {
        self.top_l.y - self.bot_r.y + 1
    }

    /// Number of cells covered.
    #[inline]
    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    /// Check if a cell lies inside.
    #[inline]
    pub fn contains(&self, cell: Cell) -> bool {
        cell.x >= self.top_l.x
            && cell.x <= self.bot_r.x
            && cell.y <= self.top_l.y
            && cell.y >= self.bot_r.y
    }

    /// Check if `other` lies entirely inside.
    #[inline]
    pub fn contains_bounds(&self, other: &Bounds) -> bool {
        self.contains(other.top_l) && self.contains(other.bot_r)
    }

    /// Overlap test. Each axis is the half-open interval `[min, max + 1)`.
    #[inline]
    pub fn overlaps(&self, other: &Bounds) -> bool {
        self.top_l.x < other.bot_r.x + 1
            && other.top_l.x < self.bot_r.x + 1
            && self.bot_r.y < other.top_l.y + 1
            && other.bot_r.y < self.top_l.y + 1
    }

    /// The shared rectangle, if any.
    pub fn intersection(&self, other: &Bounds) -> Option<Bounds> {
        if !self.overlaps(other) {
            return None;
        }
        Some(Bounds {
            top_l: Cell::new(self.top_l.x.max(other.top_l.x), self.top_l.y.min(other.top_l.y)),
            bot_r: Cell::new(self.bot_r.x.min(other.bot_r.x), self.bot_r.y.max(other.bot_r.y)),
        })
    }

    /// Grow by `n` cells on every side.
    pub fn expand(&self, n: i32) -> Bounds {
        Bounds {
            top_l: Cell::new(self.top_l.x - n, self.top_l.y + n),
            bot_r: Cell::new(self.bot_r.x + n, self.bot_r.y - n),
        }
    }

    /// Rectangle difference `self - other`.
    ///
    /// Returns the slices of `self` not covered by `other`: a full-width top
    /// and bottom strip plus left and right strips spanning the overlapped
    /// rows. Returns `[self]` when they don't overlap and nothing when `other`
    /// covers `self`.
    pub fn difference(&self, other: &Bounds) -> Vec<Bounds> {
        let inner = match self.intersection(other) {
            Some(inner) => inner,
            None => return vec![*self],
        };

        let mut slices = Vec::with_capacity(4);

        // Top
        if self.top_l.y > inner.top_l.y {
            slices.push(Bounds::new(
                self.top_l,
                Cell::new(self.bot_r.x, inner.top_l.y + 1),
            ));
        }

        // Bottom
        if inner.bot_r.y > self.bot_r.y {
            slices.push(Bounds::new(
                Cell::new(self.top_l.x, inner.bot_r.y - 1),
                self.bot_r,
            ));
        }

        // Left
        if inner.top_l.x > self.top_l.x {
            slices.push(Bounds::new(
                Cell::new(self.top_l.x, inner.top_l.y),
                Cell::new(inner.top_l.x - 1, inner.bot_r.y),
            ));
        }

        // Right
        if self.bot_r.x > inner.bot_r.x {
            slices.push(Bounds::new(
                Cell::new(inner.bot_r.x + 1, inner.top_l.y),
                Cell::new(self.bot_r.x, inner.bot_r.y),
            ));
        }

        slices
    }

    /// Split into four quadrants `[NW, NE, SE, SW]`.
    ///
    /// `None` if the rectangle is narrower or shorter than 2 cells.
    pub fn quads(&self) -> Option<[Bounds; 4]> {
        let (w, h) = (self.width(), self.height());
        if w < 2 || h < 2 {
            return None;
        }

        let west_edge = self.top_l.x + w / 2 - 1;
        let north_edge = self.top_l.y - h / 2 + 1;

        Some([
            Bounds::new(self.top_l, Cell::new(west_edge, north_edge)),
            Bounds::new(
                Cell::new(west_edge + 1, self.top_l.y),
                Cell::new(self.bot_r.x, north_edge),
            ),
            Bounds::new(Cell::new(west_edge + 1, north_edge - 1), self.bot_r),
            Bounds::new(
                Cell::new(self.top_l.x, north_edge - 1),
                Cell::new(west_edge, self.bot_r.y),
            ),
        ])
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.top_l, self.bot_r)
    }
}
