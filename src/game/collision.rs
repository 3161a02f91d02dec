//! Collision Detection
//!
//! Continuous-time collision classification between path actions.
//!
//! Every in-flight motion occupies its origin cell with a fraction falling
//! linearly from 1 to 0 and its destination with a fraction rising from 0 to
//! 1. Two motions that share a cell are classified by how their cells and
//! directions relate; each class has its own timespan and overlap function.
//! Boundary ticks that come out of a closed-form solve are floored/ceiled and
//! then corrected by `adjust_boundary`.

use serde::{Serialize, Deserialize};

use crate::core::coord::Cell;
use crate::core::path::PathAction;
use crate::core::time::{Span, WorldTime};

/// How two motions (or a motion and a cell) relate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollisionType {
    /// No shared cell
    None,
    /// Entering the same cell from opposite sides
    HeadToHead,
    /// Entering the same cell from perpendicular sides
    FromSide,
    /// A enters the cell B is leaving, same direction
    AIntoB,
    /// A enters the cell B is leaving, different direction
    AIntoBFromSide,
    /// A and B trade cells
    Swap,
    /// Leaving the same cell in opposite directions
    SameOrig,
    /// Leaving the same cell in perpendicular directions
    SameOrigPerp,
    /// Same origin and same destination
    SameOrigDest,
    /// Motion entering a static cell
    CellDest,
    /// Motion leaving a static cell
    CellOrig,
}

/// Common interface of path/path and path/cell collisions.
pub trait Collision {
    /// Classification
    fn collision_type(&self) -> CollisionType;

    /// Ticks during which the two may overlap.
    fn span(&self) -> Span;

    /// Overlap at `t`. Callers must clamp `t` into `span()` first.
    fn overlap_at(&self, t: WorldTime) -> f64;

    /// First tick of the collision.
    fn start(&self) -> WorldTime {
        self.span().start
    }

    /// Last tick of the collision.
    fn end(&self) -> WorldTime {
        self.span().end
    }

    /// True if overlap is positive at some tick of the span not before `now`.
    fn is_realized_after(&self, now: WorldTime) -> bool {
        if self.collision_type() == CollisionType::None {
            return false;
        }
        let span = self.span();
        let from = span.clamp(now);
        (from..=span.end).any(|t| self.overlap_at(t) > 0.0)
    }
}

// =============================================================================
// BOUNDARY CORRECTION
// =============================================================================

/// Which end of a collision window a boundary tick belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundaryEdge {
    /// Candidate came from `floor`; may move one tick later
    Start,
    /// Candidate came from `ceil`; may move one tick earlier
    End,
}

/// Nudge a solved boundary tick inward when the neighbouring tick still has
/// exactly zero overlap, so no zero-width window is reported.
pub fn adjust_boundary<F>(candidate: WorldTime, edge: BoundaryEdge, overlap_at: F) -> WorldTime
where
    F: Fn(WorldTime) -> f64,
{
    match edge {
        BoundaryEdge::Start => {
            if overlap_at(candidate + 1) == 0.0 {
                candidate + 1
            } else {
                candidate
            }
        }
        BoundaryEdge::End => {
            if candidate > 0 && overlap_at(candidate - 1) == 0.0 {
                candidate - 1
            } else {
                candidate
            }
        }
    }
}

/// Tick at which the combined occupancy of two opposed motions crosses 1.
///
/// Solves `(t - at)/ad + (t - bt)/bd = 1` for `t`.
fn opposed_crossing(a: &PathAction, b: &PathAction) -> f64 {
    let (at, bt) = (a.span().start as f64, b.span().start as f64);
    let (ad, bd) = (a.duration() as f64, b.duration() as f64);
    (at * bd + bt * ad + ad * bd) / (bd + ad)
}

/// Tick at which A's destination occupancy catches up with B's origin
/// occupancy when both travel the same way.
///
/// Solves `(t - as)/ad = (t - bs)/bd` for `t`.
fn trailing_crossing(a: &PathAction, b: &PathAction) -> f64 {
    let (a_start, a_end) = (a.span().start as f64, a.span().end as f64);
    let (b_start, b_end) = (b.span().start as f64, b.span().end as f64);
    ((a_start / (a_end - a_start)) - (b_start / (b_end - b_start)))
        / ((1.0 / (a_end - a_start)) - (1.0 / (b_end - b_start)))
}

#[inline]
fn to_tick(t: f64) -> WorldTime {
    t.max(0.0) as WorldTime
}

// =============================================================================
// PATH vs PATH
// =============================================================================

/// Collision between two path actions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PathCollision {
    /// Classification
    pub kind: CollisionType,
    /// Window of possible overlap
    pub span: Span,
    /// First motion (swapped with B for the A-into-B cases when needed)
    pub a: PathAction,
    /// Second motion
    pub b: PathAction,
}

impl PathCollision {
    /// Classify two motions and compute their collision window.
    pub fn new(a: PathAction, b: PathAction) -> Self {
        let (a, b, kind) = Self::classify(a, b);
        let mut collision = Self { kind, span: Span::default(), a, b };
        collision.span = collision.compute_span();
        collision
    }

    fn classify(a: PathAction, b: PathAction) -> (PathAction, PathAction, CollisionType) {
        if a.orig() == b.orig() && a.dest() == b.dest() {
            return (a, b, CollisionType::SameOrigDest);
        }

        if a.orig() == b.orig() {
            if a.direction() == b.direction().reverse() {
                return (a, b, CollisionType::SameOrig);
            }
            return (a, b, CollisionType::SameOrigPerp);
        }

        if a.dest() == b.dest() {
            if a.direction() == b.direction().reverse() {
                return (a, b, CollisionType::HeadToHead);
            }
            return (a, b, CollisionType::FromSide);
        }

        if a.dest() == b.orig() && b.dest() == a.orig() {
            return (a, b, CollisionType::Swap);
        }

        // Normalize so A is always the one moving into B's origin
        let (a, b) = if b.dest() == a.orig() { (b, a) } else { (a, b) };

        if a.dest() == b.orig() {
            if a.direction() == b.direction() {
                // A fully trails B and never catches up
                if a.span().start >= b.span().start && a.span().end >= b.span().end {
                    return (a, b, CollisionType::None);
                }
                return (a, b, CollisionType::AIntoB);
            }
            return (a, b, CollisionType::AIntoBFromSide);
        }

        (a, b, CollisionType::None)
    }

    fn compute_span(&self) -> Span {
        let (a, b) = (&self.a, &self.b);
        let overlap = |t| path_overlap(self.kind, a, b, t);

        match self.kind {
            CollisionType::SameOrigDest | CollisionType::Swap => a.span().union(&b.span()),

            CollisionType::SameOrig => {
                let start = a.span().start.min(b.span().start);
                let end = if a.span().end == b.span().start {
                    a.span().end
                } else if b.span().end == a.span().start {
                    b.span().end
                } else {
                    let candidate = to_tick(opposed_crossing(a, b).ceil());
                    adjust_boundary(candidate, BoundaryEdge::End, overlap)
                };
                Span::new(start, end)
            }

            CollisionType::SameOrigPerp => Span::new(
                a.span().start.min(b.span().start),
                a.span().end.min(b.span().end),
            ),

            CollisionType::HeadToHead => {
                let start = if a.span().start == b.span().end {
                    a.span().start
                } else if b.span().start == a.span().end {
                    b.span().start
                } else {
                    let candidate = to_tick(opposed_crossing(a, b).floor());
                    adjust_boundary(candidate, BoundaryEdge::Start, overlap)
                };
                Span::new(start, a.span().end.max(b.span().end))
            }

            CollisionType::FromSide => Span::new(
                a.span().start.max(b.span().start),
                a.span().end.max(b.span().end),
            ),

            CollisionType::AIntoB => {
                let start = if a.span().start <= b.span().start {
                    a.span().start
                } else {
                    let candidate = to_tick(trailing_crossing(a, b).floor());
                    adjust_boundary(candidate, BoundaryEdge::Start, overlap)
                };
                Span::new(start, b.span().end)
            }

            CollisionType::AIntoBFromSide => Span::new(a.span().start, b.span().end),

            _ => Span::default(),
        }
    }
}

/// Overlap of two motions at `t` for a given classification.
fn path_overlap(kind: CollisionType, a: &PathAction, b: &PathAction, t: WorldTime) -> f64 {
    match kind {
        CollisionType::SameOrig => {
            let sum = a.orig_partial(t).percentage + b.orig_partial(t).percentage;
            (sum - 1.0).max(0.0)
        }

        CollisionType::SameOrigPerp => {
            a.orig_partial(t).percentage * b.orig_partial(t).percentage
        }

        CollisionType::SameOrigDest => {
            1.0 - (a.dest_partial(t).percentage - b.dest_partial(t).percentage).abs()
        }

        CollisionType::HeadToHead => {
            let sum = a.dest_partial(t).percentage + b.dest_partial(t).percentage;
            if sum > 1.0 { sum - 1.0 } else { 0.0 }
        }

        CollisionType::FromSide => {
            a.dest_partial(t).percentage * b.dest_partial(t).percentage
        }

        CollisionType::Swap => {
            let sum = a.dest_partial(t).percentage + b.dest_partial(t).percentage;
            if sum > 1.0 {
                a.orig_partial(t).percentage + b.orig_partial(t).percentage
            } else {
                sum
            }
        }

        CollisionType::AIntoB => {
            let sum = a.dest_partial(t).percentage + b.orig_partial(t).percentage;
            if sum > 1.0 { sum - 1.0 } else { 0.0 }
        }

        CollisionType::AIntoBFromSide => {
            a.dest_partial(t).percentage * b.orig_partial(t).percentage
        }

        _ => 0.0,
    }
}

impl Collision for PathCollision {
    fn collision_type(&self) -> CollisionType {
        self.kind
    }

    fn span(&self) -> Span {
        self.span
    }

    fn overlap_at(&self, t: WorldTime) -> f64 {
        path_overlap(self.kind, &self.a, &self.b, t)
    }
}

// =============================================================================
// PATH vs CELL
// =============================================================================

/// Collision between a motion and a static cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellCollision {
    /// `CellDest`, `CellOrig` or `None`
    pub kind: CollisionType,
    /// The motion's span, or empty
    pub span: Span,
    /// The static cell
    pub cell: Cell,
    /// The motion
    pub path: PathAction,
}

impl CellCollision {
    /// Classify a motion against a static cell.
    pub fn new(path: PathAction, cell: Cell) -> Self {
        let (kind, span) = if cell == path.dest() {
            (CollisionType::CellDest, path.span())
        } else if cell == path.orig() {
            (CollisionType::CellOrig, path.span())
        } else {
            (CollisionType::None, Span::default())
        };
        Self { kind, span, cell, path }
    }
}

impl Collision for CellCollision {
    fn collision_type(&self) -> CollisionType {
        self.kind
    }

    fn span(&self) -> Span {
        self.span
    }

    fn overlap_at(&self, t: WorldTime) -> f64 {
        match self.kind {
            CollisionType::CellDest => self.path.dest_partial(t).percentage,
            CollisionType::CellOrig => self.path.orig_partial(t).percentage,
            _ => 0.0,
        }
    }
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Something a path action can collide with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Collidable {
    /// Another motion
    Path(PathAction),
    /// A static cell
    Cell(Cell),
}

impl From<PathAction> for Collidable {
    fn from(path: PathAction) -> Self {
        Collidable::Path(path)
    }
}

impl From<Cell> for Collidable {
    fn from(cell: Cell) -> Self {
        Collidable::Cell(cell)
    }
}

/// Either kind of collision.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AnyCollision {
    /// Motion vs motion
    Path(PathCollision),
    /// Motion vs static cell
    Cell(CellCollision),
}

impl Collision for AnyCollision {
    fn collision_type(&self) -> CollisionType {
        match self {
            AnyCollision::Path(c) => c.collision_type(),
            AnyCollision::Cell(c) => c.collision_type(),
        }
    }

    fn span(&self) -> Span {
        match self {
            AnyCollision::Path(c) => c.span(),
            AnyCollision::Cell(c) => c.span(),
        }
    }

    fn overlap_at(&self, t: WorldTime) -> f64 {
        match self {
            AnyCollision::Path(c) => c.overlap_at(t),
            AnyCollision::Cell(c) => c.overlap_at(t),
        }
    }
}

impl PathAction {
    /// Classify this motion against another motion or a static cell.
    pub fn collides_with(&self, other: impl Into<Collidable>) -> AnyCollision {
        match other.into() {
            Collidable::Path(b) => AnyCollision::Path(PathCollision::new(*self, b)),
            Collidable::Cell(cell) => AnyCollision::Cell(CellCollision::new(*self, cell)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::coord::Direction;
    use proptest::prelude::*;

    fn pa(start: WorldTime, end: WorldTime, orig: (i32, i32), dest: (i32, i32)) -> PathAction {
        PathAction::new(
            Span::new(start, end),
            Cell::new(orig.0, orig.1),
            Cell::new(dest.0, dest.1),
        )
        .unwrap()
    }

    #[test]
    fn test_same_orig_dest() {
        let c = PathCollision::new(pa(0, 10, (0, 0), (0, 1)), pa(5, 20, (0, 0), (0, 1)));
        assert_eq!(c.kind, CollisionType::SameOrigDest);
        assert_eq!(c.span, Span::new(0, 20));
        assert!(c.is_realized_after(0));
    }

    #[test]
    fn test_same_orig_opposite_directions() {
        let c = PathCollision::new(pa(0, 10, (0, 0), (0, 1)), pa(0, 10, (0, 0), (0, -1)));
        assert_eq!(c.kind, CollisionType::SameOrig);
        assert_eq!(c.span, Span::new(0, 5));
        assert!(c.overlap_at(4) > 0.0);
        assert_eq!(c.overlap_at(5), 0.0);
    }

    #[test]
    fn test_same_orig_back_to_back() {
        // B leaves the moment A has left
        let c = PathCollision::new(pa(0, 10, (0, 0), (1, 0)), pa(10, 20, (0, 0), (-1, 0)));
        assert_eq!(c.kind, CollisionType::SameOrig);
        assert_eq!(c.span, Span::new(0, 10));
    }

    #[test]
    fn test_same_orig_perpendicular() {
        let c = PathCollision::new(pa(0, 10, (0, 0), (0, 1)), pa(4, 20, (0, 0), (1, 0)));
        assert_eq!(c.kind, CollisionType::SameOrigPerp);
        assert_eq!(c.span, Span::new(0, 10));
        assert_eq!(c.overlap_at(10), 0.0);
        assert!(c.overlap_at(5) > 0.0);
    }

    #[test]
    fn test_head_to_head() {
        let c = PathCollision::new(pa(0, 10, (0, 0), (0, 1)), pa(0, 10, (0, 2), (0, 1)));
        assert_eq!(c.kind, CollisionType::HeadToHead);
        assert_eq!(c.span, Span::new(5, 10));
        assert_eq!(c.overlap_at(5), 0.0);
        assert!(c.overlap_at(6) > 0.0);
        assert!((c.overlap_at(10) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_head_to_head_asymmetric_speeds() {
        let c = PathCollision::new(pa(0, 10, (0, 0), (0, 1)), pa(0, 30, (0, 2), (0, 1)));
        assert_eq!(c.kind, CollisionType::HeadToHead);
        // 1 = t/10 + t/30 -> t = 7.5
        assert_eq!(c.span, Span::new(7, 30));
        assert!(c.overlap_at(8) > 0.0);
    }

    #[test]
    fn test_head_to_head_touching_spans() {
        let c = PathCollision::new(pa(10, 20, (0, 0), (0, 1)), pa(0, 10, (0, 2), (0, 1)));
        assert_eq!(c.kind, CollisionType::HeadToHead);
        assert_eq!(c.span, Span::new(10, 20));
    }

    #[test]
    fn test_from_side() {
        let c = PathCollision::new(pa(0, 10, (0, 0), (0, 1)), pa(3, 13, (1, 1), (0, 1)));
        assert_eq!(c.kind, CollisionType::FromSide);
        assert_eq!(c.span, Span::new(3, 13));
        assert_eq!(c.overlap_at(3), 0.0);
        let expected = 0.8 * 0.5;
        assert!((c.overlap_at(8) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_swap() {
        let c = PathCollision::new(pa(0, 10, (0, 0), (0, 1)), pa(2, 12, (0, 1), (0, 0)));
        assert_eq!(c.kind, CollisionType::Swap);
        assert_eq!(c.span, Span::new(0, 12));
        // dest sum 0.5 + 0.3
        assert!((c.overlap_at(5) - 0.8).abs() < 1e-9);
        // dest sum 0.8 + 0.6 > 1 -> orig sum 0.2 + 0.4
        assert!((c.overlap_at(8) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_a_into_b_from_behind() {
        let a = pa(0, 10, (0, 0), (0, 1));
        let b = pa(0, 20, (0, 1), (0, 2));
        let c = PathCollision::new(a, b);
        assert_eq!(c.kind, CollisionType::AIntoB);
        assert_eq!(c.span, Span::new(0, 20));
    }

    #[test]
    fn test_a_into_b_argument_order_is_normalized() {
        let a = pa(0, 10, (0, 0), (0, 1));
        let b = pa(0, 20, (0, 1), (0, 2));
        let c = PathCollision::new(b, a);
        assert_eq!(c.kind, CollisionType::AIntoB);
        assert_eq!(c.a, a);
        assert_eq!(c.b, b);
    }

    #[test]
    fn test_a_into_b_catching_up() {
        // A starts later but is faster and catches B's tail
        let a = pa(2, 8, (0, 0), (0, 1));
        let b = pa(0, 10, (0, 1), (0, 2));
        let c = PathCollision::new(a, b);
        assert_eq!(c.kind, CollisionType::AIntoB);
        // (t-2)/6 = t/10 -> t = 5
        assert_eq!(c.span, Span::new(5, 10));
        assert_eq!(c.overlap_at(5), 0.0);
        assert!(c.overlap_at(6) > 0.0);
    }

    #[test]
    fn test_a_trailing_b_is_no_collision() {
        let c = PathCollision::new(pa(5, 20, (0, 0), (0, 1)), pa(0, 10, (0, 1), (0, 2)));
        assert_eq!(c.kind, CollisionType::None);
        assert!(!c.is_realized_after(0));
    }

    #[test]
    fn test_a_into_b_from_side() {
        let c = PathCollision::new(pa(0, 10, (0, 0), (0, 1)), pa(2, 12, (0, 1), (1, 1)));
        assert_eq!(c.kind, CollisionType::AIntoBFromSide);
        assert_eq!(c.span, Span::new(0, 12));
        assert!((c.overlap_at(7) - 0.7 * 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_unrelated_paths() {
        let c = PathCollision::new(pa(0, 10, (0, 0), (0, 1)), pa(0, 10, (5, 5), (5, 6)));
        assert_eq!(c.kind, CollisionType::None);
        assert_eq!(c.span, Span::default());
        assert_eq!(c.overlap_at(5), 0.0);
    }

    #[test]
    fn test_cell_collisions() {
        let path = pa(10, 20, (0, 0), (1, 0));

        let dest = path.collides_with(Cell::new(1, 0));
        assert_eq!(dest.collision_type(), CollisionType::CellDest);
        assert_eq!(dest.span(), path.span());
        assert!((dest.overlap_at(15) - 0.5).abs() < 1e-9);

        let orig = path.collides_with(Cell::new(0, 0));
        assert_eq!(orig.collision_type(), CollisionType::CellOrig);
        assert!((orig.overlap_at(12) - 0.8).abs() < 1e-9);

        let none = path.collides_with(Cell::new(7, 7));
        assert_eq!(none.collision_type(), CollisionType::None);
    }

    #[test]
    fn test_realized_after_skips_finished_windows() {
        let path = pa(0, 10, (0, 0), (1, 0));
        let orig = path.collides_with(Cell::new(0, 0));
        assert!(orig.is_realized_after(5));
        // Orig occupancy is zero from tick 10 on
        assert!(!orig.is_realized_after(10));
    }

    #[test]
    fn test_adjust_boundary_moves_inward_on_zero() {
        let zero_until_5 = |t: WorldTime| if t <= 5 { 0.0 } else { 1.0 };
        assert_eq!(adjust_boundary(4, BoundaryEdge::Start, zero_until_5), 5);
        assert_eq!(adjust_boundary(5, BoundaryEdge::Start, zero_until_5), 5);

        let zero_from_5 = |t: WorldTime| if t >= 5 { 0.0 } else { 1.0 };
        assert_eq!(adjust_boundary(6, BoundaryEdge::End, zero_from_5), 5);
        assert_eq!(adjust_boundary(5, BoundaryEdge::End, zero_from_5), 5);
        assert_eq!(adjust_boundary(0, BoundaryEdge::End, |_| 0.0), 0);
    }

    proptest! {
        #[test]
        fn prop_swap_ignores_speed(
            a_start in 0u64..100, a_len in 1u64..100,
            b_start in 0u64..100, b_len in 1u64..100,
            dir_index in 0usize..4,
        ) {
            let dir = Direction::ALL[dir_index];
            let here = Cell::new(3, -2);
            let there = here.neighbor(dir);
            let a = PathAction::new(Span::new(a_start, a_start + a_len), here, there).unwrap();
            let b = PathAction::new(Span::new(b_start, b_start + b_len), there, here).unwrap();

            prop_assert_eq!(PathCollision::new(a, b).kind, CollisionType::Swap);
            prop_assert_eq!(PathCollision::new(b, a).kind, CollisionType::Swap);
        }

        #[test]
        fn prop_head_to_head_window_is_tight(
            a_len in 1u64..60, b_len in 1u64..60, b_start in 0u64..30,
        ) {
            let a = PathAction::new(Span::new(0, a_len), Cell::new(0, 0), Cell::new(1, 0)).unwrap();
            let b = PathAction::new(Span::new(b_start, b_start + b_len), Cell::new(2, 0), Cell::new(1, 0)).unwrap();
            let c = PathCollision::new(a, b);
            prop_assert_eq!(c.kind, CollisionType::HeadToHead);

            // Nothing overlaps before the start; the tick after it does
            for t in 0..c.span.start {
                prop_assert_eq!(c.overlap_at(t), 0.0);
            }
            prop_assert!(c.overlap_at(c.span.start + 1) > 0.0);
        }
    }
}
