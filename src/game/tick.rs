//! Simulation Tick
//!
//! Turns pending move requests into committed path actions.
//!
//! Each step:
//! 1. Path actions that have ended by the target tick are cleared and the
//!    entity snaps to the destination
//! 2. Idle entities with a move request become candidates
//! 3. Candidates heading for the same cell are resolved to one winner
//! 4. Winners start a path action spanning `[target, target + speed)`
//!
//! A candidate with zero speed would never arrive; it is left out of the
//! step and reported as stalled, and everyone else moves as usual.
//!
//! Every check runs before any entity is touched, so a failed step leaves
//! the motion table as it was.

use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::coord::{Cell, Direction};
use crate::core::path::{PathAction, PathError};
use crate::core::time::{Span, WorldTime};
use crate::game::motion::{MotionInfo, MoveRequest};
use crate::game::state::EntityId;

/// Invariant faults. Fatal for the tick.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TickError {
    /// Target tick is not after the current tick.
    #[error("cannot step from tick {now} to tick {target}")]
    TimeNotAdvancing {
        /// Current tick
        now: WorldTime,
        /// Requested tick
        target: WorldTime,
    },

    /// A path action could not be built.
    #[error("entity {id}: {source}")]
    Path {
        /// Entity
        id: EntityId,
        /// Cause
        #[source]
        source: PathError,
    },
}

/// What happened during a step.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickResult {
    /// Motions started this step
    pub started: Vec<(EntityId, PathAction)>,
    /// Entities that arrived, with the cell they arrived at
    pub completed: Vec<(EntityId, Cell)>,
    /// Candidates that lost a destination conflict and kept their request
    pub deferred: Vec<EntityId>,
    /// Candidates with zero speed, left untouched
    pub stalled: Vec<EntityId>,
}

impl TickResult {
    /// True if nothing moved.
    pub fn is_idle(&self) -> bool {
        self.started.is_empty() && self.completed.is_empty()
    }
}

struct Candidate {
    id: EntityId,
    request: MoveRequest,
    orig: Cell,
}

/// Advance every entity's motion from `now` to `target`.
///
/// # Conflicts
///
/// When several candidates head for the same cell, the earliest
/// `issued_at` wins; equal ticks go to the lowest id. Losers keep their
/// move request for a later step.
pub fn step_to(
    entities: &mut BTreeMap<EntityId, MotionInfo>,
    now: WorldTime,
    target: WorldTime,
) -> Result<TickResult, TickError> {
    if target <= now {
        return Err(TickError::TimeNotAdvancing { now, target });
    }

    // 1. Plan completions without mutating
    let completions: Vec<(EntityId, Cell)> = entities
        .iter()
        .filter_map(|(id, mi)| {
            mi.path_action()
                .filter(|action| action.span().end <= target)
                .map(|action| (*id, action.dest()))
        })
        .collect();

    // 2. Candidates: pending request and idle once completions apply
    let mut result = TickResult::default();
    let mut by_dest: BTreeMap<Cell, Vec<Candidate>> = BTreeMap::new();
    for (id, mi) in entities.iter() {
        let Some(request) = mi.move_request else { continue };

        let orig = match mi.path_action() {
            None => mi.coord,
            Some(action) if action.span().end <= target => action.dest(),
            Some(_) => continue,
        };

        if mi.speed == 0 {
            warn!(%id, "move ignored, entity has zero speed");
            result.stalled.push(*id);
            continue;
        }

        let dest = orig.neighbor(request.direction);
        by_dest.entry(dest).or_default().push(Candidate { id: *id, request, orig });
    }

    // 3. One winner per destination
    let mut winners: Vec<(EntityId, PathAction, Direction)> = Vec::new();

    for (dest, mut candidates) in by_dest {
        candidates.sort_by_key(|c| (c.request.issued_at, c.id));
        let mut candidates = candidates.into_iter();

        if let Some(winner) = candidates.next() {
            let speed = entities.get(&winner.id).map_or(0, |mi| mi.speed);
            let action = PathAction::new(Span::new(target, target + speed), winner.orig, dest)
                .map_err(|source| TickError::Path { id: winner.id, source })?;
            winners.push((winner.id, action, winner.request.direction));
        }

        for loser in candidates {
            debug!(id = %loser.id, %dest, "move deferred, destination taken");
            result.deferred.push(loser.id);
        }
    }

    // 4. Commit
    for (id, dest) in completions {
        if let Some(mi) = entities.get_mut(&id) {
            mi.clear_path_actions();
            mi.coord = dest;
        }
        result.completed.push((id, dest));
    }

    for (id, action, direction) in winners {
        if let Some(mi) = entities.get_mut(&id) {
            mi.move_request = None;
            mi.facing = direction;
            mi.push_path_action(action);
        }
        result.started.push((id, action));
    }

    result.started.sort_by_key(|(id, _)| *id);
    result.deferred.sort();

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::input::InputCmd;

    fn single(speed: WorldTime) -> BTreeMap<EntityId, MotionInfo> {
        let mut entities = BTreeMap::new();
        entities.insert(EntityId(1), MotionInfo::new(Cell::new(0, 0), Direction::North, speed));
        entities
    }

    #[test]
    fn test_move_north_and_arrive() {
        let mut entities = single(35);
        entities
            .get_mut(&EntityId(1))
            .unwrap()
            .apply(&InputCmd::parse("move=0", "north").unwrap());

        let result = step_to(&mut entities, 0, 1).unwrap();
        assert_eq!(result.started.len(), 1);

        let mi = &entities[&EntityId(1)];
        assert!(mi.move_request.is_none());
        assert_eq!(mi.facing, Direction::North);
        assert_eq!(mi.path_actions().len(), 1);
        let action = mi.path_actions()[0];
        assert_eq!(action.orig(), Cell::new(0, 0));
        assert_eq!(action.dest(), Cell::new(0, 1));
        assert_eq!(action.duration(), 35);
        assert_eq!(action.span(), Span::new(1, 36));

        // Still travelling
        let result = step_to(&mut entities, 1, 35).unwrap();
        assert!(result.is_idle());
        assert!(entities[&EntityId(1)].is_moving());

        let result = step_to(&mut entities, 35, 36).unwrap();
        assert_eq!(result.completed, vec![(EntityId(1), Cell::new(0, 1))]);
        let mi = &entities[&EntityId(1)];
        assert!(!mi.is_moving());
        assert_eq!(mi.coord, Cell::new(0, 1));
    }

    #[test]
    fn test_facing_follows_travel() {
        let mut entities = single(10);
        entities
            .get_mut(&EntityId(1))
            .unwrap()
            .apply(&InputCmd::move_to(0, Direction::West));

        step_to(&mut entities, 0, 1).unwrap();
        assert_eq!(entities[&EntityId(1)].facing, Direction::West);
    }

    #[test]
    fn test_conflict_earliest_request_wins() {
        let mut entities = BTreeMap::new();
        // Both target (0, 0)
        let mut south = MotionInfo::new(Cell::new(0, 1), Direction::South, 10);
        south.apply(&InputCmd::move_to(5, Direction::South));
        let mut north = MotionInfo::new(Cell::new(0, -1), Direction::North, 10);
        north.apply(&InputCmd::move_to(3, Direction::North));
        entities.insert(EntityId(1), south);
        entities.insert(EntityId(2), north);

        let result = step_to(&mut entities, 0, 1).unwrap();
        assert_eq!(result.started.len(), 1);
        assert_eq!(result.started[0].0, EntityId(2));
        assert_eq!(result.deferred, vec![EntityId(1)]);

        assert!(entities[&EntityId(2)].is_moving());
        let loser = &entities[&EntityId(1)];
        assert!(!loser.is_moving());
        assert_eq!(loser.move_request.map(|r| r.issued_at), Some(5));
    }

    #[test]
    fn test_conflict_tie_goes_to_lowest_id() {
        let mut entities = BTreeMap::new();
        let mut east = MotionInfo::new(Cell::new(-1, 0), Direction::East, 10);
        east.apply(&InputCmd::move_to(4, Direction::East));
        let mut west = MotionInfo::new(Cell::new(1, 0), Direction::West, 10);
        west.apply(&InputCmd::move_to(4, Direction::West));
        entities.insert(EntityId(9), east);
        entities.insert(EntityId(3), west);

        let result = step_to(&mut entities, 0, 1).unwrap();
        assert_eq!(result.started.len(), 1);
        assert_eq!(result.started[0].0, EntityId(3));
        assert_eq!(result.deferred, vec![EntityId(9)]);
        assert!(entities[&EntityId(9)].move_request.is_some());
    }

    #[test]
    fn test_two_players_different_speeds() {
        let mut entities = BTreeMap::new();
        let mut a = MotionInfo::new(Cell::new(0, 0), Direction::North, 35);
        a.apply(&InputCmd::move_to(0, Direction::North));
        let mut b = MotionInfo::new(Cell::new(5, 5), Direction::North, 40);
        b.apply(&InputCmd::move_to(0, Direction::East));
        entities.insert(EntityId(1), a);
        entities.insert(EntityId(2), b);

        let result = step_to(&mut entities, 0, 1).unwrap();
        assert_eq!(result.started.len(), 2);
        assert!(result.deferred.is_empty());

        let result = step_to(&mut entities, 1, 36).unwrap();
        assert_eq!(result.completed, vec![(EntityId(1), Cell::new(0, 1))]);
        assert!(entities[&EntityId(2)].is_moving());

        let result = step_to(&mut entities, 36, 41).unwrap();
        assert_eq!(result.completed, vec![(EntityId(2), Cell::new(6, 5))]);
        assert_eq!(entities[&EntityId(2)].facing, Direction::East);
    }

    #[test]
    fn test_request_while_moving_waits_for_arrival() {
        let mut entities = single(10);
        let mi = entities.get_mut(&EntityId(1)).unwrap();
        mi.apply(&InputCmd::move_to(0, Direction::North));
        step_to(&mut entities, 0, 1).unwrap();

        entities
            .get_mut(&EntityId(1))
            .unwrap()
            .apply(&InputCmd::move_to(1, Direction::East));
        let result = step_to(&mut entities, 1, 2).unwrap();
        assert!(result.started.is_empty());

        let result = step_to(&mut entities, 2, 10).unwrap();
        assert!(result.is_idle());

        // Arrival and the next departure happen in the same step
        let result = step_to(&mut entities, 10, 11).unwrap();
        assert_eq!(result.completed, vec![(EntityId(1), Cell::new(0, 1))]);
        assert_eq!(result.started.len(), 1);
        let action = result.started[0].1;
        assert_eq!(action.orig(), Cell::new(0, 1));
        assert_eq!(action.dest(), Cell::new(1, 1));
        assert_eq!(action.span(), Span::new(11, 21));
        assert_eq!(entities[&EntityId(1)].coord, Cell::new(0, 1));
    }

    #[test]
    fn test_rejects_non_advancing_time() {
        let mut entities = single(10);
        assert_eq!(
            step_to(&mut entities, 5, 5),
            Err(TickError::TimeNotAdvancing { now: 5, target: 5 })
        );
    }

    #[test]
    fn test_zero_speed_stalls_only_that_entity() {
        let mut entities = BTreeMap::new();
        let mut ok = MotionInfo::new(Cell::new(0, 0), Direction::North, 10);
        ok.apply(&InputCmd::move_to(0, Direction::North));
        let mut stuck = MotionInfo::new(Cell::new(3, 3), Direction::North, 0);
        stuck.apply(&InputCmd::move_to(0, Direction::East));
        entities.insert(EntityId(1), ok);
        entities.insert(EntityId(2), stuck.clone());

        let result = step_to(&mut entities, 0, 1).unwrap();
        assert_eq!(result.stalled, vec![EntityId(2)]);
        assert_eq!(result.started.len(), 1);
        assert_eq!(result.started[0].0, EntityId(1));
        assert!(entities[&EntityId(1)].is_moving());
        assert_eq!(entities[&EntityId(2)], stuck);

        // Later steps keep going
        let result = step_to(&mut entities, 1, 11).unwrap();
        assert_eq!(result.completed, vec![(EntityId(1), Cell::new(0, 1))]);
        assert_eq!(result.stalled, vec![EntityId(2)]);
    }
}
