//! Simulation Phases
//!
//! Per-tick traversal of the spatial index:
//! 1. Input phase - leaf chunks are handed to a handler that moves entities
//! 2. Broad phase - leaf chunks with at least one overlapping pair
//! 3. Narrow phase - pairs classified by the collision engine

use std::collections::BTreeSet;
use tracing::debug;

use crate::core::coord::Bounds;
use crate::core::time::WorldTime;
use crate::game::collision::{AnyCollision, Collision};
use crate::game::quad::{Entity, Quad, QuadError};
use crate::game::state::EntityId;

/// A leaf region and the entities in it.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk<E> {
    /// Leaf region
    pub bounds: Bounds,
    /// Entities filed under the region
    pub entities: Vec<E>,
}

/// Updates the entities of one chunk during the input phase.
pub trait InputPhaseHandler<E> {
    /// Return the chunk with entities replaced by their updated values.
    fn handle(&mut self, chunk: Chunk<E>, now: WorldTime) -> Chunk<E>;
}

impl<E, F> InputPhaseHandler<E> for F
where
    F: FnMut(Chunk<E>, WorldTime) -> Chunk<E>,
{
    fn handle(&mut self, chunk: Chunk<E>, now: WorldTime) -> Chunk<E> {
        self(chunk, now)
    }
}

/// A realized collision between two entities, `a` holding the lower id.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EntityCollision {
    /// Lower id
    pub a: EntityId,
    /// Higher id
    pub b: EntityId,
    /// Classification and timing
    pub collision: AnyCollision,
}

// =============================================================================
// INPUT PHASE
// =============================================================================

/// Run `handler` over every leaf and rebuild the index from its output.
///
/// Entities whose new cell lies outside the index bounds are left out of the
/// returned tree and handed back in the second value.
pub fn run_input_phase<E, H>(
    quad: &Quad<E>,
    handler: &mut H,
    now: WorldTime,
) -> Result<(Quad<E>, Vec<E>), QuadError>
where
    E: Entity,
    H: InputPhaseHandler<E>,
{
    let mut chunks = Vec::with_capacity(quad.leaf_count());
    quad.for_each_leaf(|bounds, entities| {
        chunks.push(Chunk { bounds: *bounds, entities: entities.to_vec() });
    });

    let world = quad.bounds();
    let mut next = quad.cleared();
    let mut out_of_bounds = Vec::new();

    for chunk in chunks {
        let chunk = handler.handle(chunk, now);
        for entity in chunk.entities {
            if world.contains(entity.cell()) {
                next = next.insert(entity)?;
            } else {
                out_of_bounds.push(entity);
            }
        }
    }

    out_of_bounds.sort_by_key(|e| e.id());
    Ok((next, out_of_bounds))
}

// =============================================================================
// BROAD PHASE
// =============================================================================

/// Group entities by leaf region, keeping only groups with an overlapping
/// pair.
pub fn run_broad_phase<E: Entity>(quad: &Quad<E>) -> Vec<Chunk<E>> {
    let mut regions = Vec::new();
    quad.for_each_leaf(|bounds, _| regions.push(*bounds));

    regions
        .into_iter()
        .filter_map(|bounds| {
            let entities = quad.query_bounds(&bounds);
            has_overlapping_pair(&entities).then_some(Chunk { bounds, entities })
        })
        .collect()
}

fn has_overlapping_pair<E: Entity>(entities: &[E]) -> bool {
    entities.iter().enumerate().any(|(i, a)| {
        let bounds = a.bounds();
        entities[i + 1..].iter().any(|b| bounds.overlaps(&b.bounds()))
    })
}

// =============================================================================
// NARROW PHASE
// =============================================================================

/// Classify every overlapping pair and report the realized collisions,
/// ordered by `(a, b)`.
///
/// A pair found in several chunks is tested once.
pub fn run_narrow_phase<E: Entity>(chunks: &[Chunk<E>], now: WorldTime) -> Vec<EntityCollision> {
    let mut seen = BTreeSet::new();
    let mut collisions = Vec::new();

    for chunk in chunks {
        for (i, first) in chunk.entities.iter().enumerate() {
            for second in &chunk.entities[i + 1..] {
                let (a, b) = if first.id() <= second.id() {
                    (first, second)
                } else {
                    (second, first)
                };

                if !seen.insert((a.id(), b.id())) {
                    continue;
                }
                if !a.bounds().overlaps(&b.bounds()) {
                    continue;
                }

                let collision = match (a.path_action(), b.path_action()) {
                    (Some(pa), Some(pb)) => pa.collides_with(pb),
                    (Some(pa), None) => pa.collides_with(b.cell()),
                    (None, Some(pb)) => pb.collides_with(a.cell()),
                    (None, None) => continue,
                };

                #[cfg(feature = "debug-tracing")]
                tracing::trace!(
                    a = %a.id(),
                    b = %b.id(),
                    kind = ?collision.collision_type(),
                    span = %collision.span(),
                    "pair classified"
                );

                if collision.is_realized_after(now) {
                    collisions.push(EntityCollision { a: a.id(), b: b.id(), collision });
                }
            }
        }
    }

    collisions.sort_by_key(|c| (c.a, c.b));
    debug!(pairs = seen.len(), realized = collisions.len(), "narrow phase");
    collisions
}
