//! Spatial Index
//!
//! Persistent quad-tree over grid cells.
//!
//! Nodes are shared through `Arc`; `insert` and `remove` copy only the path
//! from the root to the touched leaf and return a new tree, so snapshots
//! taken before an update stay valid.

use std::sync::Arc;
use thiserror::Error;

use crate::core::coord::{Bounds, Cell};
use crate::core::path::PathAction;
use crate::game::state::EntityId;

// =============================================================================
// ENTITY TRAIT
// =============================================================================

/// Anything that can be stored in the index.
pub trait Entity: Clone {
    /// Stable identifier.
    fn id(&self) -> EntityId;

    /// Cell the entity is filed under.
    fn cell(&self) -> Cell;

    /// Area the entity occupies. Defaults to its cell.
    fn bounds(&self) -> Bounds {
        Bounds::cell(self.cell())
    }

    /// The in-flight motion, if any.
    fn path_action(&self) -> Option<PathAction> {
        None
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Construction and placement faults.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuadError {
    /// A leaf must be allowed to hold at least one entity.
    #[error("quad threshold must be at least 1")]
    ZeroThreshold,

    /// Corners are not ordered.
    #[error("invalid quad bounds {0}")]
    InvalidBounds(Bounds),

    /// The entity's cell lies outside the tree.
    #[error("entity {id} at {cell} is outside {bounds}")]
    OutOfBounds {
        /// Entity
        id: EntityId,
        /// Offending cell
        cell: Cell,
        /// Tree bounds
        bounds: Bounds,
    },
}

// =============================================================================
// NODES
// =============================================================================

#[derive(Debug)]
enum Node<E> {
    Leaf {
        bounds: Bounds,
        entities: Vec<E>,
    },
    Branch {
        bounds: Bounds,
        children: [Arc<Node<E>>; 4],
        len: usize,
    },
}

impl<E: Entity> Node<E> {
    fn empty(bounds: Bounds) -> Arc<Self> {
        Arc::new(Node::Leaf { bounds, entities: Vec::new() })
    }

    fn bounds(&self) -> &Bounds {
        match self {
            Node::Leaf { bounds, .. } | Node::Branch { bounds, .. } => bounds,
        }
    }

    fn len(&self) -> usize {
        match self {
            Node::Leaf { entities, .. } => entities.len(),
            Node::Branch { len, .. } => *len,
        }
    }

    fn insert(&self, entity: E, threshold: usize) -> Arc<Self> {
        match self {
            Node::Leaf { bounds, entities } => {
                let mut entities = entities.clone();
                entities.push(entity);

                match bounds.quads() {
                    Some(quads) if entities.len() > threshold => {
                        Self::split(quads, entities, threshold)
                    }
                    _ => Arc::new(Node::Leaf { bounds: *bounds, entities }),
                }
            }

            Node::Branch { bounds, children, len } => {
                let mut children = children.clone();
                let cell = entity.cell();
                if let Some(child) = children.iter_mut().find(|c| c.bounds().contains(cell)) {
                    *child = child.insert(entity, threshold);
                }
                Arc::new(Node::Branch { bounds: *bounds, children, len: len + 1 })
            }
        }
    }

    fn split(quads: [Bounds; 4], entities: Vec<E>, threshold: usize) -> Arc<Self> {
        let bounds = Bounds::new(quads[0].top_l, quads[2].bot_r);
        let len = entities.len();
        let mut children = quads.map(Self::empty);

        for entity in entities {
            let cell = entity.cell();
            if let Some(child) = children.iter_mut().find(|c| c.bounds().contains(cell)) {
                *child = child.insert(entity, threshold);
            }
        }

        Arc::new(Node::Branch { bounds, children, len })
    }

    /// Returns `None` when nothing was removed.
    fn remove(&self, id: EntityId, cell: Cell, threshold: usize) -> Option<Arc<Self>> {
        match self {
            Node::Leaf { bounds, entities } => {
                let index = entities.iter().position(|e| e.id() == id)?;
                let mut entities = entities.clone();
                entities.remove(index);
                Some(Arc::new(Node::Leaf { bounds: *bounds, entities }))
            }

            Node::Branch { bounds, children, len } => {
                let index = children.iter().position(|c| c.bounds().contains(cell))?;
                let replaced = children[index].remove(id, cell, threshold)?;

                let len = len - 1;
                if len <= threshold {
                    let mut entities = Vec::with_capacity(len);
                    for (i, child) in children.iter().enumerate() {
                        if i == index {
                            replaced.collect(&mut entities);
                        } else {
                            child.collect(&mut entities);
                        }
                    }
                    return Some(Arc::new(Node::Leaf { bounds: *bounds, entities }));
                }

                let mut children = children.clone();
                children[index] = replaced;
                Some(Arc::new(Node::Branch { bounds: *bounds, children, len }))
            }
        }
    }

    fn collect(&self, out: &mut Vec<E>) {
        match self {
            Node::Leaf { entities, .. } => out.extend(entities.iter().cloned()),
            Node::Branch { children, .. } => {
                for child in children {
                    child.collect(out);
                }
            }
        }
    }

    fn query(&self, query: &Bounds, out: &mut Vec<E>) {
        match self {
            Node::Leaf { entities, .. } => {
                out.extend(entities.iter().filter(|e| e.bounds().overlaps(query)).cloned());
            }
            Node::Branch { children, .. } => {
                // A moving entity reaches at most one cell past its leaf
                for child in children {
                    if child.bounds().expand(1).overlaps(query) {
                        child.query(query, out);
                    }
                }
            }
        }
    }

    fn visit_leaves<'a, F>(&'a self, f: &mut F)
    where
        F: FnMut(&'a Bounds, &'a [E]),
    {
        match self {
            Node::Leaf { bounds, entities } => f(bounds, entities),
            Node::Branch { children, .. } => {
                for child in children {
                    child.visit_leaves(f);
                }
            }
        }
    }
}

// =============================================================================
// QUAD TREE
// =============================================================================

/// Persistent quad-tree. Cloning is O(1).
#[derive(Debug)]
pub struct Quad<E> {
    root: Arc<Node<E>>,
    threshold: usize,
}

impl<E> Clone for Quad<E> {
    fn clone(&self) -> Self {
        Self {
            root: Arc::clone(&self.root),
            threshold: self.threshold,
        }
    }
}

impl<E: Entity> Quad<E> {
    /// Create an empty tree. Leaves split once they hold more than
    /// `threshold` entities.
    pub fn new(bounds: Bounds, threshold: usize) -> Result<Self, QuadError> {
        if threshold == 0 {
            return Err(QuadError::ZeroThreshold);
        }
        if !bounds.is_valid() {
            return Err(QuadError::InvalidBounds(bounds));
        }
        Ok(Self {
            root: Node::empty(bounds),
            threshold,
        })
    }

    /// Region covered by the tree.
    #[inline]
    pub fn bounds(&self) -> Bounds {
        *self.root.bounds()
    }

    /// Split threshold.
    #[inline]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Number of entities stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.root.len()
    }

    /// True if no entity is stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// An empty tree with the same bounds and threshold.
    pub fn cleared(&self) -> Self {
        Self {
            root: Node::empty(self.bounds()),
            threshold: self.threshold,
        }
    }

    /// Return a tree that also holds `entity`.
    ///
    /// Ids are not deduplicated; remove the old value first when moving an
    /// entity.
    pub fn insert(&self, entity: E) -> Result<Self, QuadError> {
        let bounds = self.bounds();
        let cell = entity.cell();
        if !bounds.contains(cell) {
            return Err(QuadError::OutOfBounds { id: entity.id(), cell, bounds });
        }
        Ok(Self {
            root: self.root.insert(entity, self.threshold),
            threshold: self.threshold,
        })
    }

    /// Return a tree without `entity`, looked up by id in the leaf holding
    /// its cell. Unknown entities leave the tree unchanged.
    pub fn remove(&self, entity: &E) -> Self {
        match self.root.remove(entity.id(), entity.cell(), self.threshold) {
            Some(root) => Self { root, threshold: self.threshold },
            None => self.clone(),
        }
    }

    /// Find an entity by id anywhere in the tree.
    pub fn find(&self, id: EntityId) -> Option<E> {
        let mut found = None;
        self.root.visit_leaves(&mut |_, entities| {
            if found.is_none() {
                found = entities.iter().find(|e| e.id() == id).cloned();
            }
        });
        found
    }

    /// Entities whose bounds overlap `bounds`, ordered by id.
    pub fn query_bounds(&self, bounds: &Bounds) -> Vec<E> {
        let mut out = Vec::new();
        self.root.query(bounds, &mut out);
        out.sort_by_key(|e| e.id());
        out
    }

    /// Entities whose bounds cover `cell`, ordered by id.
    pub fn query_cell(&self, cell: Cell) -> Vec<E> {
        self.query_bounds(&Bounds::cell(cell))
    }

    /// All entities, ordered by id.
    pub fn entities(&self) -> Vec<E> {
        let mut out = Vec::with_capacity(self.len());
        self.root.collect(&mut out);
        out.sort_by_key(|e| e.id());
        out
    }

    /// Visit every leaf in NW, NE, SE, SW order.
    pub fn for_each_leaf<'a, F>(&'a self, mut f: F)
    where
        F: FnMut(&'a Bounds, &'a [E]),
    {
        self.root.visit_leaves(&mut f);
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        let mut count = 0;
        self.for_each_leaf(|_, _| count += 1);
        count
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal entity for index tests.
    #[derive(Clone, Debug, PartialEq)]
    pub(crate) struct Dot {
        pub id: u64,
        pub cell: Cell,
        pub path: Option<PathAction>,
    }

    impl Dot {
        pub fn at(id: u64, x: i32, y: i32) -> Self {
            Self { id, cell: Cell::new(x, y), path: None }
        }
    }

    impl Entity for Dot {
        fn id(&self) -> EntityId {
            EntityId(self.id)
        }

        fn cell(&self) -> Cell {
            self.cell
        }

        fn bounds(&self) -> Bounds {
            match &self.path {
                Some(path) => path.bounds(),
                None => Bounds::cell(self.cell),
            }
        }

        fn path_action(&self) -> Option<PathAction> {
            self.path
        }
    }

    fn world() -> Bounds {
        Bounds::new(Cell::new(-8, 7), Cell::new(7, -8))
    }

    #[test]
    fn test_new_rejects_bad_config() {
        assert_eq!(Quad::<Dot>::new(world(), 0).unwrap_err(), QuadError::ZeroThreshold);
        let inverted = Bounds::new(Cell::new(5, 0), Cell::new(0, 5));
        assert!(matches!(Quad::<Dot>::new(inverted, 4), Err(QuadError::InvalidBounds(_))));
    }

    #[test]
    fn test_insert_out_of_bounds() {
        let quad = Quad::new(world(), 4).unwrap();
        match quad.insert(Dot::at(1, 8, 0)) {
            Err(QuadError::OutOfBounds { id, cell, .. }) => {
                assert_eq!(id, EntityId(1));
                assert_eq!(cell, Cell::new(8, 0));
            }
            other => panic!("expected OutOfBounds, got {:?}", other),
        }
    }

    #[test]
    fn test_split_over_threshold() {
        let mut quad = Quad::new(world(), 2).unwrap();
        for (i, (x, y)) in [(-5, 5), (5, 5), (5, -5)].into_iter().enumerate() {
            quad = quad.insert(Dot::at(i as u64, x, y)).unwrap();
        }
        assert_eq!(quad.len(), 3);
        assert_eq!(quad.leaf_count(), 4);

        let mut per_leaf = Vec::new();
        quad.for_each_leaf(|_, entities| per_leaf.push(entities.len()));
        assert_eq!(per_leaf, vec![1, 1, 1, 0]);
    }

    #[test]
    fn test_same_cell_stops_splitting_at_unit_leaves() {
        let mut quad = Quad::new(world(), 1).unwrap();
        for i in 0..5 {
            quad = quad.insert(Dot::at(i, 0, 0)).unwrap();
        }
        assert_eq!(quad.len(), 5);
        assert_eq!(quad.query_cell(Cell::new(0, 0)).len(), 5);
    }

    #[test]
    fn test_updates_are_persistent() {
        let empty = Quad::new(world(), 2).unwrap();
        let one = empty.insert(Dot::at(1, 0, 0)).unwrap();
        let two = one.insert(Dot::at(2, 1, 1)).unwrap();
        let back = two.remove(&Dot::at(2, 1, 1));

        assert!(empty.is_empty());
        assert_eq!(one.len(), 1);
        assert_eq!(two.len(), 2);
        assert_eq!(back.entities(), one.entities());
    }

    #[test]
    fn test_remove_collapses_branch() {
        let mut quad = Quad::new(world(), 2).unwrap();
        let dots = [Dot::at(1, -5, 5), Dot::at(2, 5, 5), Dot::at(3, 5, -5)];
        for dot in &dots {
            quad = quad.insert(dot.clone()).unwrap();
        }
        assert_eq!(quad.leaf_count(), 4);

        let quad = quad.remove(&dots[1]);
        assert_eq!(quad.leaf_count(), 1);
        assert_eq!(quad.entities(), vec![dots[0].clone(), dots[2].clone()]);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let quad = Quad::new(world(), 2).unwrap().insert(Dot::at(1, 0, 0)).unwrap();
        let same = quad.remove(&Dot::at(9, 0, 0));
        assert_eq!(same.len(), 1);
    }

    #[test]
    fn test_query_finds_entity_transiting_into_neighbour_leaf() {
        use crate::core::time::Span;

        let mut quad = Quad::new(world(), 1).unwrap();
        // (-1, 0) sits in the NW quadrant, moving east into NE
        let mut mover = Dot::at(1, -1, 0);
        mover.path = Some(PathAction::new(Span::new(0, 10), Cell::new(-1, 0), Cell::new(0, 0)).unwrap());
        quad = quad.insert(mover.clone()).unwrap();
        quad = quad.insert(Dot::at(2, 5, 5)).unwrap();

        let found = quad.query_cell(Cell::new(0, 0));
        assert_eq!(found, vec![mover]);
        assert!(quad.query_cell(Cell::new(3, 3)).is_empty());
    }

    #[test]
    fn test_query_bounds_and_find() {
        let mut quad = Quad::new(world(), 2).unwrap();
        for (i, x) in (-8..8).step_by(2).enumerate() {
            quad = quad.insert(Dot::at(i as u64, x, 0)).unwrap();
        }
        let strip = Bounds::new(Cell::new(-2, 1), Cell::new(2, -1));
        let ids: Vec<u64> = quad.query_bounds(&strip).iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![3, 4, 5]);

        assert_eq!(quad.find(EntityId(7)).map(|d| d.cell), Some(Cell::new(6, 0)));
        assert!(quad.find(EntityId(99)).is_none());
    }
}
