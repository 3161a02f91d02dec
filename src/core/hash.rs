//! State Hashing for Verification
//!
//! Deterministic SHA-256 digests of world snapshots, used to compare
//! replays and to spot divergent states in logs.

use sha2::{Sha256, Digest};
use super::coord::{Bounds, Cell};
use super::path::PathAction;

/// Hash output type (256 bits / 32 bytes)
pub type StateHash = [u8; 32];

/// Deterministic hasher for simulation state.
///
/// Wraps SHA-256 with helpers for grid types.
/// Order of updates is critical for determinism.
pub struct StateHasher {
    hasher: Sha256,
}

impl StateHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Create hasher for world snapshots.
    pub fn for_world_state() -> Self {
        Self::new(b"TILESIM_WORLD_STATE_V1")
    }

    /// Update with raw bytes.
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Update with a u8 value.
    #[inline]
    pub fn update_u8(&mut self, value: u8) {
        self.hasher.update([value]);
    }

    /// Update with a u64 value (little-endian).
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with an i32 value (little-endian).
    #[inline]
    pub fn update_i32(&mut self, value: i32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a cell.
    #[inline]
    pub fn update_cell(&mut self, cell: Cell) {
        self.update_i32(cell.x);
        self.update_i32(cell.y);
    }

    /// Update with a rectangle.
    #[inline]
    pub fn update_bounds(&mut self, bounds: &Bounds) {
        self.update_cell(bounds.top_l);
        self.update_cell(bounds.bot_r);
    }

    /// Update with a path action.
    pub fn update_path(&mut self, path: &PathAction) {
        self.update_u64(path.span().start);
        self.update_u64(path.span().end);
        self.update_cell(path.orig());
        self.update_cell(path.dest());
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> StateHash {
        self.hasher.finalize().into()
    }
}
