//! Terrain
//!
//! Row-major grid of terrain types over an inclusive cell rectangle.
//! Row 0 is the northernmost row (`bounds.top_l.y`).
//!
//! The string form is one character per cell, one line per row, with a
//! leading and trailing newline:
//!
//! ```text
//!
//! GRG
//! DDD
//! ```

use std::fmt;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::coord::{Bounds, Cell};

// =============================================================================
// ERRORS
// =============================================================================

/// Geometric and parse faults.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TerrainError {
    /// Slicing by a rectangle that misses the map entirely.
    #[error("invalid terrain map slicing operation: {requested} does not overlap {map}")]
    NoOverlap {
        /// Map bounds
        map: Bounds,
        /// Requested slice
        requested: Bounds,
    },

    /// Row count or row width doesn't match the bounds.
    #[error("terrain is {found_width}x{found_height}, bounds need {width}x{height}")]
    Dimensions {
        /// Columns required by the bounds
        width: usize,
        /// Rows required by the bounds
        height: usize,
        /// Columns found (first bad row)
        found_width: usize,
        /// Rows found
        found_height: usize,
    },

    /// Character is not a terrain type.
    #[error("unknown terrain type {0:?}")]
    UnknownTerrain(char),
}

// =============================================================================
// TERRAIN TYPE
// =============================================================================

/// Terrain of a single cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerrainType {
    /// Grass
    #[default]
    #[serde(rename = "G")]
    Grass,
    /// Dirt
    #[serde(rename = "D")]
    Dirt,
    /// Rock
    #[serde(rename = "R")]
    Rock,
}

impl TerrainType {
    /// Single character form.
    pub const fn as_char(self) -> char {
        match self {
            TerrainType::Grass => 'G',
            TerrainType::Dirt => 'D',
            TerrainType::Rock => 'R',
        }
    }

    /// Stable byte for hashing.
    pub const fn as_u8(self) -> u8 {
        self.as_char() as u8
    }
}

impl TryFrom<char> for TerrainType {
    type Error = TerrainError;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        match c {
            'G' => Ok(TerrainType::Grass),
            'D' => Ok(TerrainType::Dirt),
            'R' => Ok(TerrainType::Rock),
            other => Err(TerrainError::UnknownTerrain(other)),
        }
    }
}

// =============================================================================
// TERRAIN MAP
// =============================================================================

/// Terrain over a rectangle of cells.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TerrainMap {
    bounds: Bounds,
    rows: Vec<Vec<TerrainType>>,
}

impl TerrainMap {
    /// A map with every cell set to `terrain`.
    pub fn filled(bounds: Bounds, terrain: TerrainType) -> Self {
        let (w, h) = (bounds.width().max(0) as usize, bounds.height().max(0) as usize);
        Self {
            bounds,
            rows: vec![vec![terrain; w]; h],
        }
    }

    /// Parse the string form.
    ///
    /// A single character fills the whole map.
    pub fn parse(bounds: Bounds, terrain: &str) -> Result<Self, TerrainError> {
        let trimmed = terrain.trim_matches('\n');

        let mut chars = trimmed.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return Ok(Self::filled(bounds, TerrainType::try_from(c)?));
        }

        let (width, height) = (bounds.width().max(0) as usize, bounds.height().max(0) as usize);
        let rows = trimmed
            .lines()
            .map(|line| line.chars().map(TerrainType::try_from).collect::<Result<Vec<_>, _>>())
            .collect::<Result<Vec<_>, _>>()?;

        let bad_row = rows.iter().find(|row| row.len() != width);
        if rows.len() != height || bad_row.is_some() {
            return Err(TerrainError::Dimensions {
                width,
                height,
                found_width: bad_row.map_or(width, |row| row.len()),
                found_height: rows.len(),
            });
        }

        Ok(Self { bounds, rows })
    }

    /// Rectangle covered.
    #[inline]
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Rows, north to south.
    #[inline]
    pub fn rows(&self) -> &[Vec<TerrainType>] {
        &self.rows
    }

    fn index(&self, cell: Cell) -> Option<(usize, usize)> {
        if !self.bounds.contains(cell) {
            return None;
        }
        let row = (self.bounds.top_l.y - cell.y) as usize;
        let col = (cell.x - self.bounds.top_l.x) as usize;
        Some((row, col))
    }

    /// Terrain at `cell`, `None` outside the map.
    pub fn cell(&self, cell: Cell) -> Option<TerrainType> {
        self.index(cell).map(|(row, col)| self.rows[row][col])
    }

    /// Set the terrain at `cell`. Returns false outside the map.
    pub fn set(&mut self, cell: Cell, terrain: TerrainType) -> bool {
        match self.index(cell) {
            Some((row, col)) => {
                self.rows[row][col] = terrain;
                true
            }
            None => false,
        }
    }

    /// Copy of the part of the map inside `bounds`, clipped to the map.
    pub fn slice(&self, bounds: &Bounds) -> Result<TerrainMap, TerrainError> {
        let inner = self.bounds.intersection(bounds).ok_or(TerrainError::NoOverlap {
            map: self.bounds,
            requested: *bounds,
        })?;

        let row_start = (self.bounds.top_l.y - inner.top_l.y) as usize;
        let col_start = (inner.top_l.x - self.bounds.top_l.x) as usize;
        let (w, h) = (inner.width() as usize, inner.height() as usize);

        let rows = self.rows[row_start..row_start + h]
            .iter()
            .map(|row| row[col_start..col_start + w].to_vec())
            .collect();

        Ok(TerrainMap { bounds: inner, rows })
    }

    /// Every cell with its terrain, row by row.
    pub fn cells(&self) -> impl Iterator<Item = (Cell, TerrainType)> + '_ {
        let top_l = self.bounds.top_l;
        self.rows.iter().enumerate().flat_map(move |(r, row)| {
            row.iter()
                .enumerate()
                .map(move |(c, t)| (Cell::new(top_l.x + c as i32, top_l.y - r as i32), *t))
        })
    }

    /// Changes needed to turn `self` into `next`.
    ///
    /// Cells of `next` outside `self` come back as slices; cells in both
    /// whose terrain differs come back as type changes. Without any overlap
    /// the whole of `next` is a single slice.
    pub fn diff(&self, next: &TerrainMap) -> TerrainDiff {
        let Some(inner) = self.bounds.intersection(&next.bounds) else {
            return TerrainDiff::full(next);
        };

        let slices = next
            .bounds
            .difference(&self.bounds)
            .iter()
            .filter_map(|region| next.slice(region).ok())
            .collect();

        let changes = next
            .cells()
            .filter(|(cell, _)| inner.contains(*cell))
            .filter(|(cell, terrain)| self.cell(*cell) != Some(*terrain))
            .map(|(cell, terrain_type)| TerrainTypeChange { cell, terrain_type })
            .collect();

        TerrainDiff { slices, changes }
    }
}

impl fmt::Display for TerrainMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        for row in &self.rows {
            for terrain in row {
                write!(f, "{}", terrain.as_char())?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

// =============================================================================
// DIFF
// =============================================================================

/// One cell changing terrain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerrainTypeChange {
    /// Cell
    pub cell: Cell,
    /// New terrain
    pub terrain_type: TerrainType,
}

/// Terrain changes between two snapshots.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TerrainDiff {
    /// Newly visible regions
    pub slices: Vec<TerrainMap>,
    /// Cells whose terrain changed
    pub changes: Vec<TerrainTypeChange>,
}

impl TerrainDiff {
    /// The whole map as a single slice.
    pub fn full(map: &TerrainMap) -> Self {
        Self {
            slices: vec![map.clone()],
            changes: Vec::new(),
        }
    }

    /// True if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty() && self.changes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(x: i32, y: i32) -> Cell {
        Cell::new(x, y)
    }

    fn grass() -> TerrainMap {
        TerrainMap::parse(Bounds::new(c(-2, 3), c(2, -2)), "G").unwrap()
    }

    fn full_map() -> TerrainMap {
        TerrainMap::parse(Bounds::new(c(0, 0), c(3, -3)), "\nGRGG\nDDDD\nDRRR\nDGGR\n").unwrap()
    }

    #[test]
    fn test_filled_dimensions() {
        let map = grass();
        assert_eq!(map.rows().len(), 6);
        assert_eq!(map.rows()[0].len(), 5);
        assert!(map.cells().all(|(_, t)| t == TerrainType::Grass));
    }

    #[test]
    fn test_to_string() {
        let mut map = grass();
        assert_eq!(map.to_string(), "\nGGGGG\nGGGGG\nGGGGG\nGGGGG\nGGGGG\nGGGGG\n");

        // rows[2][3] and rows[3][2]
        map.set(c(1, 1), TerrainType::Dirt);
        map.set(c(0, 0), TerrainType::Rock);
        assert_eq!(map.to_string(), "\nGGGGG\nGGGGG\nGGGDG\nGGRGG\nGGGGG\nGGGGG\n");
    }

    #[test]
    fn test_parse_string_form() {
        let text = "\nRRRRRD\nRRRRRD\nRRRRRD\nRRRRRD\nRRRRRD\nRRRRRD\nDDDDDD\n";
        let map = TerrainMap::parse(Bounds::new(c(0, 0), c(5, -6)), text).unwrap();
        assert_eq!(map.to_string(), text);
    }

    #[test]
    fn test_parse_errors() {
        let bounds = Bounds::new(c(0, 0), c(1, -1));
        assert_eq!(
            TerrainMap::parse(bounds, "\nGG\nGX\n"),
            Err(TerrainError::UnknownTerrain('X'))
        );
        assert!(matches!(
            TerrainMap::parse(bounds, "\nGG\nGGG\n"),
            Err(TerrainError::Dimensions { found_width: 3, .. })
        ));
        assert!(matches!(
            TerrainMap::parse(bounds, "\nGG\n"),
            Err(TerrainError::Dimensions { found_height: 1, .. })
        ));
    }

    #[test]
    fn test_access_by_cell() {
        let mut map = grass();
        map.set(c(-2, 3), TerrainType::Rock);
        assert_eq!(map.cell(c(-2, 3)), Some(TerrainType::Rock));
        assert_eq!(map.cell(c(-1, 2)), Some(TerrainType::Grass));
        assert_eq!(map.cell(c(9, 9)), None);
        assert!(!map.set(c(9, 9), TerrainType::Dirt));
    }

    #[test]
    fn test_slice() {
        let mut map = grass();
        map.set(c(0, 2), TerrainType::Dirt);
        map.set(c(1, -1), TerrainType::Rock);

        let slice = map.slice(&Bounds::new(c(-1, 2), c(1, -1))).unwrap();
        assert_eq!(slice.to_string(), "\nGDG\nGGG\nGGG\nGGR\n");

        let again = slice.slice(&Bounds::new(c(-1, 2), c(0, 2))).unwrap();
        assert_eq!(again.to_string(), "\nGD\n");
    }

    #[test]
    fn test_slice_clips_to_map() {
        let slice = grass().slice(&Bounds::new(c(-5, 2), c(2, -1))).unwrap();
        assert_eq!(slice.bounds(), Bounds::new(c(-2, 2), c(2, -1)));
    }

    #[test]
    fn test_slice_without_overlap_fails() {
        let requested = Bounds::new(c(-3000, -3000), c(-3000, -3001));
        assert!(matches!(
            grass().slice(&requested),
            Err(TerrainError::NoOverlap { .. })
        ));
    }

    #[test]
    fn test_diff_same_is_empty() {
        let map = full_map();
        assert!(map.diff(&map).is_empty());
    }

    #[test]
    fn test_diff_row_and_column_shifts() {
        let full = full_map();
        let old = full.slice(&Bounds::new(c(1, -1), c(2, -2))).unwrap();

        let cases = [
            (Bounds::new(c(1, 0), c(2, -1)), Bounds::new(c(1, 0), c(2, 0)), "\nRG\n"),
            (Bounds::new(c(1, -2), c(2, -3)), Bounds::new(c(1, -3), c(2, -3)), "\nGG\n"),
            (Bounds::new(c(0, -1), c(1, -2)), Bounds::new(c(0, -1), c(0, -2)), "\nD\nD\n"),
            (Bounds::new(c(2, -1), c(3, -2)), Bounds::new(c(3, -1), c(3, -2)), "\nD\nR\n"),
        ];

        for (view, expected_bounds, expected_terrain) in cases {
            let next = full.slice(&view).unwrap();
            let diff = old.diff(&next);
            assert_eq!(diff.slices.len(), 1, "view {}", view);
            assert_eq!(diff.slices[0].bounds(), expected_bounds);
            assert_eq!(diff.slices[0].to_string(), expected_terrain);
            assert!(diff.changes.is_empty());
        }
    }

    #[test]
    fn test_diff_reports_type_changes() {
        let old = full_map();
        let mut next = old.clone();
        next.set(c(1, 0), TerrainType::Grass);

        let diff = old.diff(&next);
        assert!(diff.slices.is_empty());
        assert_eq!(
            diff.changes,
            vec![TerrainTypeChange { cell: c(1, 0), terrain_type: TerrainType::Grass }]
        );
    }

    #[test]
    fn test_diff_disjoint_is_full() {
        let old = full_map().slice(&Bounds::new(c(0, 0), c(0, 0))).unwrap();
        let next = full_map().slice(&Bounds::new(c(3, -3), c(3, -3))).unwrap();
        assert_eq!(old.diff(&next), TerrainDiff::full(&next));
    }
}
