//! Dense packed storage of the canonical simplex.
//!
//! [`TriangularStorage`] holds exactly one value per canonical cell with
//! every component below `side`, laid out in packed-index order (see
//! [`crate::simplex`]). Because slices are contiguous, growing the side
//! only appends cells and per-slice views are plain sub-slices.

use std::ops::Range;

use crate::canonical::{CanonicalCoordinate, is_canonical};
use crate::error::LatticeError;
use crate::simplex::{index_of, slice_len, slice_offset, to_usize, volume};
use crate::value::CellValue;

/// Packed values of every canonical cell below `side`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriangularStorage<V> {
    dimension: usize,
    side: u32,
    background: V,
    cells: Vec<V>,
}

impl<V: CellValue> TriangularStorage<V> {
    /// Creates a storage with every cell set to `fill`.
    ///
    /// `background` is what [`value`](Self::value) reports for coordinates
    /// outside the allocated region.
    pub fn new(dimension: usize, side: u32, fill: V, background: V) -> Result<Self, LatticeError> {
        let len = to_usize(volume(dimension, side)?)?;
        Ok(Self {
            dimension,
            side,
            background,
            cells: vec![fill; len],
        })
    }

    /// Rebuilds a storage from packed cells, checking the length.
    pub fn from_cells(
        dimension: usize,
        side: u32,
        background: V,
        cells: Vec<V>,
    ) -> Result<Self, LatticeError> {
        let expected = to_usize(volume(dimension, side)?)?;
        if cells.len() != expected {
            return Err(LatticeError::DimensionMismatch {
                expected,
                actual: cells.len(),
            });
        }
        Ok(Self {
            dimension,
            side,
            background,
            cells,
        })
    }

    /// Number of axes.
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of positions per axis in the allocated region.
    pub const fn side(&self) -> u32 {
        self.side
    }

    /// Value reported outside the allocated region.
    pub const fn background(&self) -> V {
        self.background
    }

    /// All cells in packed-index order.
    pub fn cells(&self) -> &[V] {
        &self.cells
    }

    /// Mutable access to all cells in packed-index order.
    pub fn cells_mut(&mut self) -> &mut [V] {
        &mut self.cells
    }

    /// Consumes the storage, returning its packed cells.
    pub fn into_cells(self) -> Vec<V> {
        self.cells
    }

    fn check(&self, components: &[u32]) -> Result<usize, LatticeError> {
        if components.len() != self.dimension {
            return Err(LatticeError::DimensionMismatch {
                expected: self.dimension,
                actual: components.len(),
            });
        }
        if !is_canonical(components) {
            return Err(LatticeError::NotCanonical {
                components: components.to_vec(),
            });
        }
        if components.first().is_some_and(|&c| c >= self.side) {
            return Err(LatticeError::OutOfBounds {
                components: components.to_vec(),
                side: self.side,
            });
        }
        to_usize(index_of(components)?)
    }

    /// Reads a canonical cell inside the allocated region.
    pub fn get(&self, components: &[u32]) -> Result<V, LatticeError> {
        let index = self.check(components)?;
        self.cells
            .get(index)
            .copied()
            .ok_or_else(|| LatticeError::OutOfBounds {
                components: components.to_vec(),
                side: self.side,
            })
    }

    /// Writes a canonical cell inside the allocated region.
    pub fn set(&mut self, components: &[u32], value: V) -> Result<(), LatticeError> {
        let index = self.check(components)?;
        let side = self.side;
        let slot = self
            .cells
            .get_mut(index)
            .ok_or_else(|| LatticeError::OutOfBounds {
                components: components.to_vec(),
                side,
            })?;
        *slot = value;
        Ok(())
    }

    /// Adds to a canonical cell, returning the new value.
    pub fn add_at(&mut self, components: &[u32], amount: V) -> Result<V, LatticeError> {
        let current = self.get(components)?;
        let updated = current
            .checked_add(amount)
            .ok_or(LatticeError::ValueOverflow { operation: "add" })?;
        self.set(components, updated)?;
        Ok(updated)
    }

    /// Reads any signed coordinate, folding it onto the canonical region.
    ///
    /// Coordinates outside the allocated region read as the background.
    pub fn value(&self, coords: &[i32]) -> Result<V, LatticeError> {
        let canonical = CanonicalCoordinate::from_coords(coords);
        self.value_canonical(canonical.components())
    }

    /// Reads a canonical cell, returning the background outside the region.
    pub fn value_canonical(&self, components: &[u32]) -> Result<V, LatticeError> {
        if components.first().is_some_and(|&c| c >= self.side) {
            return Ok(self.background);
        }
        self.get(components)
    }

    /// Packed range of the slice whose leading component is `x`.
    pub fn slice_range(&self, x: u32) -> Result<Range<usize>, LatticeError> {
        let start = to_usize(slice_offset(self.dimension, x)?)?;
        let len = to_usize(slice_len(self.dimension, x)?)?;
        let end = start
            .checked_add(len)
            .ok_or(LatticeError::IndexOverflow {
                dimension: self.dimension,
                side: x,
            })?;
        Ok(start..end)
    }

    /// Cells whose leading component is `x`, or `None` outside the region.
    pub fn slice(&self, x: u32) -> Option<&[V]> {
        if x >= self.side {
            return None;
        }
        let range = self.slice_range(x).ok()?;
        self.cells.get(range)
    }

    /// Mutable cells whose leading component is `x`.
    pub fn slice_mut(&mut self, x: u32) -> Option<&mut [V]> {
        if x >= self.side {
            return None;
        }
        let range = self.slice_range(x).ok()?;
        self.cells.get_mut(range)
    }

    /// Returns a copy grown to `new_side`, new cells set to the background.
    pub fn grown(&self, new_side: u32) -> Result<Self, LatticeError> {
        let mut copy = self.clone();
        copy.grow(new_side)?;
        Ok(copy)
    }

    /// Grows the region in place; new cells take the background value.
    pub fn grow(&mut self, new_side: u32) -> Result<(), LatticeError> {
        if new_side < self.side {
            return Err(LatticeError::Shrink {
                current: self.side,
                requested: new_side,
            });
        }
        let len = to_usize(volume(self.dimension, new_side)?)?;
        self.cells.resize(len, self.background);
        self.side = new_side;
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::cast_possible_wrap
)]
mod tests {
    use super::*;
    use crate::simplex::SimplexIter;

    #[test]
    fn set_and_get_round_trip() {
        let mut storage = TriangularStorage::new(3, 4, 0_i64, 0).unwrap();
        storage.set(&[3, 1, 1], 17).unwrap();
        assert_eq!(storage.get(&[3, 1, 1]).unwrap(), 17);
        assert_eq!(storage.value(&[-1, 3, 1]).unwrap(), 17);
        assert_eq!(storage.value(&[1, -1, -3]).unwrap(), 17);
    }

    #[test]
    fn outside_reads_background() {
        let storage = TriangularStorage::new(2, 3, 0_i32, -4).unwrap();
        assert_eq!(storage.value(&[3, 0]).unwrap(), -4);
        assert_eq!(storage.value(&[0, -9]).unwrap(), -4);
        assert_eq!(storage.value(&[2, 2]).unwrap(), 0);
    }

    #[test]
    fn rejects_bad_coordinates() {
        let mut storage = TriangularStorage::new(2, 3, 0_i32, 0).unwrap();
        assert!(matches!(storage.get(&[1, 2]), Err(LatticeError::NotCanonical { .. })));
        assert!(matches!(storage.get(&[3, 0]), Err(LatticeError::OutOfBounds { .. })));
        assert!(matches!(
            storage.set(&[1], 1),
            Err(LatticeError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn add_at_detects_overflow() {
        let mut storage = TriangularStorage::new(1, 3, i32::MAX, 0).unwrap();
        assert_eq!(
            storage.add_at(&[1], 1),
            Err(LatticeError::ValueOverflow { operation: "add" })
        );
        assert_eq!(storage.add_at(&[0], -1).unwrap(), i32::MAX - 1);
    }

    #[test]
    fn growth_preserves_values_and_fills_background() {
        let mut storage = TriangularStorage::new(3, 3, 0_i64, 2).unwrap();
        for (i, coords) in SimplexIter::full(3, 3).enumerate() {
            storage.set(&coords, i as i64).unwrap();
        }
        let grown = storage.grown(5).unwrap();
        assert_eq!(grown.side(), 5);
        for (i, coords) in SimplexIter::full(3, 3).enumerate() {
            assert_eq!(grown.get(&coords).unwrap(), i as i64);
        }
        assert_eq!(grown.get(&[4, 0, 0]).unwrap(), 2);
        assert_eq!(grown.get(&[3, 3, 3]).unwrap(), 2);
        assert!(matches!(storage.grow(2), Err(LatticeError::Shrink { .. })));
    }

    #[test]
    fn slices_are_contiguous_views() {
        let mut storage = TriangularStorage::new(2, 4, 0_i32, 0).unwrap();
        storage.set(&[2, 0], 5).unwrap();
        storage.set(&[2, 2], 9).unwrap();
        assert_eq!(storage.slice(2).unwrap(), &[5, 0, 9]);
        assert!(storage.slice(4).is_none());
        storage.slice_mut(3).unwrap()[3] = 1;
        assert_eq!(storage.get(&[3, 3]).unwrap(), 1);
    }
}
