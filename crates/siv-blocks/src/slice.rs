//! One slice of the canonical simplex.
//!
//! A slice holds every canonical cell sharing the leading component `x`,
//! packed in the order of the remaining components.

use serde::{Deserialize, Serialize};
use siv_lattice::CellValue;
use siv_lattice::simplex::{slice_len, to_usize};

use crate::error::BlockError;

/// The cells of the canonical region whose leading component is `x`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "V: CellValue")]
pub struct GridSlice<V> {
    x: u32,
    values: Vec<V>,
}

impl<V: CellValue> GridSlice<V> {
    /// Wraps `values` as slice `x`, checking the cell count.
    pub fn new(dimension: usize, x: u32, values: Vec<V>) -> Result<Self, BlockError> {
        let expected = expected_len(dimension, x)?;
        if values.len() != expected {
            return Err(BlockError::SliceLength {
                x,
                expected,
                actual: values.len(),
            });
        }
        Ok(Self { x, values })
    }

    /// Slice `x` with every cell set to `fill`.
    pub fn filled(dimension: usize, x: u32, fill: V) -> Result<Self, BlockError> {
        let len = expected_len(dimension, x)?;
        Ok(Self {
            x,
            values: vec![fill; len],
        })
    }

    /// Position of the slice on the leading axis.
    pub const fn x(&self) -> u32 {
        self.x
    }

    /// Cells in packed order.
    pub fn values(&self) -> &[V] {
        &self.values
    }

    /// Mutable cells in packed order.
    pub fn values_mut(&mut self) -> &mut [V] {
        &mut self.values
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the slice holds no cells.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Consumes the slice, returning its cells.
    pub fn into_values(self) -> Vec<V> {
        self.values
    }
}

/// Number of cells a slice at `x` holds in a `dimension`-axis lattice.
pub fn expected_len(dimension: usize, x: u32) -> Result<usize, BlockError> {
    Ok(to_usize(slice_len(dimension, x)?)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn lengths_are_checked() {
        assert!(GridSlice::new(2, 3, vec![0_i32; 4]).is_ok());
        assert!(matches!(
            GridSlice::new(2, 3, vec![0_i32; 3]),
            Err(BlockError::SliceLength {
                x: 3,
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn filled_slices_have_simplex_length() {
        let slice = GridSlice::filled(3, 2, 7_i64).unwrap();
        // (2 + 1)(2 + 2) / 2 tails with c1 <= 2.
        assert_eq!(slice.len(), 6);
        assert!(slice.values().iter().all(|&v| v == 7));
        assert_eq!(GridSlice::filled(1, 9, 0_i32).unwrap().len(), 1);
    }
}
