//! Byte budgets for grid blocks.
//!
//! A block is sized so its in-memory footprint stays under a byte
//! ceiling. The footprint is estimated with a [`MemoryModel`]: each slice
//! is one heap array (header plus packed cells, rounded to the allocation
//! granularity) referenced from the block's slice table.

use serde::{Deserialize, Serialize};
use siv_lattice::{LatticeError, ValueWidth};
use siv_lattice::simplex::slice_len;

use crate::error::BlockError;

/// Overhead constants used to estimate block footprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryModel {
    /// Fixed bytes in front of every array allocation.
    #[serde(default = "default_array_header_bytes")]
    pub array_header_bytes: u64,

    /// Fixed bytes of the block object itself.
    #[serde(default = "default_object_header_bytes")]
    pub object_header_bytes: u64,

    /// Bytes of one reference in the block's slice table.
    #[serde(default = "default_reference_bytes")]
    pub reference_bytes: u64,

    /// Allocation sizes are rounded up to a multiple of this.
    #[serde(default = "default_granularity")]
    pub granularity: u64,
}

impl Default for MemoryModel {
    fn default() -> Self {
        Self {
            array_header_bytes: default_array_header_bytes(),
            object_header_bytes: default_object_header_bytes(),
            reference_bytes: default_reference_bytes(),
            granularity: default_granularity(),
        }
    }
}

impl MemoryModel {
    /// Rounds `bytes` up to the allocation granularity.
    pub fn round_up(&self, bytes: u64) -> Option<u64> {
        let granularity = self.granularity.max(1);
        let remainder = bytes.checked_rem(granularity)?;
        if remainder == 0 {
            Some(bytes)
        } else {
            bytes.checked_add(granularity.checked_sub(remainder)?)
        }
    }

    /// Bytes of a block with no slices: the object and its slice table.
    pub fn block_base_cost(&self) -> Option<u64> {
        self.round_up(self.object_header_bytes)?
            .checked_add(self.round_up(self.array_header_bytes)?)
    }

    /// Bytes added to a block by slice `x`.
    pub fn slice_cost(
        &self,
        dimension: usize,
        x: u32,
        width: ValueWidth,
    ) -> Result<u64, BlockError> {
        let cells = slice_len(dimension, x)?;
        cells
            .checked_mul(width.bytes())
            .and_then(|payload| payload.checked_add(self.array_header_bytes))
            .and_then(|bytes| self.round_up(bytes))
            .and_then(|bytes| bytes.checked_add(self.reference_bytes))
            .ok_or(BlockError::Lattice {
                source: LatticeError::IndexOverflow { dimension, side: x },
            })
    }

    /// Plans the last slice of a block starting at `min_x`.
    ///
    /// Slices are added while the total stays within `budget`. Planning
    /// stops at `last_x`, the last slice that exists; the returned capacity
    /// is always at least `min_x + 1`, so a block can hold two slices even
    /// when fewer remain.
    pub fn plan_max_x(
        &self,
        dimension: usize,
        width: ValueWidth,
        min_x: u32,
        budget: u64,
        last_x: u32,
    ) -> Result<u32, BlockError> {
        let second = min_x
            .checked_add(1)
            .ok_or(too_small(budget, u64::MAX, min_x))?;
        let first_cost = self.slice_cost(dimension, min_x, width)?;
        let second_cost = self.slice_cost(dimension, second, width)?;
        let mut total = self
            .block_base_cost()
            .and_then(|base| base.checked_add(first_cost))
            .and_then(|bytes| bytes.checked_add(second_cost))
            .ok_or(too_small(budget, u64::MAX, min_x))?;
        if total > budget {
            return Err(too_small(budget, total, min_x));
        }
        let mut max_x = second;
        while max_x < last_x {
            let Some(next_x) = max_x.checked_add(1) else {
                break;
            };
            let Some(next_total) = total.checked_add(self.slice_cost(dimension, next_x, width)?)
            else {
                break;
            };
            if next_total > budget {
                break;
            }
            total = next_total;
            max_x = next_x;
        }
        Ok(max_x)
    }
}

const fn too_small(budget: u64, required: u64, min_x: u32) -> BlockError {
    BlockError::BudgetTooSmall {
        budget,
        required,
        min_x,
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_array_header_bytes() -> u64 {
    16
}

const fn default_object_header_bytes() -> u64 {
    16
}

const fn default_reference_bytes() -> u64 {
    8
}

const fn default_granularity() -> u64 {
    8
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    #[test]
    fn rounding_respects_granularity() {
        let model = MemoryModel::default();
        assert_eq!(model.round_up(0), Some(0));
        assert_eq!(model.round_up(17), Some(24));
        assert_eq!(model.round_up(24), Some(24));
    }

    #[test]
    fn slice_cost_grows_with_x() {
        let model = MemoryModel::default();
        // 2D slice 3 holds 4 cells: 16 + 4 * 8 = 48, plus one reference.
        assert_eq!(model.slice_cost(2, 3, ValueWidth::I64).unwrap(), 56);
        // 1D slices are a single cell: 16 + 4 rounds to 24.
        assert_eq!(model.slice_cost(1, 100, ValueWidth::I32).unwrap(), 32);
    }

    #[test]
    fn plan_fills_up_to_the_budget() {
        let model = MemoryModel::default();
        // Base 32, each 1D i32 slice 32.
        let max_x = model.plan_max_x(1, ValueWidth::I32, 0, 32 + 32 * 5, 1000).unwrap();
        assert_eq!(max_x, 4);
        let capped = model.plan_max_x(1, ValueWidth::I32, 0, 32 + 32 * 5, 2).unwrap();
        assert_eq!(capped, 2);
    }

    #[test]
    fn plan_rejects_budgets_below_two_slices() {
        let model = MemoryModel::default();
        let err = model.plan_max_x(1, ValueWidth::I32, 7, 95, 100).unwrap_err();
        assert!(matches!(
            err,
            BlockError::BudgetTooSmall {
                budget: 95,
                required: 96,
                min_x: 7
            }
        ));
    }

    #[test]
    fn plan_keeps_two_slices_near_the_end() {
        let model = MemoryModel::default();
        assert_eq!(model.plan_max_x(2, ValueWidth::I64, 5, 10_000, 5).unwrap(), 6);
    }
}
