//! Grid blocks: contiguous runs of slices sized to a byte budget.
//!
//! A block covers the leading-axis range `[min_x, max_x]`. It is created
//! empty with a planned capacity, filled slice by slice in order, and then
//! either kept in memory or written to a file named after its range.

use siv_lattice::CellValue;
use siv_lattice::simplex::{index_in_slice, to_usize};

use crate::budget::MemoryModel;
use crate::error::BlockError;
use crate::slice::{GridSlice, expected_len};

/// An inclusive range of slices on the leading axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockRange {
    /// First slice.
    pub min_x: u32,
    /// Last slice.
    pub max_x: u32,
}

impl BlockRange {
    /// File name of a block covering this range.
    pub fn file_name(&self) -> String {
        format!("minX={}_maxX={}.blk", self.min_x, self.max_x)
    }

    /// Parses a block file name back into its range.
    pub fn parse_file_name(name: &str) -> Option<Self> {
        let rest = name.strip_prefix("minX=")?.strip_suffix(".blk")?;
        let (min, max) = rest.split_once("_maxX=")?;
        let range = Self {
            min_x: min.parse().ok()?,
            max_x: max.parse().ok()?,
        };
        (range.min_x <= range.max_x).then_some(range)
    }

    /// Returns `true` if slice `x` falls inside the range.
    pub const fn contains(&self, x: u32) -> bool {
        self.min_x <= x && x <= self.max_x
    }

    /// Number of slices in the range.
    pub const fn slice_count(&self) -> u32 {
        self.max_x.saturating_sub(self.min_x).saturating_add(1)
    }
}

/// A run of consecutive slices starting at `min_x`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridBlock<V> {
    dimension: usize,
    min_x: u32,
    max_x: u32,
    slices: Vec<GridSlice<V>>,
}

impl<V: CellValue> GridBlock<V> {
    /// Creates an empty block with capacity for slices `min_x..=max_x`.
    pub fn new(dimension: usize, min_x: u32, max_x: u32) -> Result<Self, BlockError> {
        if max_x < min_x {
            return Err(BlockError::SliceOutOfRange {
                x: max_x,
                min_x,
                max_x,
            });
        }
        Ok(Self {
            dimension,
            min_x,
            max_x,
            slices: Vec::new(),
        })
    }

    /// Creates an empty block whose capacity fits within `budget` bytes.
    ///
    /// `last_x` is the last slice that exists in the grid being split.
    pub fn with_budget(
        model: &MemoryModel,
        dimension: usize,
        min_x: u32,
        budget: u64,
        last_x: u32,
    ) -> Result<Self, BlockError> {
        let max_x = model.plan_max_x(dimension, V::WIDTH, min_x, budget, last_x)?;
        Self::new(dimension, min_x, max_x)
    }

    /// Rebuilds a full block from decoded slices, validating every one.
    pub fn from_slices(
        dimension: usize,
        min_x: u32,
        max_x: u32,
        slices: Vec<GridSlice<V>>,
    ) -> Result<Self, BlockError> {
        let mut block = Self::new(dimension, min_x, max_x)?;
        for slice in slices {
            block.push_slice(slice)?;
        }
        if !block.is_full() {
            return Err(BlockError::Corrupted {
                reason: format!(
                    "block [{min_x}, {max_x}] holds {} slices",
                    block.slices.len()
                ),
            });
        }
        Ok(block)
    }

    /// Number of axes of the lattice the block belongs to.
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    /// First slice of the block.
    pub const fn min_x(&self) -> u32 {
        self.min_x
    }

    /// Last slice the block can hold.
    pub const fn max_x(&self) -> u32 {
        self.max_x
    }

    /// The block's slice range.
    pub const fn range(&self) -> BlockRange {
        BlockRange {
            min_x: self.min_x,
            max_x: self.max_x,
        }
    }

    /// File name of this block.
    pub fn file_name(&self) -> String {
        self.range().file_name()
    }

    /// Slices pushed so far.
    pub fn slices(&self) -> &[GridSlice<V>] {
        &self.slices
    }

    /// Returns `true` once every slice up to `max_x` has been pushed.
    pub fn is_full(&self) -> bool {
        self.next_x().is_none()
    }

    /// Returns `true` if no slice has been pushed.
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// The next slice position the block accepts, if any.
    pub fn next_x(&self) -> Option<u32> {
        let filled = u32::try_from(self.slices.len()).ok()?;
        let next = self.min_x.checked_add(filled)?;
        (next <= self.max_x).then_some(next)
    }

    fn check_len(&self, slice: &GridSlice<V>) -> Result<(), BlockError> {
        let expected = expected_len(self.dimension, slice.x())?;
        if slice.len() == expected {
            Ok(())
        } else {
            Err(BlockError::SliceLength {
                x: slice.x(),
                expected,
                actual: slice.len(),
            })
        }
    }

    /// Appends the next slice in order.
    pub fn push_slice(&mut self, slice: GridSlice<V>) -> Result<(), BlockError> {
        let Some(expected) = self.next_x() else {
            return Err(BlockError::SliceOutOfRange {
                x: slice.x(),
                min_x: self.min_x,
                max_x: self.max_x,
            });
        };
        if slice.x() != expected {
            return Err(BlockError::SliceOutOfOrder {
                expected,
                found: slice.x(),
            });
        }
        self.check_len(&slice)?;
        self.slices.push(slice);
        Ok(())
    }

    /// Replaces an already pushed slice.
    pub fn set_slice(&mut self, slice: GridSlice<V>) -> Result<(), BlockError> {
        self.check_len(&slice)?;
        let (x, min_x, max_x) = (slice.x(), self.min_x, self.max_x);
        let slot = x
            .checked_sub(min_x)
            .and_then(|offset| usize::try_from(offset).ok())
            .and_then(|offset| self.slices.get_mut(offset))
            .ok_or(BlockError::SliceOutOfRange { x, min_x, max_x })?;
        *slot = slice;
        Ok(())
    }

    /// The slice at `x`, if it has been pushed.
    pub fn slice(&self, x: u32) -> Option<&GridSlice<V>> {
        let offset = usize::try_from(x.checked_sub(self.min_x)?).ok()?;
        self.slices.get(offset)
    }

    /// Reads a canonical cell held by this block.
    ///
    /// Returns `None` if the cell's slice is not in the block.
    pub fn value(&self, components: &[u32]) -> Result<Option<V>, BlockError> {
        let Some(&x) = components.first() else {
            return Ok(None);
        };
        let Some(slice) = self.slice(x) else {
            return Ok(None);
        };
        let index = to_usize(index_in_slice(components)?)?;
        Ok(slice.values().get(index).copied())
    }

    /// Shrinks the capacity to the slices actually pushed.
    ///
    /// Used when the last block of a grid closes before it is full.
    pub fn seal(&mut self) {
        if let Some(last) = self.slices.last() {
            self.max_x = last.x();
        }
    }

    /// Consumes the block, returning its slices in order.
    pub fn into_slices(self) -> Vec<GridSlice<V>> {
        self.slices
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    fn make_block(min_x: u32, max_x: u32) -> GridBlock<i32> {
        let mut block = GridBlock::new(2, min_x, max_x).unwrap();
        for x in min_x..=max_x {
            let len = expected_len(2, x).unwrap();
            let values = (0..len).map(|i| i32::try_from(i).unwrap()).collect();
            block.push_slice(GridSlice::new(2, x, values).unwrap()).unwrap();
        }
        block
    }

    #[test]
    fn file_names_round_trip() {
        let range = BlockRange { min_x: 3, max_x: 17 };
        assert_eq!(range.file_name(), "minX=3_maxX=17.blk");
        assert_eq!(BlockRange::parse_file_name("minX=3_maxX=17.blk"), Some(range));
        assert_eq!(BlockRange::parse_file_name("minX=9_maxX=2.blk"), None);
        assert_eq!(BlockRange::parse_file_name("manifest.json"), None);
    }

    #[test]
    fn slices_must_arrive_in_order() {
        let mut block = GridBlock::<i64>::new(1, 4, 6).unwrap();
        let err = block
            .push_slice(GridSlice::filled(1, 5, 0).unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            BlockError::SliceOutOfOrder {
                expected: 4,
                found: 5
            }
        ));
    }

    #[test]
    fn full_blocks_reject_more_slices() {
        let mut block = make_block(0, 2);
        assert!(block.is_full());
        assert!(matches!(
            block.push_slice(GridSlice::filled(2, 3, 0).unwrap()),
            Err(BlockError::SliceOutOfRange { .. })
        ));
    }

    #[test]
    fn values_resolve_through_slices() {
        let block = make_block(2, 3);
        assert_eq!(block.value(&[3, 2]).unwrap(), Some(2));
        assert_eq!(block.value(&[2, 0]).unwrap(), Some(0));
        assert_eq!(block.value(&[5, 0]).unwrap(), None);
    }

    #[test]
    fn set_slice_replaces_existing() {
        let mut block = make_block(0, 1);
        block.set_slice(GridSlice::new(2, 1, vec![7, 8]).unwrap()).unwrap();
        assert_eq!(block.slice(1).unwrap().values(), &[7, 8]);
        assert!(block.set_slice(GridSlice::filled(2, 4, 0).unwrap()).is_err());
    }

    #[test]
    fn seal_truncates_capacity() {
        let mut block = GridBlock::<i32>::new(1, 0, 10).unwrap();
        block.push_slice(GridSlice::filled(1, 0, 1).unwrap()).unwrap();
        block.push_slice(GridSlice::filled(1, 1, 1).unwrap()).unwrap();
        block.seal();
        assert_eq!(block.range(), BlockRange { min_x: 0, max_x: 1 });
        assert!(block.is_full());
    }

    #[test]
    fn budgeted_blocks_plan_their_capacity() {
        let model = MemoryModel::default();
        let block = GridBlock::<i32>::with_budget(&model, 1, 0, 32 * 6, 100).unwrap();
        assert_eq!(block.max_x(), 4);
        assert!(block.is_empty());
    }
}
