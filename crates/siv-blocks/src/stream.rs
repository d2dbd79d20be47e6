//! Forward streaming over block folders.
//!
//! [`SliceCursor`] reads slices in order while holding at most one block
//! in memory. [`BlockWriter`] packs an ordered stream of slices into
//! budget-sized blocks and flushes each one as soon as it is full.

use std::collections::VecDeque;

use siv_lattice::CellValue;
use tracing::{debug, warn};

use crate::block::{BlockRange, GridBlock};
use crate::budget::MemoryModel;
use crate::error::BlockError;
use crate::slice::GridSlice;
use crate::store::BlockStore;

/// Reads the slices of a block folder in ascending order.
///
/// Blocks are located by first slice: after a block ending at `max_x` the
/// cursor looks for one starting at `max_x + 1`. A missing block means
/// the source is exhausted.
#[derive(Debug)]
pub struct SliceCursor<'a, V> {
    store: &'a BlockStore,
    next_min_x: Option<u32>,
    pending: VecDeque<GridSlice<V>>,
    dimension: Option<usize>,
    blocks_read: usize,
}

impl<'a, V: CellValue> SliceCursor<'a, V> {
    /// Starts reading at the block whose first slice is `start_x`.
    pub const fn new(store: &'a BlockStore, start_x: u32) -> Self {
        Self {
            store,
            next_min_x: Some(start_x),
            pending: VecDeque::new(),
            dimension: None,
            blocks_read: 0,
        }
    }

    /// Number of blocks loaded so far.
    pub const fn blocks_read(&self) -> usize {
        self.blocks_read
    }

    /// Dimension of the blocks read so far.
    pub const fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Returns the next slice, or `None` once the source is exhausted.
    pub fn next_slice(&mut self) -> Result<Option<GridSlice<V>>, BlockError> {
        if let Some(slice) = self.pending.pop_front() {
            return Ok(Some(slice));
        }
        let Some(min_x) = self.next_min_x else {
            return Ok(None);
        };
        let block = match self.store.load::<V>(min_x) {
            Ok(block) => block,
            Err(BlockError::NotFound { .. }) => {
                debug!(
                    folder = %self.store.root().display(),
                    min_x,
                    "No further block, source exhausted"
                );
                self.next_min_x = None;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        match self.dimension {
            Some(expected) if expected != block.dimension() => {
                return Err(BlockError::DimensionMismatch {
                    expected,
                    found: block.dimension(),
                });
            }
            _ => self.dimension = Some(block.dimension()),
        }
        self.blocks_read = self.blocks_read.saturating_add(1);
        self.next_min_x = block.max_x().checked_add(1);
        self.pending = block.into_slices().into();
        Ok(self.pending.pop_front())
    }
}

/// Packs ordered slices into blocks that fit a byte budget.
#[derive(Debug)]
pub struct BlockWriter<'a, V> {
    store: &'a BlockStore,
    model: MemoryModel,
    budget: u64,
    dimension: usize,
    last_x: u32,
    current: Option<GridBlock<V>>,
    written: Vec<BlockRange>,
}

impl<'a, V: CellValue> BlockWriter<'a, V> {
    /// Creates a writer for a grid whose last slice is `last_x`.
    pub const fn new(
        store: &'a BlockStore,
        model: MemoryModel,
        budget: u64,
        dimension: usize,
        last_x: u32,
    ) -> Self {
        Self {
            store,
            model,
            budget,
            dimension,
            last_x,
            current: None,
            written: Vec::new(),
        }
    }

    /// Appends the next slice, flushing the current block once it is full.
    pub fn push(&mut self, slice: GridSlice<V>) -> Result<(), BlockError> {
        let mut block = match self.current.take() {
            Some(block) => block,
            None => GridBlock::with_budget(
                &self.model,
                self.dimension,
                slice.x(),
                self.budget,
                self.last_x,
            )?,
        };
        block.push_slice(slice)?;
        if block.is_full() {
            self.flush(block)?;
        } else {
            self.current = Some(block);
        }
        Ok(())
    }

    fn flush(&mut self, block: GridBlock<V>) -> Result<(), BlockError> {
        self.store.save(&block)?;
        self.written.push(block.range());
        Ok(())
    }

    /// Flushes any partial block and returns the ranges written, in order.
    pub fn finish(mut self) -> Result<Vec<BlockRange>, BlockError> {
        if let Some(mut block) = self.current.take() {
            if block.is_empty() {
                warn!("Discarding empty trailing block");
            } else {
                block.seal();
                self.flush(block)?;
            }
        }
        Ok(self.written)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use super::*;

    fn write_grid(store: &BlockStore, budget: u64, last_x: u32) -> Vec<BlockRange> {
        let mut writer = BlockWriter::new(store, MemoryModel::default(), budget, 2, last_x);
        for x in 0..=last_x {
            let value = i64::from(x);
            writer.push(GridSlice::filled(2, x, value).unwrap()).unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn writer_splits_by_budget_and_seals_the_tail() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::create(dir.path()).unwrap();
        // Base 32; 2D i64 slice x costs round(16 + 8(x+1)) + 8.
        // Slices 0..=2 cost 32 + 40 + 48 = 120, slice 3 adds 56.
        let ranges = write_grid(&store, 32 + 120, 4);
        assert_eq!(
            ranges,
            vec![
                BlockRange { min_x: 0, max_x: 2 },
                BlockRange { min_x: 3, max_x: 4 }
            ]
        );
        assert_eq!(store.ranges().unwrap(), ranges);
    }

    #[test]
    fn cursor_reads_every_slice_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::create(dir.path()).unwrap();
        let ranges = write_grid(&store, 400, 9);
        let mut cursor = SliceCursor::<i64>::new(&store, 0);
        let mut seen = Vec::new();
        while let Some(slice) = cursor.next_slice().unwrap() {
            assert!(slice.values().iter().all(|&v| v == i64::from(slice.x())));
            seen.push(slice.x());
        }
        assert_eq!(seen, (0..=9).collect::<Vec<_>>());
        // Base 32 plus 32 + 8x per slice: [0,5] costs 344, [6,9] exactly 400.
        assert_eq!(
            ranges,
            vec![
                BlockRange { min_x: 0, max_x: 5 },
                BlockRange { min_x: 6, max_x: 9 }
            ]
        );
        assert_eq!(cursor.blocks_read(), ranges.len());
        assert_eq!(cursor.dimension(), Some(2));
    }

    #[test]
    fn cursor_stops_at_a_gap() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::create(dir.path()).unwrap();
        let ranges = write_grid(&store, 400, 9);
        let second = ranges.get(1).copied().unwrap();
        std::fs::remove_file(store.path_for(second)).unwrap();
        let mut cursor = SliceCursor::<i64>::new(&store, 0);
        let mut count = 0_u32;
        while cursor.next_slice().unwrap().is_some() {
            count = count.saturating_add(1);
        }
        assert_eq!(count, ranges.first().unwrap().slice_count());
    }

    #[test]
    fn corrupted_blocks_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::create(dir.path()).unwrap();
        let ranges = write_grid(&store, 400, 9);
        std::fs::write(store.path_for(ranges[0]), b"garbage").unwrap();
        let mut cursor = SliceCursor::<i64>::new(&store, 0);
        assert!(matches!(
            cursor.next_slice(),
            Err(BlockError::Corrupted { .. })
        ));
    }
}
