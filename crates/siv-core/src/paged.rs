//! Generations kept in block files.
//!
//! A paged generation lives in `<work_dir>/current` as a set of block
//! files tiling slices `0..side`. A step streams those slices forward,
//! three at a time, and writes the next generation into `<work_dir>/next`
//! through a [`BlockWriter`]. Only once the last block is flushed does
//! `next` replace `current`, so a failed step leaves the previous
//! generation untouched on disk.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use siv_blocks::{
    BlockRange, BlockStore, BlockWriter, GridBlock, GridSlice, MemoryModel, SliceCursor,
};
use siv_lattice::simplex::{slice_len, to_usize};
use siv_lattice::{CellValue, TriangularStorage};
use tracing::{debug, warn};

use crate::error::EvolutionError;
use crate::kernel::{SourceWindow, StepStats, TargetWindow, topple_slice};

const CURRENT_DIR: &str = "current";
const NEXT_DIR: &str = "next";
const RETIRED_DIR: &str = "retired";

/// Where and how a paged generation is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagedOptions {
    /// Folder owned by the grid; its `current` and `next` sub-folders are
    /// wiped when the grid is created.
    pub work_dir: PathBuf,
    /// Estimated bytes one block may occupy in memory.
    pub budget: u64,
    /// Overhead constants for the footprint estimate.
    pub model: MemoryModel,
}

/// A generation stored as block files, with a one-block read cache.
#[derive(Debug)]
pub(crate) struct PagedGeneration<V> {
    options: PagedOptions,
    current: BlockStore,
    ranges: Vec<BlockRange>,
    cache: RefCell<Option<GridBlock<V>>>,
}

impl<V: CellValue> PagedGeneration<V> {
    /// Writes `storage` as the first paged generation.
    pub(crate) fn create(
        options: PagedOptions,
        storage: &TriangularStorage<V>,
    ) -> Result<Self, EvolutionError> {
        let current = prepare_work_dir(&options.work_dir)?;
        let ranges = export_storage(storage, &current, &options.model, options.budget)?;
        Ok(Self::open(options, current, ranges))
    }

    /// Copies the blocks of `source` in as the current generation.
    pub(crate) fn adopt(
        options: PagedOptions,
        source: &BlockStore,
        side: u32,
    ) -> Result<Self, EvolutionError> {
        let current = prepare_work_dir(&options.work_dir)?;
        let current = source.copy_to(current.root())?;
        let ranges = current.ranges()?;
        check_tiling(&ranges, side)?;
        Ok(Self::open(options, current, ranges))
    }

    fn open(options: PagedOptions, current: BlockStore, ranges: Vec<BlockRange>) -> Self {
        debug!(
            folder = %current.root().display(),
            blocks = ranges.len(),
            "Paged generation ready"
        );
        Self {
            options,
            current,
            ranges,
            cache: RefCell::new(None),
        }
    }

    /// Folder holding the current generation.
    pub(crate) const fn store(&self) -> &BlockStore {
        &self.current
    }

    /// Block ranges of the current generation, in order.
    pub(crate) fn ranges(&self) -> &[BlockRange] {
        &self.ranges
    }

    /// Storage options.
    pub(crate) const fn options(&self) -> &PagedOptions {
        &self.options
    }

    /// Loads one block of the current generation.
    pub(crate) fn load(&self, range: BlockRange) -> Result<GridBlock<V>, EvolutionError> {
        Ok(self.current.load_range(range)?)
    }

    /// Reads an allocated canonical cell, keeping its block cached.
    pub(crate) fn value(&self, components: &[u32]) -> Result<V, EvolutionError> {
        let x = components.first().copied().unwrap_or_default();
        let range = self
            .ranges
            .iter()
            .find(|range| range.contains(x))
            .copied()
            .ok_or(EvolutionError::MissingBlock { x })?;
        let mut cache = self.cache.borrow_mut();
        if cache.as_ref().is_none_or(|block| block.range() != range) {
            *cache = Some(self.load(range)?);
        }
        cache
            .as_ref()
            .map(|block| block.value(components))
            .transpose()?
            .flatten()
            .ok_or(EvolutionError::MissingBlock { x })
    }

    /// Computes the next generation on disk and swaps it in.
    pub(crate) fn step(
        &mut self,
        dimension: usize,
        side: u32,
        target_side: u32,
        background: V,
        stats: &mut StepStats,
    ) -> Result<(), EvolutionError> {
        let next_path = self.options.work_dir.join(NEXT_DIR);
        BlockStore::at(&next_path).destroy()?;
        let next = BlockStore::create(&next_path)?;
        let written = self.write_next(&next, dimension, side, target_side, background, stats);
        let ranges = match written {
            Ok(ranges) => ranges,
            Err(e) => {
                if let Err(cleanup) = next.destroy() {
                    warn!(error = %cleanup, "Failed to remove staging folder after a failed step");
                }
                return Err(e);
            }
        };
        self.commit(&next_path, ranges)
    }

    fn write_next(
        &self,
        next: &BlockStore,
        dimension: usize,
        side: u32,
        target_side: u32,
        background: V,
        stats: &mut StepStats,
    ) -> Result<Vec<BlockRange>, EvolutionError> {
        let last_x = target_side
            .checked_sub(1)
            .ok_or(EvolutionError::MissingBlock { x: 0 })?;
        let mut cursor = SliceCursor::<V>::new(&self.current, 0);
        let mut writer = BlockWriter::<V>::new(
            next,
            self.options.model,
            self.options.budget,
            dimension,
            last_x,
        );
        let mut fetch = |x: u32| -> Result<Vec<V>, EvolutionError> {
            match cursor.next_slice()? {
                Some(slice) if slice.x() == x => Ok(slice.into_values()),
                _ => Err(EvolutionError::MissingBlock { x }),
            }
        };
        let fresh = |x: u32| -> Result<Vec<V>, EvolutionError> {
            let fill = if x < side { V::ZERO } else { background };
            Ok(vec![fill; to_usize(slice_len(dimension, x)?)?])
        };
        let has = |x: u32, limit: u32| x.checked_add(1).filter(|&next| next < limit);

        let mut source_below: Option<Vec<V>> = None;
        let mut source_center = fetch(0)?;
        let mut source_above = has(0, side).map(&mut fetch).transpose()?;
        let mut target_below: Option<Vec<V>> = None;
        let mut target_center = fresh(0)?;
        let mut target_above = has(0, target_side).map(fresh).transpose()?;

        let mut x: u32 = 0;
        loop {
            {
                let source = SourceWindow {
                    x,
                    side,
                    background,
                    below: source_below.as_deref(),
                    center: &source_center,
                    above: source_above.as_deref(),
                };
                let mut target = TargetWindow {
                    x,
                    side: target_side,
                    below: target_below.as_deref_mut(),
                    center: &mut target_center,
                    above: target_above.as_deref_mut(),
                };
                topple_slice(dimension, &source, &mut target, stats)?;
            }
            let Some(next_x) = has(x, side) else {
                break;
            };
            if let (Some(done), Some(done_x)) = (target_below.take(), x.checked_sub(1)) {
                writer.push(GridSlice::new(dimension, done_x, done)?)?;
            }
            let shifted = target_above
                .take()
                .ok_or(EvolutionError::MissingBlock { x: next_x })?;
            target_below = Some(std::mem::replace(&mut target_center, shifted));
            target_above = has(next_x, target_side).map(fresh).transpose()?;
            let shifted = source_above
                .take()
                .ok_or(EvolutionError::MissingBlock { x: next_x })?;
            source_below = Some(std::mem::replace(&mut source_center, shifted));
            source_above = has(next_x, side).map(&mut fetch).transpose()?;
            x = next_x;
        }

        if let (Some(done), Some(done_x)) = (target_below, x.checked_sub(1)) {
            writer.push(GridSlice::new(dimension, done_x, done)?)?;
        }
        writer.push(GridSlice::new(dimension, x, target_center)?)?;
        if let (Some(done), Some(done_x)) = (target_above, x.checked_add(1)) {
            writer.push(GridSlice::new(dimension, done_x, done)?)?;
        }
        Ok(writer.finish()?)
    }

    fn commit(&mut self, next_path: &Path, ranges: Vec<BlockRange>) -> Result<(), EvolutionError> {
        let current_path = self.current.root().to_path_buf();
        let retired_path = self.options.work_dir.join(RETIRED_DIR);
        BlockStore::at(&retired_path).destroy()?;
        fs::rename(&current_path, &retired_path)
            .map_err(|source| EvolutionError::io(&current_path, source))?;
        if let Err(source) = fs::rename(next_path, &current_path) {
            if let Err(restore) = fs::rename(&retired_path, &current_path) {
                warn!(error = %restore, "Failed to restore the previous generation folder");
            }
            return Err(EvolutionError::io(next_path, source));
        }
        BlockStore::at(&retired_path).destroy()?;
        debug!(
            folder = %current_path.display(),
            blocks = ranges.len(),
            "Next generation committed"
        );
        self.ranges = ranges;
        *self.cache.get_mut() = None;
        Ok(())
    }
}

/// Wipes the work folders and returns an empty `current` store.
fn prepare_work_dir(work_dir: &Path) -> Result<BlockStore, EvolutionError> {
    let current = BlockStore::at(work_dir.join(CURRENT_DIR));
    if !current.is_empty()? {
        warn!(
            folder = %current.root().display(),
            "Discarding a previous generation left in the work folder"
        );
    }
    for name in [CURRENT_DIR, NEXT_DIR, RETIRED_DIR] {
        BlockStore::at(work_dir.join(name)).destroy()?;
    }
    Ok(BlockStore::create(work_dir.join(CURRENT_DIR))?)
}

/// Writes every slice of `storage` into `store` as budget-sized blocks.
pub(crate) fn export_storage<V: CellValue>(
    storage: &TriangularStorage<V>,
    store: &BlockStore,
    model: &MemoryModel,
    budget: u64,
) -> Result<Vec<BlockRange>, EvolutionError> {
    let dimension = storage.dimension();
    let last_x = storage
        .side()
        .checked_sub(1)
        .ok_or(EvolutionError::MissingBlock { x: 0 })?;
    let mut writer = BlockWriter::<V>::new(store, *model, budget, dimension, last_x);
    for x in 0..storage.side() {
        let values = storage
            .slice(x)
            .ok_or(EvolutionError::MissingBlock { x })?
            .to_vec();
        writer.push(GridSlice::new(dimension, x, values)?)?;
    }
    Ok(writer.finish()?)
}

/// Reads every block of `store` back into one packed storage.
pub(crate) fn import_storage<V: CellValue>(
    store: &BlockStore,
    dimension: usize,
    side: u32,
    background: V,
) -> Result<TriangularStorage<V>, EvolutionError> {
    check_tiling(&store.ranges()?, side)?;
    let mut cells = Vec::new();
    let mut cursor = SliceCursor::<V>::new(store, 0);
    let mut expected: u32 = 0;
    while let Some(slice) = cursor.next_slice()? {
        if slice.x() != expected {
            return Err(EvolutionError::MissingBlock { x: expected });
        }
        cells.extend_from_slice(slice.values());
        expected = expected.saturating_add(1);
    }
    if expected != side {
        return Err(EvolutionError::MissingBlock { x: expected });
    }
    Ok(TriangularStorage::from_cells(
        dimension, side, background, cells,
    )?)
}

/// Checks that `ranges` cover slices `0..side` without gaps or overlaps.
pub(crate) fn check_tiling(ranges: &[BlockRange], side: u32) -> Result<(), EvolutionError> {
    let mut expected: u32 = 0;
    for range in ranges {
        if range.min_x != expected {
            return Err(EvolutionError::MissingBlock { x: expected });
        }
        expected = range
            .max_x
            .checked_add(1)
            .ok_or(EvolutionError::SideOverflow { side: range.max_x })?;
    }
    if expected == side {
        Ok(())
    } else {
        Err(EvolutionError::MissingBlock { x: expected })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn tiling_detects_gaps_and_short_grids() {
        let tiles = [
            BlockRange { min_x: 0, max_x: 2 },
            BlockRange { min_x: 3, max_x: 5 },
        ];
        assert!(check_tiling(&tiles, 6).is_ok());
        assert!(matches!(
            check_tiling(&tiles, 7),
            Err(EvolutionError::MissingBlock { x: 6 })
        ));
        let gap = [
            BlockRange { min_x: 0, max_x: 2 },
            BlockRange { min_x: 4, max_x: 5 },
        ];
        assert!(matches!(
            check_tiling(&gap, 6),
            Err(EvolutionError::MissingBlock { x: 3 })
        ));
    }

    #[test]
    fn storage_survives_export_and_import() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::create(dir.path()).unwrap();
        let mut storage = TriangularStorage::<i64>::new(3, 6, 0, -1).unwrap();
        for (i, cell) in storage.cells_mut().iter_mut().enumerate() {
            *cell = i64::try_from(i).unwrap();
        }
        let ranges = export_storage(&storage, &store, &MemoryModel::default(), 600).unwrap();
        assert!(ranges.len() > 1);
        let back = import_storage::<i64>(&store, 3, 6, -1).unwrap();
        assert_eq!(back, storage);
    }

    #[test]
    fn cached_reads_follow_the_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = TriangularStorage::<i32>::new(2, 5, 0, 0).unwrap();
        storage.set(&[4, 1], 7).unwrap();
        storage.set(&[0, 0], 3).unwrap();
        let options = PagedOptions {
            work_dir: dir.path().to_path_buf(),
            budget: 200,
            model: MemoryModel::default(),
        };
        let paged = PagedGeneration::create(options, &storage).unwrap();
        assert!(paged.ranges().len() > 1);
        assert_eq!(paged.value(&[4, 1]).unwrap(), 7);
        assert_eq!(paged.value(&[0, 0]).unwrap(), 3);
        assert_eq!(paged.value(&[2, 2]).unwrap(), 0);
    }
}
