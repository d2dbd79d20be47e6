//! Re-chunking a block folder to a new byte budget.
//!
//! The source folder is streamed forward slice by slice into a
//! [`BlockWriter`] targeting the new budget. At most one source block and
//! one target block are in memory at any time, and slice order and values
//! are preserved exactly.

use std::path::Path;

use siv_lattice::CellValue;
use tracing::info;

use crate::block::BlockRange;
use crate::budget::MemoryModel;
use crate::error::BlockError;
use crate::store::BlockStore;
use crate::stream::{BlockWriter, SliceCursor};

/// Outcome of a re-partitioning pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepartitionSummary {
    /// Source blocks read.
    pub source_blocks: usize,
    /// Target blocks written, in order.
    pub target_blocks: Vec<BlockRange>,
    /// Slices copied.
    pub slices: u64,
}

/// Re-chunks the blocks in `source` into `target` under `budget` bytes.
///
/// `target` must be missing or empty. Reading stops at the first gap in
/// the source, which is treated as the end of the grid.
pub fn repartition<V: CellValue>(
    source: &Path,
    target: &Path,
    budget: u64,
    model: &MemoryModel,
) -> Result<RepartitionSummary, BlockError> {
    let source_store = BlockStore::at(source);
    let target_store = BlockStore::at(target);
    if !target_store.is_empty()? {
        return Err(BlockError::TargetNotEmpty {
            path: target.to_path_buf(),
        });
    }

    let ranges = source_store.ranges()?;
    let (Some(first), Some(last)) = (ranges.first(), ranges.last()) else {
        info!(source = %source.display(), "Source holds no blocks, nothing to re-partition");
        return Ok(RepartitionSummary {
            source_blocks: 0,
            target_blocks: Vec::new(),
            slices: 0,
        });
    };
    let header = source_store
        .peek_header()?
        .ok_or_else(|| BlockError::NotFound {
            min_x: first.min_x,
            folder: source.to_path_buf(),
        })?;
    if header.width != V::WIDTH {
        return Err(BlockError::WidthMismatch {
            expected: V::WIDTH,
            found: header.width,
        });
    }
    let dimension = usize::try_from(header.dimension).map_err(|_e| BlockError::Corrupted {
        reason: format!("dimension {} does not fit in memory", header.dimension),
    })?;

    let target_store = BlockStore::create(target)?;
    let mut cursor = SliceCursor::<V>::new(&source_store, first.min_x);
    let mut writer = BlockWriter::<V>::new(&target_store, *model, budget, dimension, last.max_x);
    let mut slices: u64 = 0;
    while let Some(slice) = cursor.next_slice()? {
        writer.push(slice)?;
        slices = slices.saturating_add(1);
    }
    let target_blocks = writer.finish()?;

    info!(
        source = %source.display(),
        target = %target.display(),
        budget,
        source_blocks = cursor.blocks_read(),
        target_blocks = target_blocks.len(),
        slices,
        "Re-partitioning complete"
    );
    Ok(RepartitionSummary {
        source_blocks: cursor.blocks_read(),
        target_blocks,
        slices,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::slice::GridSlice;

    #[test]
    fn non_empty_target_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("stray"), b"x").unwrap();
        let err = repartition::<i32>(
            &dir.path().join("source"),
            &target,
            1024,
            &MemoryModel::default(),
        )
        .unwrap_err();
        assert!(matches!(err, BlockError::TargetNotEmpty { .. }));
    }

    #[test]
    fn empty_source_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let summary = repartition::<i32>(
            &dir.path().join("source"),
            &dir.path().join("target"),
            1024,
            &MemoryModel::default(),
        )
        .unwrap();
        assert_eq!(summary.slices, 0);
        assert!(summary.target_blocks.is_empty());
    }

    #[test]
    fn width_must_match() {
        let dir = tempfile::tempdir().unwrap();
        let source = BlockStore::create(dir.path().join("source")).unwrap();
        let mut writer = BlockWriter::<i64>::new(&source, MemoryModel::default(), 1024, 1, 3);
        for x in 0..=3 {
            writer.push(GridSlice::filled(1, x, 1).unwrap()).unwrap();
        }
        writer.finish().unwrap();
        let err = repartition::<i32>(
            source.root(),
            &dir.path().join("target"),
            1024,
            &MemoryModel::default(),
        )
        .unwrap_err();
        assert!(matches!(err, BlockError::WidthMismatch { .. }));
    }
}
