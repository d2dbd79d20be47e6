//! Integration tests for re-partitioning block folders.
//!
//! A grid is written at one budget, re-chunked to another, and read back
//! slice by slice to check that order and values survive unchanged.

// Integration tests use unwrap extensively for clarity -- panicking
// on failure is the correct behavior in test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]

use std::path::Path;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use siv_blocks::{
    BlockError, BlockStore, BlockWriter, GridSlice, MemoryModel, SliceCursor, repartition,
};
use siv_lattice::simplex::slice_len;

const DIMENSION: usize = 3;
const LAST_X: u32 = 14;

/// Writes a 3D grid of random values at `budget` and returns its slices.
fn write_random_grid(folder: &Path, budget: u64, seed: u64) -> Vec<GridSlice<i64>> {
    let store = BlockStore::create(folder).unwrap();
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut writer = BlockWriter::new(&store, MemoryModel::default(), budget, DIMENSION, LAST_X);
    let mut slices = Vec::new();
    for x in 0..=LAST_X {
        let len = usize::try_from(slice_len(DIMENSION, x).unwrap()).unwrap();
        let values: Vec<i64> = (0..len).map(|_| rng.random_range(-1_000..1_000)).collect();
        let slice = GridSlice::new(DIMENSION, x, values).unwrap();
        slices.push(slice.clone());
        writer.push(slice).unwrap();
    }
    writer.finish().unwrap();
    slices
}

fn read_all(folder: &Path) -> Vec<GridSlice<i64>> {
    let store = BlockStore::at(folder);
    let mut cursor = SliceCursor::<i64>::new(&store, 0);
    let mut out = Vec::new();
    while let Some(slice) = cursor.next_slice().unwrap() {
        out.push(slice);
    }
    out
}

#[test]
fn shrinking_the_budget_preserves_every_slice() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("b1");
    let target = dir.path().join("b2");
    let original = write_random_grid(&source, 16_384, 7);

    let summary =
        repartition::<i64>(&source, &target, 4_096, &MemoryModel::default()).unwrap();

    assert_eq!(summary.slices, u64::from(LAST_X) + 1);
    assert!(summary.target_blocks.len() > summary.source_blocks);
    assert_eq!(read_all(&target), original);
    // Target blocks tile the leading axis without gaps.
    let mut next = 0;
    for range in &summary.target_blocks {
        assert_eq!(range.min_x, next);
        next = range.max_x + 1;
    }
    assert_eq!(next, LAST_X + 1);
}

#[test]
fn growing_the_budget_merges_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("small");
    let target = dir.path().join("large");
    let original = write_random_grid(&source, 4_096, 11);

    let summary =
        repartition::<i64>(&source, &target, 1 << 20, &MemoryModel::default()).unwrap();

    assert_eq!(summary.target_blocks.len(), 1);
    assert_eq!(read_all(&target), original);
}

#[test]
fn budget_below_two_slices_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source");
    write_random_grid(&source, 16_384, 3);

    let err = repartition::<i64>(&source, &dir.path().join("target"), 64, &MemoryModel::default())
        .unwrap_err();
    assert!(matches!(err, BlockError::BudgetTooSmall { budget: 64, .. }));
}

#[test]
fn source_is_left_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source");
    let original = write_random_grid(&source, 8_192, 5);
    let before = BlockStore::at(&source).ranges().unwrap();

    repartition::<i64>(&source, &dir.path().join("target"), 4_096, &MemoryModel::default())
        .unwrap();

    assert_eq!(BlockStore::at(&source).ranges().unwrap(), before);
    assert_eq!(read_all(&source), original);
}

#[test]
fn a_missing_middle_block_ends_the_source() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source");
    // 3D i64 slices cost 24 + 8 * C(x + 2, 2) bytes on a 32-byte base:
    // at 2048 bytes the grid splits into [0,9], [10,12] and [13,14].
    let original = write_random_grid(&source, 2_048, 13);
    let store = BlockStore::at(&source);
    let ranges = store.ranges().unwrap();
    assert_eq!(ranges.len(), 3);
    std::fs::remove_file(store.path_for(ranges[1])).unwrap();

    let target = dir.path().join("target");
    let summary = repartition::<i64>(&source, &target, 1_500, &MemoryModel::default()).unwrap();

    let before_gap = u64::from(ranges[0].slice_count());
    assert_eq!(summary.slices, before_gap);
    assert_eq!(summary.source_blocks, 1);
    assert_eq!(summary.target_blocks.last().map(|r| r.max_x), Some(ranges[0].max_x));
    assert_eq!(BlockStore::at(&target).ranges().unwrap(), summary.target_blocks);
    let copied = read_all(&target);
    assert_eq!(copied.as_slice(), &original[..copied.len()]);
    assert_eq!(u64::try_from(copied.len()).unwrap(), before_gap);
}
