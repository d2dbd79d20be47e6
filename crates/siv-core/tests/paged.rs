//! Integration tests for paged grids, backups, and pipeline passes.
//!
//! Paged grids run with budgets small enough to split every generation
//! into several blocks, and must agree cell for cell with in-memory grids.

// Integration tests use unwrap extensively for clarity -- panicking
// on failure is the correct behavior in test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]

use std::path::Path;

use siv_blocks::{BlockStore, MemoryModel};
use siv_core::backup::RestoreTarget;
use siv_core::{
    Backend, BlockProcessor, CellCollector, CrossSectionProcessor, EvolutionError,
    MinMaxProcessor, NoOpCallback, PagedOptions, RunOptions, SimulationEndReason,
    SpreadIntegerValue, StopSignal, StoredBlocks, SymmetricGrid, read_manifest, restore,
    run_pipeline, run_simulation, total_mass, write_backup,
};
use siv_lattice::{CellValue, LatticeError};

fn paged_options(work_dir: &Path, budget: u64) -> PagedOptions {
    PagedOptions {
        work_dir: work_dir.to_path_buf(),
        budget,
        model: MemoryModel::default(),
    }
}

/// Compares two grids over their allocated box plus one layer of exterior.
fn assert_same_grid<V: CellValue>(a: &SpreadIntegerValue<V>, b: &SpreadIntegerValue<V>) {
    assert_eq!(a.state(), b.state());
    let (low, high) = a.bounds(0).unwrap();
    let dimension = a.dimension();
    let span = high - low + 3;
    let cells = usize::try_from(span).unwrap().pow(u32::try_from(dimension).unwrap());
    for index in 0..cells {
        let mut rest = index;
        let coords: Vec<i32> = (0..dimension)
            .map(|_| {
                let c = i32::try_from(rest % usize::try_from(span).unwrap()).unwrap();
                rest /= usize::try_from(span).unwrap();
                c + low - 1
            })
            .collect();
        assert_eq!(
            a.value(&coords).unwrap(),
            b.value(&coords).unwrap(),
            "cell {coords:?} at step {}",
            a.step()
        );
    }
}

#[test]
fn paged_two_dimensional_grid_matches_memory() {
    let dir = tempfile::tempdir().unwrap();
    let mut memory = SpreadIntegerValue::<i32>::new(2, 3_000, 0).unwrap();
    let mut paged =
        SpreadIntegerValue::<i32>::with_paging(2, 3_000, 0, paged_options(dir.path(), 200))
            .unwrap();
    assert_eq!(paged.backend(), Backend::Paged);
    for _ in 0..30 {
        assert_eq!(memory.next_step().unwrap(), paged.next_step().unwrap());
        assert_same_grid(&memory, &paged);
    }
    let store = BlockStore::at(dir.path().join("current"));
    assert!(store.ranges().unwrap().len() > 1);
    assert!(!dir.path().join("next").exists());
}

#[test]
fn paged_three_dimensional_grid_matches_memory() {
    let dir = tempfile::tempdir().unwrap();
    let mut memory = SpreadIntegerValue::<i64>::new(3, -50_000, -2).unwrap();
    let options = paged_options(dir.path(), 1_100);
    let mut paged = SpreadIntegerValue::<i64>::with_paging(3, -50_000, -2, options).unwrap();
    for _ in 0..20 {
        assert_eq!(memory.next_step().unwrap(), paged.next_step().unwrap());
    }
    assert_same_grid(&memory, &paged);
    assert!(BlockStore::at(dir.path().join("current")).ranges().unwrap().len() > 1);
}

#[test]
fn mass_is_conserved_on_paged_grids() {
    let dir = tempfile::tempdir().unwrap();
    let mut grid =
        SpreadIntegerValue::<i64>::with_paging(3, 77_777, 0, paged_options(dir.path(), 1_100))
            .unwrap();
    for _ in 0..15 {
        grid.next_step().unwrap();
        assert_eq!(total_mass(&grid).unwrap(), 77_777);
    }
}

#[test]
fn stored_blocks_stream_like_the_grid() {
    let dir = tempfile::tempdir().unwrap();
    let mut grid =
        SpreadIntegerValue::<i32>::with_paging(2, 9_000, 0, paged_options(dir.path(), 200))
            .unwrap();
    for _ in 0..12 {
        grid.next_step().unwrap();
    }
    let mut from_grid = CellCollector::<i32>::new();
    run_pipeline::<i32>(&grid, &mut [&mut from_grid]).unwrap();

    let stored = StoredBlocks::<i32>::open(BlockStore::at(dir.path().join("current"))).unwrap();
    let mut from_folder = CellCollector::<i32>::new();
    let mut min_max = MinMaxProcessor::<i32>::new();
    let blocks = run_pipeline::<i32>(&stored, &mut [&mut from_folder, &mut min_max]).unwrap();
    assert!(blocks > 1);
    assert_eq!(from_grid.cells(), from_folder.cells());

    let high = from_grid.cells().values().copied().max().unwrap();
    let low = from_grid.cells().values().copied().min().unwrap();
    assert_eq!(min_max.range(), Some((low, high)));
}

#[test]
fn cross_sections_of_paged_grids_read_the_fixed_hyperplane() {
    let dir = tempfile::tempdir().unwrap();
    let mut grid =
        SpreadIntegerValue::<i64>::with_paging(3, 60_000, 0, paged_options(dir.path(), 750))
            .unwrap();
    for _ in 0..10 {
        grid.next_step().unwrap();
    }
    let fixed: i32 = -1;
    let mut collector = CellCollector::<i64>::new();
    {
        let mut section = CrossSectionProcessor::new(
            2,
            fixed,
            vec![&mut collector as &mut dyn BlockProcessor<i64>],
        );
        run_pipeline::<i64>(&grid, &mut [&mut section]).unwrap();
    }
    let side = usize::try_from(grid.side()).unwrap();
    assert_eq!(collector.cells().len(), side * (side + 1) / 2);
    for (components, &value) in collector.cells() {
        let a = i32::try_from(components[0]).unwrap();
        let b = i32::try_from(components[1]).unwrap();
        assert_eq!(grid.value(&[a, -b, fixed]).unwrap(), value);
    }
}

#[test]
fn paged_backups_resume_exactly() {
    let dir = tempfile::tempdir().unwrap();
    let backups = dir.path().join("backups");
    let options = paged_options(&dir.path().join("a"), 200);
    let mut original = SpreadIntegerValue::<i32>::with_paging(2, 5_000, 1, options).unwrap();
    for _ in 0..10 {
        original.next_step().unwrap();
    }
    let manifest = write_backup(&original, &backups, "checkpoint").unwrap();
    assert_eq!(manifest.backend, Backend::Paged);

    let folder = backups.join("checkpoint");
    let mut in_memory = restore::<i32>(&folder, RestoreTarget::Memory).unwrap();
    let mut re_paged = restore::<i32>(
        &folder,
        RestoreTarget::Paged(paged_options(&dir.path().join("b"), 200)),
    )
    .unwrap();
    assert_same_grid(&original, &in_memory);
    for _ in 0..10 {
        let changed = original.next_step().unwrap();
        assert_eq!(in_memory.next_step().unwrap(), changed);
        assert_eq!(re_paged.next_step().unwrap(), changed);
    }
    assert_same_grid(&original, &in_memory);
    assert_same_grid(&original, &re_paged);
}

#[test]
fn interrupted_runs_resume_from_their_backup() {
    let dir = tempfile::tempdir().unwrap();
    let mut reference = SpreadIntegerValue::<i64>::new(2, 8_000, 0).unwrap();
    for _ in 0..16 {
        reference.next_step().unwrap();
    }

    let paging = paged_options(&dir.path().join("w"), 300);
    let mut grid = SpreadIntegerValue::<i64>::with_paging(2, 8_000, 0, paging).unwrap();
    let options = RunOptions {
        max_steps: 9,
        stop_when_stable: false,
        backup_every: 4,
        backup_dir: dir.path().join("backups"),
        backup_name: "latest".to_owned(),
    };
    let result =
        run_simulation(&mut grid, &options, &StopSignal::new(), &mut NoOpCallback).unwrap();
    assert_eq!(result.end_reason, SimulationEndReason::MaxStepsReached);
    assert_eq!(result.backups_written, 3);
    drop(grid);

    let folder = dir
        .path()
        .join("backups")
        .join(reference.sub_folder_path())
        .join("latest");
    assert_eq!(read_manifest(&folder).unwrap().step, 9);
    let mut resumed = restore::<i64>(&folder, RestoreTarget::Memory).unwrap();
    let options = RunOptions {
        max_steps: 7,
        backup_every: 0,
        ..options
    };
    run_simulation(&mut resumed, &options, &StopSignal::new(), &mut NoOpCallback).unwrap();
    assert_same_grid(&reference, &resumed);
}

#[test]
fn both_backends_reject_unsorted_components() {
    let dir = tempfile::tempdir().unwrap();
    let mut memory = SpreadIntegerValue::<i64>::new(3, 60_000, 0).unwrap();
    let mut paged =
        SpreadIntegerValue::<i64>::with_paging(3, 60_000, 0, paged_options(dir.path(), 750))
            .unwrap();
    for _ in 0..6 {
        memory.next_step().unwrap();
        paged.next_step().unwrap();
    }
    for components in [[2_u32, 0, 2], [0, 1, 0], [40, 41, 0]] {
        for grid in [&memory, &paged] {
            let err = grid.value_canonical(&components).unwrap_err();
            assert!(
                matches!(
                    err,
                    EvolutionError::Lattice {
                        source: LatticeError::NotCanonical { .. }
                    }
                ),
                "{components:?} on {:?}: {err}",
                grid.backend()
            );
        }
    }
    assert_eq!(
        memory.value_canonical(&[2, 2, 0]).unwrap(),
        paged.value_canonical(&[2, 2, 0]).unwrap()
    );
}
