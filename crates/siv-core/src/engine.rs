//! The Spread Integer Value evolution engine.
//!
//! [`SpreadIntegerValue`] owns the current generation of a grid seeded with
//! a single value at the origin over a uniform background. Each call to
//! [`next_step`](SpreadIntegerValue::next_step) topples every canonical
//! cell once and replaces the generation. The grid grows by one slice in
//! the step after a toppling first reaches its outermost slice.
//!
//! Generations live either in memory ([`Backend::Memory`]) or in block
//! files ([`Backend::Paged`]). The two backends produce identical values.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use siv_lattice::canonical::{canonicalize, is_canonical};
use siv_lattice::{CellValue, LatticeError, TriangularStorage};
use tracing::{debug, info};

use crate::error::EvolutionError;
use crate::grid::SymmetricGrid;
use crate::kernel::{SourceWindow, StepStats, TargetWindow, direction_count, topple_slice};
use crate::paged::{PagedGeneration, PagedOptions};

/// Side of a freshly seeded grid.
pub const INITIAL_SIDE: u32 = 3;

/// Where generations are stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// One packed array in memory.
    #[default]
    Memory,
    /// Budget-sized block files under a work folder.
    Paged,
}

/// The counters and seed values describing a grid, independent of storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridState<V> {
    /// Number of lattice axes.
    pub dimension: usize,
    /// Value seeded at the origin.
    pub initial_value: V,
    /// Value of every other cell at seeding and of the exterior.
    pub background_value: V,
    /// Steps computed so far.
    pub step: u64,
    /// Positions allocated per canonical axis.
    pub side: u32,
    /// The last step wrote into the outermost slice.
    pub bounds_reached: bool,
    /// Whether the last step toppled anything; `None` before the first step.
    pub changed: Option<bool>,
}

#[derive(Debug)]
pub(crate) enum Generation<V> {
    Memory(TriangularStorage<V>),
    Paged(Box<PagedGeneration<V>>),
}

/// An n-dimensional Spread Integer Value grid.
#[derive(Debug)]
pub struct SpreadIntegerValue<V: CellValue> {
    state: GridState<V>,
    generation: Generation<V>,
}

impl<V: CellValue> SpreadIntegerValue<V> {
    /// Seeds an in-memory grid with `initial_value` at the origin.
    ///
    /// # Errors
    ///
    /// Returns [`EvolutionError::UnstableBackground`] if the background
    /// would topple by itself, or a lattice error for a zero dimension.
    pub fn new(
        dimension: usize,
        initial_value: V,
        background_value: V,
    ) -> Result<Self, EvolutionError> {
        let storage = seed(dimension, initial_value, background_value)?;
        Ok(Self::from_parts(
            fresh_state(dimension, initial_value, background_value),
            Generation::Memory(storage),
        ))
    }

    /// Seeds a paged grid whose generations live under `options.work_dir`.
    ///
    /// # Errors
    ///
    /// As for [`new`](Self::new), plus block errors while writing the
    /// first generation (for example a budget too small for two slices).
    pub fn with_paging(
        dimension: usize,
        initial_value: V,
        background_value: V,
        options: PagedOptions,
    ) -> Result<Self, EvolutionError> {
        let storage = seed(dimension, initial_value, background_value)?;
        let paged = PagedGeneration::create(options, &storage)?;
        info!(
            dimension,
            initial_value = %initial_value,
            work_dir = %paged.options().work_dir.display(),
            budget = paged.options().budget,
            blocks = paged.ranges().len(),
            "Paged grid seeded"
        );
        Ok(Self::from_parts(
            fresh_state(dimension, initial_value, background_value),
            Generation::Paged(Box::new(paged)),
        ))
    }

    pub(crate) const fn from_parts(state: GridState<V>, generation: Generation<V>) -> Self {
        Self { state, generation }
    }

    pub(crate) const fn generation(&self) -> &Generation<V> {
        &self.generation
    }

    /// Snapshot of the grid's counters and seed values.
    pub const fn state(&self) -> GridState<V> {
        self.state
    }

    /// Value seeded at the origin.
    pub const fn initial_value(&self) -> V {
        self.state.initial_value
    }

    /// Value of the exterior.
    pub const fn background_value(&self) -> V {
        self.state.background_value
    }

    /// Positions allocated per canonical axis.
    pub const fn side(&self) -> u32 {
        self.state.side
    }

    /// Whether the last step toppled any cell; `None` before the first step.
    pub const fn is_changed(&self) -> Option<bool> {
        self.state.changed
    }

    /// Whether the next step will grow the grid.
    pub const fn bounds_reached(&self) -> bool {
        self.state.bounds_reached
    }

    /// Where the current generation is stored.
    pub const fn backend(&self) -> Backend {
        match self.generation {
            Generation::Memory(_) => Backend::Memory,
            Generation::Paged(_) => Backend::Paged,
        }
    }

    /// Relative folder naming this automaton, for work and backup folders.
    pub fn sub_folder_path(&self) -> PathBuf {
        sub_folder_path(
            self.state.dimension,
            self.state.initial_value,
            self.state.background_value,
        )
    }

    /// Reads an allocated or exterior canonical cell.
    ///
    /// # Errors
    ///
    /// Returns a lattice error if `components` is not canonical or has the
    /// wrong length, or a block error if a paged read fails.
    pub fn value_canonical(&self, components: &[u32]) -> Result<V, EvolutionError> {
        if components.len() != self.state.dimension {
            return Err(LatticeError::DimensionMismatch {
                expected: self.state.dimension,
                actual: components.len(),
            }
            .into());
        }
        if !is_canonical(components) {
            return Err(LatticeError::NotCanonical {
                components: components.to_vec(),
            }
            .into());
        }
        if components.first().is_some_and(|&c0| c0 >= self.state.side) {
            return Ok(self.state.background_value);
        }
        match &self.generation {
            Generation::Memory(storage) => Ok(storage.get(components)?),
            Generation::Paged(paged) => paged.value(components),
        }
    }

    /// Computes the next generation and publishes it.
    ///
    /// Returns whether any cell toppled. On error the previous generation
    /// and all counters are left as they were.
    ///
    /// # Errors
    ///
    /// Returns [`EvolutionError::Overflow`] if a cell leaves the value
    /// width, and block or I/O errors from a paged step.
    pub fn next_step(&mut self) -> Result<bool, EvolutionError> {
        let side = self.state.side;
        let target_side = if self.state.bounds_reached {
            side.checked_add(1)
                .ok_or(EvolutionError::SideOverflow { side })?
        } else {
            side
        };
        let mut stats = StepStats::default();
        match &mut self.generation {
            Generation::Memory(storage) => {
                let next = step_memory(storage, target_side, &mut stats)?;
                *storage = next;
            }
            Generation::Paged(paged) => {
                paged.step(
                    self.state.dimension,
                    side,
                    target_side,
                    self.state.background_value,
                    &mut stats,
                )?;
            }
        }
        self.state.step = self.state.step.saturating_add(1);
        self.state.side = target_side;
        self.state.bounds_reached = stats.bounds_reached;
        self.state.changed = Some(stats.changed);
        debug!(
            step = self.state.step,
            side = target_side,
            changed = stats.changed,
            bounds_reached = stats.bounds_reached,
            "Step completed"
        );
        Ok(stats.changed)
    }
}

impl<V: CellValue> SymmetricGrid<V> for SpreadIntegerValue<V> {
    fn dimension(&self) -> usize {
        self.state.dimension
    }

    fn step(&self) -> u64 {
        self.state.step
    }

    fn bounds(&self, axis: usize) -> Result<(i32, i32), EvolutionError> {
        if axis >= self.state.dimension {
            return Err(EvolutionError::AxisOutOfRange {
                axis,
                dimension: self.state.dimension,
            });
        }
        let side = self.state.side;
        let reach = side
            .checked_sub(1)
            .and_then(|last| i32::try_from(last).ok())
            .ok_or(EvolutionError::SideOverflow { side })?;
        Ok((reach.saturating_neg(), reach))
    }

    fn value(&self, coords: &[i32]) -> Result<V, EvolutionError> {
        if coords.len() != self.state.dimension {
            return Err(LatticeError::DimensionMismatch {
                expected: self.state.dimension,
                actual: coords.len(),
            }
            .into());
        }
        self.value_canonical(canonicalize(coords).components())
    }
}

/// Relative folder `SpreadIntegerValue/<n>D/<initial>/<background>`.
pub fn sub_folder_path<V: CellValue>(
    dimension: usize,
    initial_value: V,
    background_value: V,
) -> PathBuf {
    PathBuf::from("SpreadIntegerValue")
        .join(format!("{dimension}D"))
        .join(initial_value.to_string())
        .join(background_value.to_string())
}

const fn fresh_state<V: CellValue>(
    dimension: usize,
    initial_value: V,
    background_value: V,
) -> GridState<V> {
    GridState {
        dimension,
        initial_value,
        background_value,
        step: 0,
        side: INITIAL_SIDE,
        bounds_reached: false,
        changed: None,
    }
}

/// Rejects a dimension of zero and a background that would topple.
pub(crate) fn check_seed<V: CellValue>(
    dimension: usize,
    background_value: V,
) -> Result<(), EvolutionError> {
    if dimension == 0 {
        return Err(LatticeError::ZeroDimension.into());
    }
    let directions = direction_count::<i64>(dimension).ok_or(LatticeError::IndexOverflow {
        dimension,
        side: INITIAL_SIDE,
    })?;
    let background = background_value.to_i64();
    if background.unsigned_abs() >= directions.unsigned_abs() {
        return Err(EvolutionError::UnstableBackground {
            background,
            directions: directions.unsigned_abs(),
        });
    }
    Ok(())
}

fn seed<V: CellValue>(
    dimension: usize,
    initial_value: V,
    background_value: V,
) -> Result<TriangularStorage<V>, EvolutionError> {
    check_seed(dimension, background_value)?;
    let mut storage =
        TriangularStorage::new(dimension, INITIAL_SIDE, background_value, background_value)?;
    storage.set(&vec![0; dimension], initial_value)?;
    Ok(storage)
}

fn step_memory<V: CellValue>(
    source: &TriangularStorage<V>,
    target_side: u32,
    stats: &mut StepStats,
) -> Result<TriangularStorage<V>, EvolutionError> {
    let dimension = source.dimension();
    let side = source.side();
    let background = source.background();
    let mut target = TriangularStorage::new(dimension, target_side, V::ZERO, background)?;
    for x in side..target_side {
        if let Some(slice) = target.slice_mut(x) {
            slice.fill(background);
        }
    }
    let last = target_side
        .checked_sub(1)
        .ok_or(EvolutionError::MissingBlock { x: 0 })?;
    for x in 0..side {
        let source_window = SourceWindow {
            x,
            side,
            background,
            below: x.checked_sub(1).and_then(|below| source.slice(below)),
            center: source.slice(x).ok_or(EvolutionError::MissingBlock { x })?,
            above: x.checked_add(1).and_then(|above| source.slice(above)),
        };
        let first_x = x.saturating_sub(1);
        let last_x = x.saturating_add(1).min(last);
        let start = target.slice_range(first_x)?.start;
        let end = target.slice_range(last_x)?.end;
        let below_len = if x > 0 {
            target.slice_range(first_x)?.len()
        } else {
            0
        };
        let center_len = target.slice_range(x)?.len();
        let missing = EvolutionError::MissingBlock { x };
        let (below, rest) = target
            .cells_mut()
            .get_mut(start..end)
            .and_then(|cells| cells.split_at_mut_checked(below_len))
            .ok_or(missing)?;
        let (center, above) = rest
            .split_at_mut_checked(center_len)
            .ok_or(EvolutionError::MissingBlock { x })?;
        let mut target_window = TargetWindow {
            x,
            side: target_side,
            below: (x > 0).then_some(below),
            center,
            above: (last_x > x).then_some(above),
        };
        topple_slice(dimension, &source_window, &mut target_window, stats)?;
    }
    Ok(target)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    fn line<V: CellValue>(grid: &SpreadIntegerValue<V>) -> Vec<V> {
        let (low, high) = grid.bounds(0).unwrap();
        (low..=high).map(|x| grid.value(&[x]).unwrap()).collect()
    }

    #[test]
    fn one_dimensional_six_spreads_evenly() {
        let mut grid = SpreadIntegerValue::<i64>::new(1, 6, 0).unwrap();
        assert_eq!(grid.is_changed(), None);
        assert!(grid.next_step().unwrap());
        assert_eq!(grid.step(), 1);
        assert_eq!(grid.value(&[-1]).unwrap(), 2);
        assert_eq!(grid.value(&[0]).unwrap(), 2);
        assert_eq!(grid.value(&[1]).unwrap(), 2);
        assert_eq!(grid.value(&[2]).unwrap(), 0);
    }

    #[test]
    fn one_dimensional_two_is_already_stable() {
        let mut grid = SpreadIntegerValue::<i32>::new(1, 2, 0).unwrap();
        assert!(!grid.next_step().unwrap());
        assert_eq!(grid.is_changed(), Some(false));
        assert_eq!(line(&grid), vec![0, 0, 2, 0, 0]);
        assert_eq!(grid.side(), INITIAL_SIDE);
    }

    #[test]
    fn growth_follows_a_flagged_step() {
        let mut grid = SpreadIntegerValue::<i64>::new(2, 10_000, 0).unwrap();
        let mut previous_side = grid.side();
        for _ in 0..20 {
            let flagged = grid.bounds_reached();
            grid.next_step().unwrap();
            if flagged {
                assert_eq!(grid.side(), previous_side + 1);
            } else {
                assert_eq!(grid.side(), previous_side);
            }
            previous_side = grid.side();
        }
        assert!(grid.side() > INITIAL_SIDE);
    }

    #[test]
    fn unstable_backgrounds_are_rejected() {
        assert!(matches!(
            SpreadIntegerValue::<i64>::new(1, 10, 3),
            Err(EvolutionError::UnstableBackground { directions: 3, .. })
        ));
        assert!(SpreadIntegerValue::<i64>::new(1, 10, -2).is_ok());
        assert!(matches!(
            SpreadIntegerValue::<i64>::new(0, 10, 0),
            Err(EvolutionError::Lattice {
                source: LatticeError::ZeroDimension
            })
        ));
    }

    #[test]
    fn exterior_reads_the_background() {
        let grid = SpreadIntegerValue::<i64>::new(3, 100, -4).unwrap();
        assert_eq!(grid.value(&[50, -50, 7]).unwrap(), -4);
        assert_eq!(grid.value(&[0, 0, 0]).unwrap(), 100);
        assert_eq!(grid.value(&[0, 1, 0]).unwrap(), -4);
        assert!(grid.value(&[0, 0]).is_err());
        assert!(matches!(
            grid.bounds(3),
            Err(EvolutionError::AxisOutOfRange { axis: 3, dimension: 3 })
        ));
        assert_eq!(grid.bounds(2).unwrap(), (-2, 2));
    }

    #[test]
    fn sub_folder_names_the_automaton() {
        let grid = SpreadIntegerValue::<i32>::new(3, -1_000, 1).unwrap();
        assert_eq!(
            grid.sub_folder_path(),
            PathBuf::from("SpreadIntegerValue/3D/-1000/1")
        );
    }

    #[test]
    fn overflow_keeps_the_previous_generation() {
        // The origin keeps 429_496_732 and receives 4 * 429_496_729 from
        // its four lattice neighbors, one more than i32::MAX.
        let mut storage = TriangularStorage::<i32>::new(2, INITIAL_SIDE, 0, 0).unwrap();
        storage.set(&[0, 0], 2_147_483_644).unwrap();
        storage.set(&[1, 0], i32::MAX).unwrap();
        let mut state = fresh_state(2, 0, 0);
        state.step = 7;
        let mut grid = SpreadIntegerValue::from_parts(state, Generation::Memory(storage));

        let err = grid.next_step().unwrap_err();
        assert!(
            matches!(&err, EvolutionError::Overflow { components } if components == &[0, 0]),
            "{err}"
        );
        assert_eq!(grid.step(), 7);
        assert_eq!(grid.is_changed(), None);
        assert_eq!(grid.value(&[0, 0]).unwrap(), 2_147_483_644);
        assert_eq!(grid.value(&[0, -1]).unwrap(), i32::MAX);
    }
}
