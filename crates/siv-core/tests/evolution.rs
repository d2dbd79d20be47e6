//! Integration tests for in-memory evolution.
//!
//! The canonical engine is checked against a brute-force simulation of
//! the full lattice in a box large enough that nothing reaches its edge.

// Integration tests use unwrap extensively for clarity -- panicking
// on failure is the correct behavior in test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use siv_core::{SpreadIntegerValue, SymmetricGrid, total_mass};

/// Every lattice cell in `[-radius, radius]^n`, with the background outside.
struct NaiveLattice {
    dimension: usize,
    radius: i32,
    background: i64,
    cells: Vec<i64>,
}

impl NaiveLattice {
    fn new(dimension: usize, radius: i32, initial: i64, background: i64) -> Self {
        let width = usize::try_from(2 * radius + 1).unwrap();
        let mut lattice = Self {
            dimension,
            radius,
            background,
            cells: vec![background; width.pow(u32::try_from(dimension).unwrap())],
        };
        let origin = lattice.index(&vec![0; dimension]).unwrap();
        lattice.cells[origin] = initial;
        lattice
    }

    fn width(&self) -> usize {
        usize::try_from(2 * self.radius + 1).unwrap()
    }

    fn index(&self, coords: &[i32]) -> Option<usize> {
        let mut index = 0;
        for &c in coords {
            if c.abs() > self.radius {
                return None;
            }
            index = index * self.width() + usize::try_from(c + self.radius).unwrap();
        }
        Some(index)
    }

    fn coords(&self, mut index: usize) -> Vec<i32> {
        let width = self.width();
        let mut coords = vec![0; self.dimension];
        for axis in (0..self.dimension).rev() {
            coords[axis] = i32::try_from(index % width).unwrap() - self.radius;
            index /= width;
        }
        coords
    }

    fn value(&self, coords: &[i32]) -> i64 {
        self.index(coords)
            .map_or(self.background, |index| self.cells[index])
    }

    fn step(&mut self) {
        let directions = 2 * i64::try_from(self.dimension).unwrap() + 1;
        let mut next = self.cells.clone();
        for (index, &value) in self.cells.iter().enumerate() {
            let share = value / directions;
            if share == 0 {
                continue;
            }
            let coords = self.coords(index);
            for axis in 0..self.dimension {
                for delta in [-1, 1] {
                    let mut neighbor = coords.clone();
                    neighbor[axis] += delta;
                    if self.value(&neighbor) == value {
                        continue;
                    }
                    let target = self
                        .index(&neighbor)
                        .expect("toppling reached the edge of the reference box");
                    next[target] += share;
                    next[index] -= share;
                }
            }
        }
        self.cells = next;
    }
}

fn assert_matches_reference(dimension: usize, initial: i64, background: i64, steps: i32) {
    let mut grid = SpreadIntegerValue::<i64>::new(dimension, initial, background).unwrap();
    let mut reference = NaiveLattice::new(dimension, steps + 3, initial, background);
    for step in 1..=steps {
        grid.next_step().unwrap();
        reference.step();
        for index in 0..reference.cells.len() {
            let coords = reference.coords(index);
            assert_eq!(
                grid.value(&coords).unwrap(),
                reference.cells[index],
                "{dimension}D seed {initial} over {background}, step {step}, cell {coords:?}"
            );
        }
    }
}

#[test]
fn one_dimensional_grids_match_the_reference() {
    assert_matches_reference(1, 6, 0, 1);
    assert_matches_reference(1, 1_000, 0, 40);
    assert_matches_reference(1, -777, 1, 30);
    assert_matches_reference(1, 12_345, -2, 30);
}

#[test]
fn two_dimensional_grids_match_the_reference() {
    assert_matches_reference(2, 2_000, 0, 25);
    assert_matches_reference(2, -1_500, -3, 20);
    assert_matches_reference(2, 999, 4, 20);
}

#[test]
fn three_dimensional_grids_match_the_reference() {
    assert_matches_reference(3, 5_000, 0, 12);
    assert_matches_reference(3, -4_000, 2, 10);
}

#[test]
fn random_seeds_match_the_reference() {
    let mut rng = SmallRng::seed_from_u64(0x5157);
    for _ in 0..6 {
        let dimension = rng.random_range(1..=3_usize);
        let limit = 2 * i64::try_from(dimension).unwrap();
        let background = rng.random_range(-limit..=limit);
        let initial = rng.random_range(-20_000..=20_000_i64);
        assert_matches_reference(dimension, initial, background, 8);
    }
}

#[test]
fn mass_is_conserved_over_a_zero_background() {
    for (dimension, initial) in [(1, 10_007_i64), (2, -31_337), (3, 250_000), (4, 90_000)] {
        let mut grid = SpreadIntegerValue::<i64>::new(dimension, initial, 0).unwrap();
        for _ in 0..30 {
            grid.next_step().unwrap();
            assert_eq!(total_mass(&grid).unwrap(), i128::from(initial));
        }
    }
}

#[test]
fn side_never_shrinks_and_grows_after_a_flagged_step() {
    let mut grid = SpreadIntegerValue::<i32>::new(3, 100_000, 1).unwrap();
    for _ in 0..40 {
        let side = grid.side();
        let flagged = grid.bounds_reached();
        grid.next_step().unwrap();
        assert!(grid.side() >= side);
        assert_eq!(grid.side() > side, flagged);
    }
}

#[test]
fn small_seeds_settle_and_report_it() {
    let mut grid = SpreadIntegerValue::<i64>::new(2, 40, 0).unwrap();
    let mut settled = false;
    for _ in 0..200 {
        if !grid.next_step().unwrap() {
            settled = true;
            break;
        }
    }
    assert!(settled);
    assert_eq!(grid.is_changed(), Some(false));
    assert_eq!(total_mass(&grid).unwrap(), 40);
}
