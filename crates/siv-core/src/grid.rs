//! Read access to a symmetric grid.

use siv_lattice::CellValue;

use crate::error::EvolutionError;

/// A grid symmetric under axis reflections and permutations, read through
/// signed lattice coordinates.
///
/// Every backend answers identically: coordinates are folded onto their
/// canonical cell, and anything outside the allocated region reads as the
/// background.
pub trait SymmetricGrid<V: CellValue> {
    /// Number of lattice axes.
    fn dimension(&self) -> usize;

    /// Steps computed so far.
    fn step(&self) -> u64;

    /// Inclusive coordinate range allocated along `axis`.
    ///
    /// # Errors
    ///
    /// Returns [`EvolutionError::AxisOutOfRange`] for a missing axis.
    fn bounds(&self, axis: usize) -> Result<(i32, i32), EvolutionError>;

    /// Value at the signed coordinate `coords`.
    ///
    /// # Errors
    ///
    /// Returns a lattice error if `coords` has the wrong length, or a block
    /// error if a paged read fails.
    fn value(&self, coords: &[i32]) -> Result<V, EvolutionError>;
}
