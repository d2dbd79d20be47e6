//! Error types for grid evolution.
//!
//! Stepping and reading a grid return [`EvolutionError`]. A failed step
//! never publishes a partial generation, so after any error the grid still
//! reports the previous step.

use std::path::PathBuf;

use siv_blocks::BlockError;
use siv_lattice::LatticeError;

/// Errors that can occur while creating, stepping, or reading a grid.
#[derive(Debug, thiserror::Error)]
pub enum EvolutionError {
    /// Index arithmetic or a coordinate was rejected by the lattice layer.
    #[error("lattice error: {source}")]
    Lattice {
        /// The underlying lattice error.
        #[from]
        source: LatticeError,
    },

    /// Block storage failed during a paged step or read.
    #[error("block storage error: {source}")]
    Blocks {
        /// The underlying block error.
        #[from]
        source: BlockError,
    },

    /// The background would topple by itself, so the exterior is unstable.
    #[error("background value {background} is unstable: |background| must be below {directions}")]
    UnstableBackground {
        /// The configured background.
        background: i64,
        /// `2n + 1` for the lattice dimension.
        directions: u64,
    },

    /// Cell arithmetic overflowed the value width.
    #[error("cell value overflow at {components:?}")]
    Overflow {
        /// The canonical cell whose update overflowed.
        components: Vec<u32>,
    },

    /// A toppling wrote past the next generation's allocated side.
    #[error("write to {components:?} is outside the allocated side {side}")]
    OutsideAllocation {
        /// The canonical cell written.
        components: Vec<u32>,
        /// Side of the next generation.
        side: u32,
    },

    /// A slice the step needed was not available.
    #[error("slice x = {x} is missing from the current generation")]
    MissingBlock {
        /// Leading component of the missing slice.
        x: u32,
    },

    /// The requested axis does not exist.
    #[error("axis {axis} is out of range for a {dimension}-dimensional grid")]
    AxisOutOfRange {
        /// The requested axis.
        axis: usize,
        /// Lattice dimension.
        dimension: usize,
    },

    /// The grid cannot grow any further.
    #[error("grid side {side} cannot grow further")]
    SideOverflow {
        /// Current side.
        side: u32,
    },

    /// A work folder could not be prepared or swapped.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// The folder involved.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

impl EvolutionError {
    pub(crate) fn overflow(components: &[u32]) -> Self {
        Self::Overflow {
            components: components.to_vec(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
