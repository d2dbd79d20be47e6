//! Error types for the `siv-blocks` crate.
//!
//! All fallible operations in this crate return [`BlockError`].

use std::path::PathBuf;

use siv_lattice::{LatticeError, ValueWidth};

/// Errors that can occur while building, storing, or streaming blocks.
#[derive(Debug, thiserror::Error)]
pub enum BlockError {
    /// Index arithmetic on the underlying simplex failed.
    #[error("lattice error: {source}")]
    Lattice {
        /// The underlying lattice error.
        #[from]
        source: LatticeError,
    },

    /// A filesystem operation failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// The file or folder involved.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Bincode failed to encode or decode a block.
    #[error("block encoding error: {source}")]
    Encoding {
        /// The underlying bincode error.
        #[from]
        source: bincode::Error,
    },

    /// A block file failed validation.
    #[error("corrupted block data: {reason}")]
    Corrupted {
        /// What failed to validate.
        reason: String,
    },

    /// A block file was written by an unsupported format version.
    #[error("block format version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Version this build reads.
        expected: u16,
        /// Version stored in the file.
        found: u16,
    },

    /// A block holds cells of a different width than requested.
    #[error("block value width mismatch: expected {expected}, found {found}")]
    WidthMismatch {
        /// Width requested by the caller.
        expected: ValueWidth,
        /// Width stored in the file.
        found: ValueWidth,
    },

    /// A block belongs to a lattice of another dimension.
    #[error("block dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Dimension requested by the caller.
        expected: usize,
        /// Dimension stored in the block.
        found: usize,
    },

    /// The byte budget cannot hold two slices starting at `min_x`.
    #[error("byte budget {budget} is too small: two slices from x = {min_x} need {required}")]
    BudgetTooSmall {
        /// The configured budget.
        budget: u64,
        /// Bytes needed for the block header and two slices.
        required: u64,
        /// First slice of the block being planned.
        min_x: u32,
    },

    /// A slice was pushed out of order.
    #[error("expected slice x = {expected}, got x = {found}")]
    SliceOutOfOrder {
        /// The next slice the block accepts.
        expected: u32,
        /// The slice that was pushed.
        found: u32,
    },

    /// A slice does not belong to the block's range.
    #[error("slice x = {x} is outside block [{min_x}, {max_x}]")]
    SliceOutOfRange {
        /// The slice position.
        x: u32,
        /// First slice of the block.
        min_x: u32,
        /// Last slice of the block.
        max_x: u32,
    },

    /// A slice has the wrong number of cells for its position.
    #[error("slice x = {x} holds {actual} cells, expected {expected}")]
    SliceLength {
        /// The slice position.
        x: u32,
        /// Cells a slice at this position holds.
        expected: usize,
        /// Cells supplied.
        actual: usize,
    },

    /// No block file starts at the requested slice.
    #[error("no block starting at x = {min_x} in {}", folder.display())]
    NotFound {
        /// The requested first slice.
        min_x: u32,
        /// Folder that was searched.
        folder: PathBuf,
    },

    /// The re-partitioning target already holds files.
    #[error("target folder {} is not empty", path.display())]
    TargetNotEmpty {
        /// The target folder.
        path: PathBuf,
    },
}

impl BlockError {
    /// Wraps an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
