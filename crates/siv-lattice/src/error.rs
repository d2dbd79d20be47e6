//! Error types for the `siv-lattice` crate.
//!
//! All fallible operations in this crate return [`LatticeError`].

/// Errors that can occur during lattice indexing and storage operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LatticeError {
    /// A lattice must have at least one axis.
    #[error("lattice dimension must be at least 1")]
    ZeroDimension,

    /// A coordinate tuple had the wrong number of components.
    #[error("expected {expected} coordinate components, got {actual}")]
    DimensionMismatch {
        /// Dimension of the lattice.
        expected: usize,
        /// Number of components supplied.
        actual: usize,
    },

    /// The components are not sorted descending, so they do not name a
    /// canonical cell.
    #[error("coordinate {components:?} is not canonical (sorted descending)")]
    NotCanonical {
        /// The offending components.
        components: Vec<u32>,
    },

    /// A canonical coordinate lies outside the allocated region.
    #[error("coordinate {components:?} is outside the allocated side {side}")]
    OutOfBounds {
        /// The offending components.
        components: Vec<u32>,
        /// Number of positions per axis in the allocated region.
        side: u32,
    },

    /// A simplex volume or offset does not fit in the index type.
    #[error("simplex of dimension {dimension} and side {side} exceeds the addressable size")]
    IndexOverflow {
        /// Lattice dimension.
        dimension: usize,
        /// Requested side.
        side: u32,
    },

    /// A packed index does not fit in `usize` on this platform.
    #[error("packed index {index} does not fit in memory")]
    IndexTooLarge {
        /// The offending index.
        index: u64,
    },

    /// A checked cell-value operation overflowed.
    #[error("cell value overflow during {operation}")]
    ValueOverflow {
        /// The operation that overflowed.
        operation: &'static str,
    },

    /// A storage was asked to shrink.
    #[error("cannot shrink storage from side {current} to {requested}")]
    Shrink {
        /// Current side.
        current: u32,
        /// Requested side.
        requested: u32,
    },
}
