//! Lattice primitives for the Spread Integer Value automaton.
//!
//! The automaton is symmetric under axis reflections and permutations, so
//! only the canonical region `c_0 >= c_1 >= ... >= c_{n-1} >= 0` is stored.
//!
//! # Modules
//!
//! - [`canonical`] -- Folding of signed coordinates onto canonical ones,
//!   orbit sizes, and neighbor direction multiplicities.
//! - [`simplex`] -- Closed-form packed indexing of the canonical simplex.
//! - [`storage`] -- [`TriangularStorage`], dense packed cell storage.
//! - [`value`] -- The [`CellValue`] trait over `i32` and `i64`.
//! - [`error`] -- [`LatticeError`].
//!
//! [`TriangularStorage`]: storage::TriangularStorage
//! [`CellValue`]: value::CellValue
//! [`LatticeError`]: error::LatticeError

pub mod canonical;
pub mod error;
pub mod simplex;
pub mod storage;
pub mod value;

pub use canonical::{CanonicalCoordinate, CanonicalNeighbor, NeighborLink, canonicalize};
pub use error::LatticeError;
pub use storage::TriangularStorage;
pub use value::{CellValue, ValueWidth};
