//! Out-of-core block storage for SIV grids.
//!
//! A grid too large for memory is split along its leading axis into
//! [`GridBlock`]s, each a run of consecutive slices whose estimated
//! footprint stays under a byte budget. Blocks are written one per file
//! and streamed back in order.
//!
//! # Modules
//!
//! - [`budget`] -- [`MemoryModel`] footprint estimates and block planning.
//! - [`slice`] -- [`GridSlice`], the cells sharing one leading component.
//! - [`block`] -- [`GridBlock`] and [`BlockRange`].
//! - [`codec`] -- Checksummed bincode block files, written atomically.
//! - [`store`] -- [`BlockStore`], a folder of block files.
//! - [`stream`] -- [`SliceCursor`] and [`BlockWriter`] for forward passes.
//! - [`repartition`] -- Re-chunking a folder to a new budget.
//!
//! [`MemoryModel`]: budget::MemoryModel
//! [`GridSlice`]: slice::GridSlice
//! [`GridBlock`]: block::GridBlock
//! [`BlockRange`]: block::BlockRange
//! [`BlockStore`]: store::BlockStore
//! [`SliceCursor`]: stream::SliceCursor
//! [`BlockWriter`]: stream::BlockWriter

pub mod block;
pub mod budget;
pub mod codec;
pub mod error;
pub mod repartition;
pub mod slice;
pub mod store;
pub mod stream;

pub use block::{BlockRange, GridBlock};
pub use budget::MemoryModel;
pub use codec::BlockHeader;
pub use error::BlockError;
pub use repartition::{RepartitionSummary, repartition};
pub use slice::GridSlice;
pub use store::BlockStore;
pub use stream::{BlockWriter, SliceCursor};
