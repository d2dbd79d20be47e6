//! Streaming passes over a grid, one block at a time.
//!
//! A [`BlockSource`] hands out the regions of a generation in ascending
//! slice order. [`run_pipeline`] drives an explicit set of
//! [`BlockProcessor`]s over them: every processor sees
//! `before_processing`, then each region in turn, then `after_processing`.
//! A paged grid is never loaded whole; each block is dropped before the
//! next is read.
//!
//! # Modules
//!
//! - [`processors`] -- [`MinMaxProcessor`], [`MassProcessor`], [`CellCollector`].
//! - [`cross_section`] -- [`CrossSectionProcessor`], which re-exposes a fixed
//!   hyperplane of each region to downstream processors.

pub mod cross_section;
pub mod processors;

use std::marker::PhantomData;

use siv_blocks::{BlockError, BlockStore, GridBlock};
use siv_lattice::simplex::advance;
use siv_lattice::{CellValue, LatticeError, TriangularStorage};
use tracing::debug;

use crate::engine::{Generation, SpreadIntegerValue};
use crate::error::EvolutionError;

pub use cross_section::CrossSectionProcessor;
pub use processors::{CellCollector, MassProcessor, MinMaxProcessor};

/// Errors raised while running a pipeline pass.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Reading the grid failed.
    #[error("evolution error: {source}")]
    Evolution {
        /// The underlying evolution error.
        #[from]
        source: EvolutionError,
    },

    /// Loading a block failed.
    #[error("block error: {source}")]
    Blocks {
        /// The underlying block error.
        #[from]
        source: BlockError,
    },

    /// A coordinate was rejected by the lattice layer.
    #[error("lattice error: {source}")]
    Lattice {
        /// The underlying lattice error.
        #[from]
        source: LatticeError,
    },

    /// A cross-section needs a region with at least two axes.
    #[error("cannot take a cross-section of a {dimension}-dimensional region")]
    CrossSectionDimension {
        /// Dimension of the region.
        dimension: usize,
    },

    /// The cross-section axis does not exist in the region.
    #[error("axis {axis} is out of range for a {dimension}-dimensional region")]
    AxisOutOfRange {
        /// The requested axis.
        axis: usize,
        /// Dimension of the region.
        dimension: usize,
    },

    /// The weighted total left the `i128` range.
    #[error("mass total overflowed")]
    MassOverflow,
}

/// A set of canonical cells that can be visited in packed order.
pub trait GridRegion<V: CellValue> {
    /// Number of components in each cell coordinate.
    fn dimension(&self) -> usize;

    /// Calls `visit` with every cell of the region and its value.
    ///
    /// # Errors
    ///
    /// Implementations backed by storage may fail to read.
    fn for_each_cell(&self, visit: &mut dyn FnMut(&[u32], V)) -> Result<(), PipelineError>;

    /// Value of one canonical cell, or `None` if the region does not hold it.
    ///
    /// # Errors
    ///
    /// Returns a lattice error for a malformed coordinate.
    fn value_at(&self, components: &[u32]) -> Result<Option<V>, PipelineError>;
}

/// A stage of a pipeline pass.
pub trait BlockProcessor<V: CellValue> {
    /// Called once before the first region.
    ///
    /// # Errors
    ///
    /// A failing processor aborts the pass.
    fn before_processing(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Called once per region, in ascending slice order.
    ///
    /// # Errors
    ///
    /// A failing processor aborts the pass.
    fn process_block(&mut self, region: &dyn GridRegion<V>) -> Result<(), PipelineError>;

    /// Called once after the last region.
    ///
    /// # Errors
    ///
    /// A failing processor aborts the pass.
    fn after_processing(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// Something that can present a grid as a sequence of regions.
pub trait BlockSource<V: CellValue> {
    /// Number of lattice axes.
    fn dimension(&self) -> usize;

    /// Calls `visit` with each region in ascending slice order.
    ///
    /// # Errors
    ///
    /// Propagates load failures and the first error returned by `visit`.
    fn visit_blocks(
        &self,
        visit: &mut dyn FnMut(&dyn GridRegion<V>) -> Result<(), PipelineError>,
    ) -> Result<(), PipelineError>;
}

/// Runs one pass of `processors` over `source`, returning the number of
/// regions visited.
///
/// # Errors
///
/// Returns the first error raised by the source or any processor.
pub fn run_pipeline<V: CellValue>(
    source: &dyn BlockSource<V>,
    processors: &mut [&mut dyn BlockProcessor<V>],
) -> Result<usize, PipelineError> {
    for processor in processors.iter_mut() {
        processor.before_processing()?;
    }
    let mut regions: usize = 0;
    source.visit_blocks(&mut |region| {
        for processor in processors.iter_mut() {
            processor.process_block(region)?;
        }
        regions = regions.saturating_add(1);
        Ok(())
    })?;
    for processor in processors.iter_mut() {
        processor.after_processing()?;
    }
    debug!(
        processors = processors.len(),
        regions,
        dimension = source.dimension(),
        "Pipeline pass complete"
    );
    Ok(regions)
}

/// Multiplicity-weighted sum of every allocated cell of `source`.
///
/// # Errors
///
/// Returns [`PipelineError::MassOverflow`] if the sum leaves `i128`.
pub fn total_mass<V: CellValue>(source: &dyn BlockSource<V>) -> Result<i128, PipelineError> {
    let mut mass = MassProcessor::new();
    run_pipeline(source, &mut [&mut mass])?;
    Ok(mass.total())
}

impl<V: CellValue> GridRegion<V> for TriangularStorage<V> {
    fn dimension(&self) -> usize {
        TriangularStorage::dimension(self)
    }

    fn for_each_cell(&self, visit: &mut dyn FnMut(&[u32], V)) -> Result<(), PipelineError> {
        let mut components = vec![0_u32; TriangularStorage::dimension(self)];
        let last = self.side().saturating_sub(1);
        for &value in self.cells() {
            visit(&components, value);
            advance(&mut components, 0, last);
        }
        Ok(())
    }

    fn value_at(&self, components: &[u32]) -> Result<Option<V>, PipelineError> {
        if components.first().is_none_or(|&c0| c0 >= self.side()) {
            return Ok(None);
        }
        Ok(Some(self.get(components)?))
    }
}

impl<V: CellValue> GridRegion<V> for GridBlock<V> {
    fn dimension(&self) -> usize {
        GridBlock::dimension(self)
    }

    fn for_each_cell(&self, visit: &mut dyn FnMut(&[u32], V)) -> Result<(), PipelineError> {
        let mut components = vec![0_u32; GridBlock::dimension(self)];
        for slice in self.slices() {
            components.fill(0);
            if let Some(first) = components.first_mut() {
                *first = slice.x();
            }
            for &value in slice.values() {
                visit(&components, value);
                advance(&mut components, 1, slice.x());
            }
        }
        Ok(())
    }

    fn value_at(&self, components: &[u32]) -> Result<Option<V>, PipelineError> {
        Ok(self.value(components)?)
    }
}

impl<V: CellValue> BlockSource<V> for SpreadIntegerValue<V> {
    fn dimension(&self) -> usize {
        self.state().dimension
    }

    fn visit_blocks(
        &self,
        visit: &mut dyn FnMut(&dyn GridRegion<V>) -> Result<(), PipelineError>,
    ) -> Result<(), PipelineError> {
        match self.generation() {
            Generation::Memory(storage) => visit(storage),
            Generation::Paged(paged) => {
                for &range in paged.ranges() {
                    let block = paged.load(range)?;
                    visit(&block)?;
                }
                Ok(())
            }
        }
    }
}

/// A folder of block files read as a pipeline source, such as a backup's
/// grid or the output of a re-partitioning.
#[derive(Debug)]
pub struct StoredBlocks<V> {
    store: BlockStore,
    dimension: usize,
    _values: PhantomData<V>,
}

impl<V: CellValue> StoredBlocks<V> {
    /// Opens `store`, reading the dimension and width from its first block.
    ///
    /// # Errors
    ///
    /// Returns [`BlockError::WidthMismatch`] if the blocks hold another
    /// width, or a read error for a missing or corrupted first block.
    pub fn open(store: BlockStore) -> Result<Self, PipelineError> {
        let Some(header) = store.peek_header()? else {
            return Err(BlockError::NotFound {
                min_x: 0,
                folder: store.root().to_path_buf(),
            }
            .into());
        };
        if header.width != V::WIDTH {
            return Err(BlockError::WidthMismatch {
                expected: V::WIDTH,
                found: header.width,
            }
            .into());
        }
        let dimension = usize::try_from(header.dimension).map_err(|_e| BlockError::Corrupted {
            reason: format!("dimension {} does not fit in memory", header.dimension),
        })?;
        Ok(Self {
            store,
            dimension,
            _values: PhantomData,
        })
    }
}

impl<V: CellValue> BlockSource<V> for StoredBlocks<V> {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn visit_blocks(
        &self,
        visit: &mut dyn FnMut(&dyn GridRegion<V>) -> Result<(), PipelineError>,
    ) -> Result<(), PipelineError> {
        for range in self.store.ranges()? {
            let block = self.store.load_range::<V>(range)?;
            if block.dimension() != self.dimension {
                return Err(BlockError::DimensionMismatch {
                    expected: self.dimension,
                    found: block.dimension(),
                }
                .into());
            }
            visit(&block)?;
        }
        Ok(())
    }
}
