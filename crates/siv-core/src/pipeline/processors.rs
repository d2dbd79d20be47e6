//! Stock processors.

use std::collections::BTreeMap;

use siv_lattice::CellValue;
use siv_lattice::canonical::orbit_size;

use super::{BlockProcessor, GridRegion, PipelineError};

/// Tracks the smallest and largest value seen in a pass.
///
/// Renderers use the range to scale colors.
#[derive(Debug, Clone, Default)]
pub struct MinMaxProcessor<V> {
    range: Option<(V, V)>,
}

impl<V: CellValue> MinMaxProcessor<V> {
    /// Creates a processor with no values seen.
    pub const fn new() -> Self {
        Self { range: None }
    }

    /// `(min, max)` of the last pass, or `None` if it saw no cells.
    pub const fn range(&self) -> Option<(V, V)> {
        self.range
    }
}

impl<V: CellValue> BlockProcessor<V> for MinMaxProcessor<V> {
    fn before_processing(&mut self) -> Result<(), PipelineError> {
        self.range = None;
        Ok(())
    }

    fn process_block(&mut self, region: &dyn GridRegion<V>) -> Result<(), PipelineError> {
        let range = &mut self.range;
        region.for_each_cell(&mut |_, value| {
            *range = Some(match *range {
                None => (value, value),
                Some((min, max)) => (min.min(value), max.max(value)),
            });
        })
    }
}

/// Sums every cell weighted by the number of lattice cells it stands for.
///
/// With a zero background the total is invariant under stepping, as long
/// as it is taken over the whole allocated grid.
#[derive(Debug, Clone, Default)]
pub struct MassProcessor {
    total: i128,
    overflowed: bool,
}

impl MassProcessor {
    /// Creates a processor with a zero total.
    pub const fn new() -> Self {
        Self {
            total: 0,
            overflowed: false,
        }
    }

    /// Total of the last pass.
    pub const fn total(&self) -> i128 {
        self.total
    }
}

impl<V: CellValue> BlockProcessor<V> for MassProcessor {
    fn before_processing(&mut self) -> Result<(), PipelineError> {
        self.total = 0;
        self.overflowed = false;
        Ok(())
    }

    fn process_block(&mut self, region: &dyn GridRegion<V>) -> Result<(), PipelineError> {
        let Self { total, overflowed } = self;
        region.for_each_cell(&mut |components, value| {
            let weighted = orbit_size(components)
                .and_then(|orbit| i128::try_from(orbit).ok())
                .and_then(|orbit| orbit.checked_mul(value.to_i128()))
                .and_then(|weighted| total.checked_add(weighted));
            match weighted {
                Some(sum) => *total = sum,
                None => *overflowed = true,
            }
        })?;
        if *overflowed {
            return Err(PipelineError::MassOverflow);
        }
        Ok(())
    }
}

/// Materializes every cell it is shown, keyed by canonical coordinate.
///
/// Meant for small grids in tests and debugging.
#[derive(Debug, Clone, Default)]
pub struct CellCollector<V> {
    cells: BTreeMap<Vec<u32>, V>,
}

impl<V: CellValue> CellCollector<V> {
    /// Creates an empty collector.
    pub const fn new() -> Self {
        Self {
            cells: BTreeMap::new(),
        }
    }

    /// Cells collected by the last pass.
    pub const fn cells(&self) -> &BTreeMap<Vec<u32>, V> {
        &self.cells
    }

    /// Consumes the collector, returning its cells.
    pub fn into_cells(self) -> BTreeMap<Vec<u32>, V> {
        self.cells
    }
}

impl<V: CellValue> BlockProcessor<V> for CellCollector<V> {
    fn before_processing(&mut self) -> Result<(), PipelineError> {
        self.cells.clear();
        Ok(())
    }

    fn process_block(&mut self, region: &dyn GridRegion<V>) -> Result<(), PipelineError> {
        let cells = &mut self.cells;
        region.for_each_cell(&mut |components, value| {
            cells.insert(components.to_vec(), value);
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use siv_lattice::TriangularStorage;

    use super::*;
    use crate::pipeline::run_pipeline;

    #[test]
    fn min_max_spans_every_region() {
        let mut storage = TriangularStorage::<i32>::new(2, 4, 1, 0).unwrap();
        storage.set(&[3, 2], -9).unwrap();
        storage.set(&[1, 1], 12).unwrap();
        let mut min_max = MinMaxProcessor::<i32>::new();
        min_max.before_processing().unwrap();
        min_max.process_block(&storage).unwrap();
        assert_eq!(min_max.range(), Some((-9, 12)));
        min_max.before_processing().unwrap();
        assert_eq!(min_max.range(), None);
    }

    #[test]
    fn mass_weights_by_orbit() {
        // 2D, side 2: (0,0) stands for 1 cell, (1,0) for 4, (1,1) for 4.
        let mut storage = TriangularStorage::<i64>::new(2, 2, 0, 0).unwrap();
        storage.set(&[0, 0], 5).unwrap();
        storage.set(&[1, 0], 1).unwrap();
        storage.set(&[1, 1], -2).unwrap();
        let mut mass = MassProcessor::new();
        BlockProcessor::<i64>::before_processing(&mut mass).unwrap();
        BlockProcessor::<i64>::process_block(&mut mass, &storage).unwrap();
        // 5 * 1 + 1 * 4 - 2 * 4
        assert_eq!(mass.total(), 1);
    }

    #[test]
    fn collector_resets_between_passes() {
        let storage = TriangularStorage::<i64>::new(1, 3, 7, 0).unwrap();
        let mut collector = CellCollector::<i64>::new();
        collector.process_block(&storage).unwrap();
        assert_eq!(collector.cells().len(), 3);
        let grid = crate::engine::SpreadIntegerValue::<i64>::new(1, 1, 0).unwrap();
        run_pipeline(&grid, &mut [&mut collector]).unwrap();
        assert_eq!(collector.cells().get([0_u32].as_slice()), Some(&1));
        assert_eq!(collector.into_cells().len(), 3);
    }
}
