//! Cross-sections on a fixed axis value.
//!
//! The hyperplane `x_axis = value` of a symmetric n-dimensional grid is
//! itself a symmetric (n - 1)-dimensional grid. Its canonical cells are
//! the canonical cells of the parent that contain `|value|` among their
//! components, with one occurrence removed. Because the parent is
//! symmetric under axis permutations, every axis yields the same section.

use siv_lattice::CellValue;

use super::{BlockProcessor, GridRegion, PipelineError};

/// The section `x_axis = value` of one parent region.
struct CrossSectionView<'r, V> {
    parent: &'r dyn GridRegion<V>,
    fixed: u32,
}

impl<V: CellValue> GridRegion<V> for CrossSectionView<'_, V> {
    fn dimension(&self) -> usize {
        self.parent.dimension().saturating_sub(1)
    }

    fn for_each_cell(&self, visit: &mut dyn FnMut(&[u32], V)) -> Result<(), PipelineError> {
        let fixed = self.fixed;
        let mut section = Vec::with_capacity(self.dimension());
        self.parent.for_each_cell(&mut |components, value| {
            let Some(position) = components.iter().position(|&c| c == fixed) else {
                return;
            };
            section.clear();
            section.extend(
                components
                    .iter()
                    .enumerate()
                    .filter(|&(i, _)| i != position)
                    .map(|(_, &c)| c),
            );
            visit(&section, value);
        })
    }

    fn value_at(&self, components: &[u32]) -> Result<Option<V>, PipelineError> {
        let insert_at = components
            .iter()
            .position(|&c| c <= self.fixed)
            .unwrap_or(components.len());
        let mut parent = Vec::with_capacity(components.len().saturating_add(1));
        parent.extend_from_slice(components);
        parent.insert(insert_at, self.fixed);
        self.parent.value_at(&parent)
    }
}

/// Re-exposes the section `x_axis = value` of every region to a set of
/// downstream processors.
pub struct CrossSectionProcessor<'a, V> {
    axis: usize,
    value: i32,
    downstream: Vec<&'a mut dyn BlockProcessor<V>>,
}

impl<'a, V: CellValue> CrossSectionProcessor<'a, V> {
    /// Creates a processor feeding the section `x_axis = value` to
    /// `downstream`.
    pub fn new(axis: usize, value: i32, downstream: Vec<&'a mut dyn BlockProcessor<V>>) -> Self {
        Self {
            axis,
            value,
            downstream,
        }
    }

    /// The fixed axis.
    pub const fn axis(&self) -> usize {
        self.axis
    }

    /// The fixed coordinate on that axis.
    pub const fn value(&self) -> i32 {
        self.value
    }
}

impl<V: CellValue> BlockProcessor<V> for CrossSectionProcessor<'_, V> {
    fn before_processing(&mut self) -> Result<(), PipelineError> {
        for processor in &mut self.downstream {
            processor.before_processing()?;
        }
        Ok(())
    }

    fn process_block(&mut self, region: &dyn GridRegion<V>) -> Result<(), PipelineError> {
        let dimension = region.dimension();
        if dimension < 2 {
            return Err(PipelineError::CrossSectionDimension { dimension });
        }
        if self.axis >= dimension {
            return Err(PipelineError::AxisOutOfRange {
                axis: self.axis,
                dimension,
            });
        }
        let view = CrossSectionView {
            parent: region,
            fixed: self.value.unsigned_abs(),
        };
        for processor in &mut self.downstream {
            processor.process_block(&view)?;
        }
        Ok(())
    }

    fn after_processing(&mut self) -> Result<(), PipelineError> {
        for processor in &mut self.downstream {
            processor.after_processing()?;
        }
        Ok(())
    }
}
