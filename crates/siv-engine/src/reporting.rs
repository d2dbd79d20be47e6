//! Step callback that runs periodic pipeline passes.
//!
//! Every `process_every` steps the grid is streamed once through a
//! [`MinMaxProcessor`] and a [`MassProcessor`], and the results are logged.

use siv_core::engine::SpreadIntegerValue;
use siv_core::pipeline::{BlockProcessor, MassProcessor, MinMaxProcessor, run_pipeline};
use siv_core::runner::{RunnerError, StepCallback, StepSummary};
use siv_lattice::CellValue;
use tracing::{debug, info};

/// Logs the value range and mass of the grid every `every` steps.
#[derive(Debug)]
pub struct ReportingCallback<V> {
    every: u64,
    min_max: MinMaxProcessor<V>,
    mass: MassProcessor,
    passes: u64,
}

impl<V: CellValue> ReportingCallback<V> {
    /// Creates a callback processing every `every` steps; 0 never processes.
    pub const fn new(every: u64) -> Self {
        Self {
            every,
            min_max: MinMaxProcessor::new(),
            mass: MassProcessor::new(),
            passes: 0,
        }
    }

    /// Pipeline passes run so far.
    pub const fn passes(&self) -> u64 {
        self.passes
    }

    /// Value range seen by the last pass.
    pub const fn last_range(&self) -> Option<(V, V)> {
        self.min_max.range()
    }

    /// Mass computed by the last pass.
    pub const fn last_mass(&self) -> i128 {
        self.mass.total()
    }
}

impl<V: CellValue> StepCallback<V> for ReportingCallback<V> {
    fn on_step(
        &mut self,
        summary: &StepSummary,
        grid: &SpreadIntegerValue<V>,
    ) -> Result<(), RunnerError> {
        debug!(
            step = summary.step,
            side = summary.side,
            changed = summary.changed,
            "Step callback"
        );
        if summary.step.checked_rem(self.every) != Some(0) {
            return Ok(());
        }
        let blocks = run_pipeline::<V>(grid, &mut [
            &mut self.min_max as &mut dyn BlockProcessor<V>,
            &mut self.mass,
        ])?;
        self.passes = self.passes.saturating_add(1);
        let range = self.min_max.range();
        info!(
            step = summary.step,
            side = summary.side,
            blocks,
            min = ?range.map(|(min, _)| min),
            max = ?range.map(|(_, max)| max),
            mass = %self.mass.total(),
            "Grid processed"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use siv_core::runner::{RunOptions, StopSignal, run_simulation};

    use super::*;

    #[test]
    fn processes_on_the_configured_cadence() {
        let mut grid = SpreadIntegerValue::<i64>::new(2, 4_000, 0).unwrap();
        let options = RunOptions {
            max_steps: 9,
            stop_when_stable: false,
            backup_every: 0,
            backup_dir: "unused".into(),
            backup_name: "latest".to_owned(),
        };
        let mut callback = ReportingCallback::<i64>::new(3);
        run_simulation(&mut grid, &options, &StopSignal::new(), &mut callback).unwrap();
        assert_eq!(callback.passes(), 3);
        assert_eq!(callback.last_mass(), 4_000);
        let (min, max) = callback.last_range().unwrap();
        assert!(min >= 0);
        assert!(max < 4_000);
    }

    #[test]
    fn zero_disables_processing() {
        let mut grid = SpreadIntegerValue::<i32>::new(1, 100, 0).unwrap();
        let mut callback = ReportingCallback::<i32>::new(0);
        let summary = StepSummary {
            step: 1,
            side: 3,
            changed: grid.next_step().unwrap(),
        };
        callback.on_step(&summary, &grid).unwrap();
        assert_eq!(callback.passes(), 0);
        assert_eq!(callback.last_range(), None);
    }
}
