//! Simulation loop runner.
//!
//! [`run_simulation`] drives [`SpreadIntegerValue::next_step`] until a
//! termination condition is met:
//!
//! - **Bounded run**: stop after `max_steps` steps
//! - **Stabilization**: stop after the first step that toppled nothing
//! - **Stop signal**: a [`StopSignal`] raised from elsewhere is honored
//!   between steps, never inside one
//!
//! Backups are written every `backup_every` steps and once more when the
//! run ends, into `<backup_dir>/<sub folder>/<backup_name>`.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use siv_lattice::CellValue;
use tracing::{info, warn};

use crate::backup::{BackupError, write_backup};
use crate::config::RunConfig;
use crate::engine::SpreadIntegerValue;
use crate::error::EvolutionError;
use crate::grid::SymmetricGrid;
use crate::pipeline::PipelineError;

/// Errors that can occur during the simulation run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// A step failed.
    #[error("evolution error: {source}")]
    Evolution {
        /// The underlying evolution error.
        #[from]
        source: EvolutionError,
    },

    /// A periodic or final backup failed.
    #[error("backup error: {source}")]
    Backup {
        /// The underlying backup error.
        #[from]
        source: BackupError,
    },

    /// A pipeline pass run from a step callback failed.
    #[error("pipeline error: {source}")]
    Pipeline {
        /// The underlying pipeline error.
        #[from]
        source: PipelineError,
    },
}

/// Limits and backup settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Steps to compute in this run; 0 runs until stable or stopped.
    pub max_steps: u64,
    /// End the run after a step that toppled nothing.
    pub stop_when_stable: bool,
    /// Write a backup every this many steps; 0 disables backups.
    pub backup_every: u64,
    /// Root folder for backups.
    pub backup_dir: PathBuf,
    /// Name of the backup folder, replaced on every backup.
    pub backup_name: String,
}

impl RunOptions {
    /// Takes the run section of a configuration.
    pub fn from_config(run: &RunConfig) -> Self {
        Self {
            max_steps: run.max_steps,
            stop_when_stable: run.stop_when_stable,
            backup_every: run.backup_every,
            backup_dir: run.backup_dir.clone(),
            backup_name: run.backup_name.clone(),
        }
    }

    const fn backups_enabled(&self) -> bool {
        self.backup_every > 0
    }
}

/// What one step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepSummary {
    /// Steps computed so far, including this one.
    pub step: u64,
    /// Side after the step.
    pub side: u32,
    /// Whether any cell toppled.
    pub changed: bool,
}

/// Why the run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationEndReason {
    /// `max_steps` steps were computed.
    MaxStepsReached,
    /// A step toppled nothing.
    Stabilized,
    /// The stop signal was raised.
    Stopped,
}

/// Result of the simulation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationResult {
    /// The reason the run ended.
    pub end_reason: SimulationEndReason,
    /// The last step summary, if any step completed.
    pub final_summary: Option<StepSummary>,
    /// Steps computed in this run.
    pub total_steps: u64,
    /// Backups written in this run.
    pub backups_written: u64,
}

/// Callback invoked after each step completes.
///
/// Implementations can run pipeline passes or report progress. An error
/// ends the run.
pub trait StepCallback<V: CellValue> {
    /// Called after a step completes successfully.
    fn on_step(
        &mut self,
        summary: &StepSummary,
        grid: &SpreadIntegerValue<V>,
    ) -> Result<(), RunnerError>;
}

/// A no-op step callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCallback;

impl<V: CellValue> StepCallback<V> for NoOpCallback {
    fn on_step(
        &mut self,
        _summary: &StepSummary,
        _grid: &SpreadIntegerValue<V>,
    ) -> Result<(), RunnerError> {
        Ok(())
    }
}

/// Shared flag asking a run to stop at the next step boundary.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    requested: Arc<AtomicBool>,
}

impl StopSignal {
    /// Creates a lowered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the run to stop before its next step.
    pub fn request_stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Runs `grid` until a termination condition is met.
///
/// # Errors
///
/// Returns [`RunnerError`] if a step, a backup, or the callback fails.
/// A failed step leaves `grid` at the previous generation.
pub fn run_simulation<V: CellValue>(
    grid: &mut SpreadIntegerValue<V>,
    options: &RunOptions,
    stop: &StopSignal,
    callback: &mut dyn StepCallback<V>,
) -> Result<SimulationResult, RunnerError> {
    let backup_path = options.backup_dir.join(grid.sub_folder_path());
    let mut last_summary: Option<StepSummary> = None;
    let mut total_steps: u64 = 0;
    let mut backups_written: u64 = 0;
    let mut last_backup_step: Option<u64> = None;

    info!(
        dimension = grid.dimension(),
        initial_value = %grid.initial_value(),
        step = grid.step(),
        side = grid.side(),
        backend = ?grid.backend(),
        max_steps = options.max_steps,
        "Simulation starting"
    );

    let end_reason = loop {
        if stop.is_stop_requested() {
            warn!(step = grid.step(), "Stop requested");
            break SimulationEndReason::Stopped;
        }
        if options.max_steps > 0 && total_steps >= options.max_steps {
            info!(
                step = grid.step(),
                max_steps = options.max_steps,
                "Step limit reached"
            );
            break SimulationEndReason::MaxStepsReached;
        }

        let changed = grid.next_step()?;
        total_steps = total_steps.saturating_add(1);
        let summary = StepSummary {
            step: grid.step(),
            side: grid.side(),
            changed,
        };
        callback.on_step(&summary, grid)?;

        if summary.step.checked_rem(options.backup_every) == Some(0) {
            write_backup(grid, &backup_path, &options.backup_name)?;
            backups_written = backups_written.saturating_add(1);
            last_backup_step = Some(summary.step);
        }
        last_summary = Some(summary);

        if options.stop_when_stable && !changed {
            info!(step = summary.step, side = summary.side, "Grid is stable");
            break SimulationEndReason::Stabilized;
        }
    };

    if options.backups_enabled() && last_backup_step != Some(grid.step()) {
        write_backup(grid, &backup_path, &options.backup_name)?;
        backups_written = backups_written.saturating_add(1);
    }

    Ok(SimulationResult {
        end_reason,
        final_summary: last_summary,
        total_steps,
        backups_written,
    })
}

/// Logs how the run ended.
pub fn log_simulation_end(result: &SimulationResult) {
    info!(
        reason = ?result.end_reason,
        total_steps = result.total_steps,
        backups_written = result.backups_written,
        final_step = result.final_summary.as_ref().map(|s| s.step),
        final_side = result.final_summary.as_ref().map(|s| s.side),
        "Simulation ended"
    );

    if result.final_summary.is_none() {
        warn!("Simulation ended with no steps executed");
    }
}
