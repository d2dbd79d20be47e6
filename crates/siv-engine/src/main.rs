//! Evolution runner for the Spread Integer Value automaton.
//!
//! Loads the configuration, seeds a grid (or restores one from a backup),
//! and steps it until the run ends.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `siv-config.yaml` (or the file named by
//!    `SIV_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Validate the configuration
//! 4. Install the interrupt listener
//! 5. Seed a new grid, or restore `run.restore_from`
//! 6. Run the step loop, processing the grid every `run.process_every` steps
//! 7. Log the result

mod cli;
mod error;
mod reporting;

use siv_core::backup::{self, RestoreTarget};
use siv_core::config::SimulationConfig;
use siv_core::engine::{Backend, SpreadIntegerValue, sub_folder_path};
use siv_core::grid::SymmetricGrid;
use siv_core::runner::{self, RunOptions, SimulationResult, StopSignal};
use siv_lattice::{CellValue, ValueWidth};
use tracing::{info, warn};

use crate::error::EngineError;
use crate::reporting::ReportingCallback;

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the grid cannot be
/// seeded or restored, or the run fails.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1-2. Configuration, then logging at the configured level.
    let config = cli::load_config().map_err(EngineError::from)?;
    cli::init_logging(&config.logging);
    info!("siv-engine starting");

    // 3. Validate.
    config.validate().map_err(EngineError::from)?;
    let automaton = &config.automaton;
    info!(
        dimension = automaton.dimension,
        initial_value = automaton.initial_value,
        background_value = automaton.background_value,
        value_width = %automaton.value_width,
        backend = ?config.storage.backend,
        "Configuration loaded"
    );

    // 4. Interrupts request a stop at the next step boundary.
    let stop = StopSignal::new();
    watch_interrupts(stop.clone())?;

    // 5-6. Seed or restore, then run.
    let result = match automaton.value_width {
        ValueWidth::I32 => run::<i32>(&config, &stop)?,
        ValueWidth::I64 => run::<i64>(&config, &stop)?,
    };

    // 7. Log results.
    runner::log_simulation_end(&result);
    info!(
        end_reason = ?result.end_reason,
        total_steps = result.total_steps,
        "siv-engine shutdown complete"
    );
    Ok(())
}

/// Seeds or restores a grid of `V` cells and runs it.
fn run<V: CellValue>(
    config: &SimulationConfig,
    stop: &StopSignal,
) -> Result<SimulationResult, EngineError> {
    let automaton = &config.automaton;
    let initial_value = seed_value::<V>("initial_value", automaton.initial_value)?;
    let background_value = seed_value::<V>("background_value", automaton.background_value)?;
    let sub_folder = sub_folder_path(automaton.dimension, initial_value, background_value);
    let paging = config.storage.paged_options(&sub_folder);

    let mut grid = match &config.run.restore_from {
        Some(folder) => {
            let target = match config.storage.backend {
                Backend::Memory => RestoreTarget::Memory,
                Backend::Paged => RestoreTarget::Paged(paging),
            };
            let grid = backup::restore::<V>(folder, target)?;
            if grid.sub_folder_path() != sub_folder {
                warn!(
                    restored = %grid.sub_folder_path().display(),
                    configured = %sub_folder.display(),
                    "Backup holds a different automaton than configured, continuing with the backup"
                );
            }
            info!(
                folder = %folder.display(),
                step = grid.step(),
                side = grid.side(),
                "Resuming from backup"
            );
            grid
        }
        None => match config.storage.backend {
            Backend::Memory => {
                SpreadIntegerValue::new(automaton.dimension, initial_value, background_value)?
            }
            Backend::Paged => SpreadIntegerValue::with_paging(
                automaton.dimension,
                initial_value,
                background_value,
                paging,
            )?,
        },
    };

    let mut callback = ReportingCallback::<V>::new(config.run.process_every);
    let options = RunOptions::from_config(&config.run);
    Ok(runner::run_simulation(&mut grid, &options, stop, &mut callback)?)
}

fn seed_value<V: CellValue>(field: &'static str, value: i64) -> Result<V, EngineError> {
    V::from_i64(value).ok_or(EngineError::ValueOutOfRange {
        field,
        value,
        width: V::WIDTH,
    })
}

/// Raises `stop` on Ctrl-C from a background thread.
fn watch_interrupts(stop: StopSignal) -> Result<(), EngineError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|source| EngineError::Signal { source })?;
    std::thread::Builder::new()
        .name("siv-interrupts".to_owned())
        .spawn(move || {
            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        warn!("Interrupt received, stopping after the current step");
                        stop.request_stop();
                    }
                    Err(e) => warn!(error = %e, "Failed to listen for interrupts"),
                }
            });
        })
        .map_err(|source| EngineError::Signal { source })?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use siv_core::runner::SimulationEndReason;

    use super::*;

    fn small_config(root: &std::path::Path) -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.automaton.initial_value = 2_000;
        config.run.max_steps = 6;
        config.run.stop_when_stable = false;
        config.run.backup_every = 3;
        config.run.backup_dir = root.join("backups");
        config.storage.work_dir = root.join("work");
        config.storage.block_budget_bytes = 4_096;
        config
    }

    #[test]
    fn paged_runs_resume_from_their_backup() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config(dir.path());
        config.storage.backend = Backend::Paged;
        let first = run::<i64>(&config, &StopSignal::new()).unwrap();
        assert_eq!(first.end_reason, SimulationEndReason::MaxStepsReached);
        assert_eq!(first.backups_written, 2);

        let folder = config
            .run
            .backup_dir
            .join(sub_folder_path(2, 2_000_i64, 0))
            .join(&config.run.backup_name);
        config.run.restore_from = Some(folder);
        config.storage.backend = Backend::Memory;
        let resumed = run::<i64>(&config, &StopSignal::new()).unwrap();
        assert_eq!(resumed.final_summary.map(|s| s.step), Some(12));
    }

    #[test]
    fn seed_values_must_fit_the_width() {
        assert!(matches!(
            seed_value::<i32>("initial_value", i64::from(i32::MAX) + 1),
            Err(EngineError::ValueOutOfRange { .. })
        ));
        assert_eq!(seed_value::<i32>("initial_value", -7).unwrap(), -7);
    }
}
