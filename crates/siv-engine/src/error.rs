//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure mode during startup and the run.

use siv_core::backup::BackupError;
use siv_core::config::ConfigError;
use siv_core::error::EvolutionError;
use siv_core::runner::RunnerError;
use siv_lattice::ValueWidth;

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading or validation failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// Seeding the grid failed.
    #[error("evolution error: {source}")]
    Evolution {
        /// The underlying evolution error.
        #[from]
        source: EvolutionError,
    },

    /// Restoring the configured backup failed.
    #[error("backup error: {source}")]
    Backup {
        /// The underlying backup error.
        #[from]
        source: BackupError,
    },

    /// The simulation runner failed.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: RunnerError,
    },

    /// A configured seed value does not fit the cell width.
    #[error("automaton.{field} = {value} does not fit {width} cells")]
    ValueOutOfRange {
        /// Name of the config field.
        field: &'static str,
        /// The configured value.
        value: i64,
        /// The configured width.
        width: ValueWidth,
    },

    /// The interrupt handler could not be installed.
    #[error("failed to start the interrupt listener: {source}")]
    Signal {
        /// The underlying I/O error.
        source: std::io::Error,
    },
}
