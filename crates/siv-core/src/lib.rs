//! Evolution engine for the n-dimensional Spread Integer Value automaton.
//!
//! A grid is seeded with one value at the origin over a uniform
//! background. Every step, each cell splits its value into `2n + 1` equal
//! shares and hands one share to each neighbor whose value differs from
//! its own. Only the canonical region of the lattice is stored, either in
//! memory or as budget-sized block files on disk.
//!
//! # Modules
//!
//! - [`config`] -- YAML configuration with defaults and validation.
//! - [`engine`] -- [`SpreadIntegerValue`], seeding and stepping.
//! - [`grid`] -- [`SymmetricGrid`], the backend-independent read API.
//! - [`paged`] -- Options for generations kept in block files.
//! - [`pipeline`] -- Streaming block processors and cross-sections.
//! - [`backup`] -- Versioned backups and exact resumption.
//! - [`runner`] -- The step loop with stop conditions and periodic backups.
//! - [`error`] -- [`EvolutionError`].
//!
//! [`SpreadIntegerValue`]: engine::SpreadIntegerValue
//! [`SymmetricGrid`]: grid::SymmetricGrid
//! [`EvolutionError`]: error::EvolutionError

pub mod backup;
pub mod config;
pub mod engine;
pub mod error;
pub mod grid;
mod kernel;
pub mod paged;
pub mod pipeline;
pub mod runner;

pub use backup::{
    BackupError, BackupManifest, RestoreTarget, RestoredGrid, read_manifest, restore,
    restore_any, write_backup,
};
pub use config::{ConfigError, SimulationConfig};
pub use engine::{Backend, GridState, INITIAL_SIDE, SpreadIntegerValue, sub_folder_path};
pub use error::EvolutionError;
pub use grid::SymmetricGrid;
pub use paged::PagedOptions;
pub use pipeline::{
    BlockProcessor, BlockSource, CellCollector, CrossSectionProcessor, GridRegion,
    MassProcessor, MinMaxProcessor, PipelineError, StoredBlocks, run_pipeline, total_mass,
};
pub use runner::{
    NoOpCallback, RunOptions, RunnerError, SimulationEndReason, SimulationResult, StepCallback,
    StepSummary, StopSignal, run_simulation,
};
