//! Configuration loading and typed config structures for SIV runs.
//!
//! The configuration lives in `siv-config.yaml` next to the binary (the
//! path can be overridden with `SIV_CONFIG`). Every field has a default, so
//! an empty file or a missing section yields a runnable configuration.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use siv_blocks::MemoryModel;
use siv_lattice::ValueWidth;

use crate::engine::Backend;
use crate::paged::PagedOptions;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but describes an impossible run.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level run configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SimulationConfig {
    /// The automaton being evolved.
    #[serde(default)]
    pub automaton: AutomatonConfig,

    /// Where and how generations are stored.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Loop bounds, backups, and pipeline passes.
    #[serde(default)]
    pub run: RunConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        Ok(config)
    }

    /// Checks the semantic constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let automaton = &self.automaton;
        if automaton.dimension == 0 {
            return Err(invalid("automaton.dimension must be at least 1"));
        }
        for (field, value) in [
            ("initial_value", automaton.initial_value),
            ("background_value", automaton.background_value),
        ] {
            if !fits_width(value, automaton.value_width) {
                return Err(invalid(format!(
                    "automaton.{field} = {value} does not fit {}",
                    automaton.value_width
                )));
            }
        }
        let directions = u64::try_from(automaton.dimension)
            .ok()
            .and_then(|n| n.checked_mul(2))
            .and_then(|n| n.checked_add(1))
            .ok_or_else(|| invalid("automaton.dimension is too large"))?;
        if automaton.background_value.unsigned_abs() >= directions {
            return Err(invalid(format!(
                "automaton.background_value must satisfy |background| < {directions}"
            )));
        }
        if self.storage.block_budget_bytes == 0 {
            return Err(invalid("storage.block_budget_bytes must be positive"));
        }
        if self.run.backup_every > 0 && self.run.backup_name.trim().is_empty() {
            return Err(invalid("run.backup_name must not be empty"));
        }
        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        reason: reason.into(),
    }
}

fn fits_width(value: i64, width: ValueWidth) -> bool {
    match width {
        ValueWidth::I32 => i32::try_from(value).is_ok(),
        ValueWidth::I64 => true,
    }
}

/// The automaton: lattice dimension and the two seed values.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AutomatonConfig {
    /// Number of lattice axes.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Value placed at the origin before the first step.
    #[serde(default = "default_initial_value")]
    pub initial_value: i64,

    /// Value of every other cell, including the unallocated exterior.
    #[serde(default)]
    pub background_value: i64,

    /// Integer width of the cells.
    #[serde(default = "default_value_width")]
    pub value_width: ValueWidth,
}

impl Default for AutomatonConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            initial_value: default_initial_value(),
            background_value: 0,
            value_width: default_value_width(),
        }
    }
}

/// Generation storage.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageConfig {
    /// `memory` keeps the generation in one packed array; `paged` keeps it
    /// in block files under `work_dir`.
    #[serde(default)]
    pub backend: Backend,

    /// Root of the paged work folders. A per-automaton sub-folder is
    /// appended at run time.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Estimated bytes a single block may occupy in memory.
    #[serde(default = "default_block_budget_bytes")]
    pub block_budget_bytes: u64,

    /// Overhead constants used to estimate block footprints.
    #[serde(default)]
    pub memory_model: MemoryModel,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            work_dir: default_work_dir(),
            block_budget_bytes: default_block_budget_bytes(),
            memory_model: MemoryModel::default(),
        }
    }
}

impl StorageConfig {
    /// Paged options for the automaton stored under `sub_folder`.
    pub fn paged_options(&self, sub_folder: &Path) -> PagedOptions {
        PagedOptions {
            work_dir: self.work_dir.join(sub_folder),
            budget: self.block_budget_bytes,
            model: self.memory_model,
        }
    }
}

/// Loop bounds, backups, and pipeline passes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunConfig {
    /// Stop after this many steps; 0 runs until stable or stopped.
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,

    /// Stop once a step reports no toppling.
    #[serde(default = "default_true")]
    pub stop_when_stable: bool,

    /// Write a backup every N steps; 0 disables periodic backups.
    #[serde(default)]
    pub backup_every: u64,

    /// Root of the backup folders. A per-automaton sub-folder is appended.
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,

    /// Name of the backup folder, replaced on every backup.
    #[serde(default = "default_backup_name")]
    pub backup_name: String,

    /// Run the processing pipeline every N steps; 0 disables it.
    #[serde(default)]
    pub process_every: u64,

    /// Resume from this backup folder instead of seeding a new grid.
    #[serde(default)]
    pub restore_from: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            stop_when_stable: true,
            backup_every: 0,
            backup_dir: default_backup_dir(),
            backup_name: default_backup_name(),
            process_every: 0,
            restore_from: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error), used when `RUST_LOG`
    /// is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_dimension() -> usize {
    2
}

const fn default_initial_value() -> i64 {
    1_000
}

const fn default_value_width() -> ValueWidth {
    ValueWidth::I64
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("siv-work")
}

const fn default_block_budget_bytes() -> u64 {
    67_108_864
}

const fn default_max_steps() -> u64 {
    1_000
}

const fn default_true() -> bool {
    true
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("siv-backups")
}

fn default_backup_name() -> String {
    "latest".to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}
