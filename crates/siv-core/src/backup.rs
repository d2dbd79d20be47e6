//! Backups of a running grid.
//!
//! A backup is a folder `<path>/<name>` holding a JSON manifest and the
//! current generation as block files:
//!
//! ```text
//! <path>/<name>/manifest.json
//! <path>/<name>/grid/minX=0_maxX=41.blk
//! <path>/<name>/grid/...
//! ```
//!
//! The manifest is tagged with a format name and a version, and decoding
//! dispatches on the version through [`MANIFEST_DECODERS`]. A backup is
//! assembled in `<name>.partial` and only then renamed over `<name>`, so
//! an interrupted backup never replaces a good one.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use siv_blocks::{BlockError, BlockStore, MemoryModel};
use siv_lattice::{CellValue, ValueWidth};
use tracing::{info, warn};

use crate::engine::{Backend, Generation, GridState, SpreadIntegerValue, check_seed};
use crate::error::EvolutionError;
use crate::paged::{PagedGeneration, PagedOptions, check_tiling, export_storage, import_storage};

/// Value of the manifest's `format` tag.
pub const BACKUP_FORMAT: &str = "siv-backup";

/// Manifest version written by this build.
pub const BACKUP_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "manifest.json";
const GRID_DIR: &str = "grid";

type ManifestDecoder = fn(serde_json::Value) -> Result<BackupManifest, BackupError>;

/// Manifest decoders keyed by version.
const MANIFEST_DECODERS: &[(u64, ManifestDecoder)] = &[(1, decode_v1)];

/// Errors that can occur while writing or restoring a backup.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// A backup folder or manifest could not be read or written.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// The file or folder involved.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// The manifest is not valid JSON or does not match its version.
    #[error("malformed manifest: {source}")]
    Json {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },

    /// The manifest names a different format.
    #[error("unsupported backup format {found:?}")]
    UnsupportedFormat {
        /// The format tag found.
        found: String,
    },

    /// No decoder exists for the manifest version.
    #[error("unsupported backup version {version}")]
    UnsupportedVersion {
        /// The version found.
        version: u64,
    },

    /// A tag the manifest must carry is absent.
    #[error("manifest is missing the {field:?} field")]
    MissingField {
        /// Name of the missing field.
        field: &'static str,
    },

    /// The backup was written with another cell width.
    #[error("backup holds {found} cells, expected {expected}")]
    WidthMismatch {
        /// Width requested by the caller.
        expected: ValueWidth,
        /// Width recorded in the backup.
        found: ValueWidth,
    },

    /// A seed value in the manifest does not fit the cell width.
    #[error("{field} {value} does not fit {width} cells")]
    ValueOutOfRange {
        /// Name of the manifest field.
        field: &'static str,
        /// The recorded value.
        value: i64,
        /// The cell width.
        width: ValueWidth,
    },

    /// The folder holds no manifest, typically an interrupted backup.
    #[error("{} is not a complete backup", path.display())]
    Incomplete {
        /// The backup folder.
        path: PathBuf,
    },

    /// The block files disagree with the manifest.
    #[error("backup blocks hold a {found}-dimensional grid, manifest says {expected}")]
    DimensionMismatch {
        /// Dimension recorded in the manifest.
        expected: usize,
        /// Dimension found in the block headers.
        found: u32,
    },

    /// Reading or writing block files failed.
    #[error("block storage error: {source}")]
    Blocks {
        /// The underlying block error.
        #[from]
        source: BlockError,
    },

    /// The restored grid could not be assembled.
    #[error("evolution error: {source}")]
    Evolution {
        /// The underlying evolution error.
        #[from]
        source: EvolutionError,
    },
}

fn io_error(path: &Path, source: io::Error) -> BackupError {
    BackupError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Everything needed to resume a grid, besides its cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupManifest {
    /// Always [`BACKUP_FORMAT`].
    pub format: String,
    /// Manifest version.
    pub version: u32,
    /// Lattice dimension.
    pub dimension: usize,
    /// Width of the stored cells.
    pub value_width: ValueWidth,
    /// Value seeded at the origin.
    pub initial_value: i64,
    /// Background value.
    pub background_value: i64,
    /// Steps computed when the backup was taken.
    pub step: u64,
    /// Positions allocated per canonical axis.
    pub side: u32,
    /// Whether the next step grows the grid.
    pub bounds_reached: bool,
    /// Whether the last step toppled anything.
    pub changed: Option<bool>,
    /// Backend the grid was running on.
    pub backend: Backend,
    /// When the backup was written.
    pub created_at: DateTime<Utc>,
}

impl BackupManifest {
    fn describe<V: CellValue>(state: &GridState<V>, backend: Backend) -> Self {
        Self {
            format: BACKUP_FORMAT.to_owned(),
            version: BACKUP_VERSION,
            dimension: state.dimension,
            value_width: V::WIDTH,
            initial_value: state.initial_value.to_i64(),
            background_value: state.background_value.to_i64(),
            step: state.step,
            side: state.side,
            bounds_reached: state.bounds_reached,
            changed: state.changed,
            backend,
            created_at: Utc::now(),
        }
    }
}

/// Where a restored grid keeps its generations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreTarget {
    /// Load every cell into memory.
    Memory,
    /// Copy the blocks into a paged work folder.
    Paged(PagedOptions),
}

/// A restored grid of whichever width the backup holds.
#[derive(Debug)]
pub enum RestoredGrid {
    /// A grid of 32-bit cells.
    I32(SpreadIntegerValue<i32>),
    /// A grid of 64-bit cells.
    I64(SpreadIntegerValue<i64>),
}

/// Writes `grid` to `<path>/<name>`, replacing any previous backup there.
pub fn write_backup<V: CellValue>(
    grid: &SpreadIntegerValue<V>,
    path: &Path,
    name: &str,
) -> Result<BackupManifest, BackupError> {
    let folder = path.join(name);
    let partial = path.join(format!("{name}.partial"));
    let retired = path.join(format!("{name}.old"));
    remove_dir_if_exists(&partial)?;

    let grid_path = partial.join(GRID_DIR);
    let blocks = match grid.generation() {
        Generation::Memory(storage) => {
            let store = BlockStore::create(&grid_path)?;
            // One block, whatever the footprint.
            export_storage(storage, &store, &MemoryModel::default(), u64::MAX)?.len()
        }
        Generation::Paged(paged) => {
            let store = paged.store().copy_to(&grid_path)?;
            store.ranges()?.len()
        }
    };

    let manifest = BackupManifest::describe(&grid.state(), grid.backend());
    let manifest_path = partial.join(MANIFEST_FILE);
    let encoded = serde_json::to_vec_pretty(&manifest)?;
    fs::write(&manifest_path, encoded).map_err(|source| io_error(&manifest_path, source))?;

    remove_dir_if_exists(&retired)?;
    if folder.exists() {
        fs::rename(&folder, &retired).map_err(|source| io_error(&folder, source))?;
    }
    fs::rename(&partial, &folder).map_err(|source| io_error(&partial, source))?;
    if let Err(e) = remove_dir_if_exists(&retired) {
        warn!(error = %e, "Failed to remove the replaced backup");
    }

    info!(
        folder = %folder.display(),
        step = manifest.step,
        side = manifest.side,
        blocks,
        "Backup written"
    );
    Ok(manifest)
}

/// Reads and decodes the manifest of the backup in `folder`.
pub fn read_manifest(folder: &Path) -> Result<BackupManifest, BackupError> {
    let path = folder.join(MANIFEST_FILE);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(BackupError::Incomplete {
                path: folder.to_path_buf(),
            });
        }
        Err(source) => return Err(io_error(&path, source)),
    };
    let value: serde_json::Value = serde_json::from_str(&text)?;
    let format = value
        .get("format")
        .and_then(serde_json::Value::as_str)
        .ok_or(BackupError::MissingField { field: "format" })?;
    if format != BACKUP_FORMAT {
        return Err(BackupError::UnsupportedFormat {
            found: format.to_owned(),
        });
    }
    let version = value
        .get("version")
        .and_then(serde_json::Value::as_u64)
        .ok_or(BackupError::MissingField { field: "version" })?;
    let decode = MANIFEST_DECODERS
        .iter()
        .find(|(known, _)| *known == version)
        .map(|&(_, decode)| decode)
        .ok_or(BackupError::UnsupportedVersion { version })?;
    decode(value)
}

fn decode_v1(value: serde_json::Value) -> Result<BackupManifest, BackupError> {
    Ok(serde_json::from_value(value)?)
}

/// Restores the backup in `folder` as a grid of `V` cells.
///
/// Every check runs before the grid is assembled: the manifest must
/// decode, its width must be `V`'s, and the block files must tile the
/// recorded side.
pub fn restore<V: CellValue>(
    folder: &Path,
    target: RestoreTarget,
) -> Result<SpreadIntegerValue<V>, BackupError> {
    let manifest = read_manifest(folder)?;
    restore_with(folder, &manifest, target)
}

/// Restores the backup in `folder` at the width it was written with.
pub fn restore_any(folder: &Path, target: RestoreTarget) -> Result<RestoredGrid, BackupError> {
    let manifest = read_manifest(folder)?;
    match manifest.value_width {
        ValueWidth::I32 => Ok(RestoredGrid::I32(restore_with(folder, &manifest, target)?)),
        ValueWidth::I64 => Ok(RestoredGrid::I64(restore_with(folder, &manifest, target)?)),
    }
}

fn restore_with<V: CellValue>(
    folder: &Path,
    manifest: &BackupManifest,
    target: RestoreTarget,
) -> Result<SpreadIntegerValue<V>, BackupError> {
    if manifest.value_width != V::WIDTH {
        return Err(BackupError::WidthMismatch {
            expected: V::WIDTH,
            found: manifest.value_width,
        });
    }
    let initial_value = seed_value::<V>("initial_value", manifest.initial_value)?;
    let background_value = seed_value::<V>("background_value", manifest.background_value)?;
    check_seed(manifest.dimension, background_value)?;

    let store = BlockStore::at(folder.join(GRID_DIR));
    check_tiling(&store.ranges()?, manifest.side)?;
    if let Some(header) = store.peek_header()? {
        if header.width != V::WIDTH {
            return Err(BlockError::WidthMismatch {
                expected: V::WIDTH,
                found: header.width,
            }
            .into());
        }
        if usize::try_from(header.dimension).ok() != Some(manifest.dimension) {
            return Err(BackupError::DimensionMismatch {
                expected: manifest.dimension,
                found: header.dimension,
            });
        }
    }

    let generation = match target {
        RestoreTarget::Memory => Generation::Memory(import_storage(
            &store,
            manifest.dimension,
            manifest.side,
            background_value,
        )?),
        RestoreTarget::Paged(options) => Generation::Paged(Box::new(PagedGeneration::adopt(
            options,
            &store,
            manifest.side,
        )?)),
    };
    let state = GridState {
        dimension: manifest.dimension,
        initial_value,
        background_value,
        step: manifest.step,
        side: manifest.side,
        bounds_reached: manifest.bounds_reached,
        changed: manifest.changed,
    };
    info!(
        folder = %folder.display(),
        step = state.step,
        side = state.side,
        written_on = ?manifest.backend,
        "Backup restored"
    );
    Ok(SpreadIntegerValue::from_parts(state, generation))
}

fn seed_value<V: CellValue>(field: &'static str, value: i64) -> Result<V, BackupError> {
    V::from_i64(value).ok_or(BackupError::ValueOutOfRange {
        field,
        value,
        width: V::WIDTH,
    })
}

fn remove_dir_if_exists(path: &Path) -> Result<(), BackupError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(io_error(path, source)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;
    use crate::grid::SymmetricGrid;

    fn evolved(steps: usize) -> SpreadIntegerValue<i64> {
        let mut grid = SpreadIntegerValue::<i64>::new(2, 5_000, 0).unwrap();
        for _ in 0..steps {
            grid.next_step().unwrap();
        }
        grid
    }

    fn same_cells<V: CellValue>(a: &SpreadIntegerValue<V>, b: &SpreadIntegerValue<V>) {
        assert_eq!(a.state(), b.state());
        let (low, high) = a.bounds(0).unwrap();
        for x in low..=high {
            for y in low..=high {
                assert_eq!(a.value(&[x, y]).unwrap(), b.value(&[x, y]).unwrap());
            }
        }
    }

    #[test]
    fn restored_grid_resumes_identically() {
        let dir = tempfile::tempdir().unwrap();
        let mut grid = evolved(15);
        let manifest = write_backup(&grid, dir.path(), "latest").unwrap();
        assert_eq!(manifest.step, 15);
        assert_eq!(manifest.backend, Backend::Memory);

        let mut restored =
            restore::<i64>(&dir.path().join("latest"), RestoreTarget::Memory).unwrap();
        same_cells(&grid, &restored);
        for _ in 0..10 {
            assert_eq!(grid.next_step().unwrap(), restored.next_step().unwrap());
        }
        same_cells(&grid, &restored);
    }

    #[test]
    fn memory_backups_restore_onto_paged_storage() {
        let dir = tempfile::tempdir().unwrap();
        let grid = evolved(12);
        write_backup(&grid, dir.path(), "latest").unwrap();
        let options = PagedOptions {
            work_dir: dir.path().join("work"),
            budget: 1_000,
            model: MemoryModel::default(),
        };
        let restored =
            restore::<i64>(&dir.path().join("latest"), RestoreTarget::Paged(options)).unwrap();
        assert_eq!(restored.backend(), Backend::Paged);
        same_cells(&grid, &restored);
    }

    #[test]
    fn a_second_backup_replaces_the_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut grid = evolved(3);
        write_backup(&grid, dir.path(), "latest").unwrap();
        grid.next_step().unwrap();
        write_backup(&grid, dir.path(), "latest").unwrap();
        assert!(!dir.path().join("latest.partial").exists());
        assert!(!dir.path().join("latest.old").exists());
        assert_eq!(read_manifest(&dir.path().join("latest")).unwrap().step, 4);
    }

    #[test]
    fn width_is_checked_before_restoring() {
        let dir = tempfile::tempdir().unwrap();
        write_backup(&evolved(2), dir.path(), "latest").unwrap();
        let err = restore::<i32>(&dir.path().join("latest"), RestoreTarget::Memory).unwrap_err();
        assert!(matches!(
            err,
            BackupError::WidthMismatch {
                expected: ValueWidth::I32,
                found: ValueWidth::I64
            }
        ));
        let any = restore_any(&dir.path().join("latest"), RestoreTarget::Memory).unwrap();
        assert!(matches!(any, RestoredGrid::I64(_)));
    }

    #[test]
    fn malformed_manifests_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_backup(&evolved(2), dir.path(), "latest").unwrap();
        let folder = dir.path().join("latest");
        let manifest_path = folder.join(MANIFEST_FILE);
        let original: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&manifest_path).unwrap()).unwrap();

        let mut future = original.clone();
        future["version"] = serde_json::json!(99);
        fs::write(&manifest_path, future.to_string()).unwrap();
        assert!(matches!(
            read_manifest(&folder),
            Err(BackupError::UnsupportedVersion { version: 99 })
        ));

        let mut foreign = original.clone();
        foreign["format"] = serde_json::json!("something-else");
        fs::write(&manifest_path, foreign.to_string()).unwrap();
        assert!(matches!(
            read_manifest(&folder),
            Err(BackupError::UnsupportedFormat { .. })
        ));

        let mut untagged = original.clone();
        untagged.as_object_mut().unwrap().remove("version");
        fs::write(&manifest_path, untagged.to_string()).unwrap();
        assert!(matches!(
            read_manifest(&folder),
            Err(BackupError::MissingField { field: "version" })
        ));

        let mut truncated = original;
        truncated.as_object_mut().unwrap().remove("side");
        fs::write(&manifest_path, truncated.to_string()).unwrap();
        assert!(matches!(read_manifest(&folder), Err(BackupError::Json { .. })));

        fs::write(&manifest_path, "{ not json").unwrap();
        assert!(matches!(read_manifest(&folder), Err(BackupError::Json { .. })));

        fs::remove_file(&manifest_path).unwrap();
        assert!(matches!(
            restore::<i64>(&folder, RestoreTarget::Memory),
            Err(BackupError::Incomplete { .. })
        ));
    }

    #[test]
    fn missing_blocks_are_detected() {
        let dir = tempfile::tempdir().unwrap();
        let grid = evolved(4);
        write_backup(&grid, dir.path(), "latest").unwrap();
        let manifest_path = dir.path().join("latest").join(MANIFEST_FILE);
        let mut manifest: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&manifest_path).unwrap()).unwrap();
        manifest["side"] = serde_json::json!(grid.side() + 2);
        fs::write(&manifest_path, manifest.to_string()).unwrap();
        assert!(matches!(
            restore::<i64>(&dir.path().join("latest"), RestoreTarget::Memory),
            Err(BackupError::Evolution {
                source: EvolutionError::MissingBlock { .. }
            })
        ));
    }
}
