//! Re-partitions a folder of block files to a new byte budget.
//!
//! ```text
//! siv-resize <source> <target> <bytes>
//! ```
//!
//! The cell width is read from the first block header. The memory model
//! comes from the `storage` section of the configuration, if one exists.

mod cli;

use std::path::PathBuf;

use siv_blocks::{BlockError, BlockStore, RepartitionSummary, repartition};
use siv_core::config::ConfigError;
use siv_lattice::ValueWidth;
use tracing::info;

const USAGE: &str = "usage: siv-resize <source> <target> <bytes>";

/// Errors the resize tool can report.
#[derive(Debug, thiserror::Error)]
enum ResizeError {
    /// The command line could not be understood.
    #[error("{message}\n{USAGE}")]
    Usage {
        /// What is wrong with the arguments.
        message: String,
    },

    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// The source folder holds no blocks.
    #[error("{} holds no block files", path.display())]
    Empty {
        /// The source folder.
        path: PathBuf,
    },

    /// Reading or writing blocks failed.
    #[error("block storage error: {source}")]
    Blocks {
        /// The underlying block error.
        #[from]
        source: BlockError,
    },
}

/// Command-line arguments.
#[derive(Debug, PartialEq, Eq)]
struct ResizeArgs {
    source: PathBuf,
    target: PathBuf,
    budget: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = cli::load_config().map_err(ResizeError::from)?;
    cli::init_logging(&config.logging);
    let args = parse_args(std::env::args().skip(1))?;
    let summary = resize(&args, &config.storage.memory_model)?;
    info!(
        source = %args.source.display(),
        target = %args.target.display(),
        budget = args.budget,
        source_blocks = summary.source_blocks,
        target_blocks = summary.target_blocks.len(),
        slices = summary.slices,
        "Re-partitioning complete"
    );
    Ok(())
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<ResizeArgs, ResizeError> {
    let usage = |message: &str| ResizeError::Usage {
        message: message.to_owned(),
    };
    let source = args.next().ok_or_else(|| usage("missing <source>"))?;
    let target = args.next().ok_or_else(|| usage("missing <target>"))?;
    let bytes = args.next().ok_or_else(|| usage("missing <bytes>"))?;
    if args.next().is_some() {
        return Err(usage("too many arguments"));
    }
    let budget = bytes
        .parse::<u64>()
        .ok()
        .filter(|&budget| budget > 0)
        .ok_or_else(|| usage("<bytes> must be a positive integer"))?;
    Ok(ResizeArgs {
        source: PathBuf::from(source),
        target: PathBuf::from(target),
        budget,
    })
}

fn resize(
    args: &ResizeArgs,
    model: &siv_blocks::MemoryModel,
) -> Result<RepartitionSummary, ResizeError> {
    let header = BlockStore::at(&args.source)
        .peek_header()?
        .ok_or_else(|| ResizeError::Empty {
            path: args.source.clone(),
        })?;
    let summary = match header.width {
        ValueWidth::I32 => repartition::<i32>(&args.source, &args.target, args.budget, model)?,
        ValueWidth::I64 => repartition::<i64>(&args.source, &args.target, args.budget, model)?,
    };
    Ok(summary)
}
