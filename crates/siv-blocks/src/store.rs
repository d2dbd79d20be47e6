//! A folder of block files.
//!
//! Each block lives in its own file named `minX=<min>_maxX=<max>.blk`.
//! The folder holds no index; the block list is recovered from file
//! names, and a block is located by its first slice.

use std::fs;
use std::path::{Path, PathBuf};

use siv_lattice::CellValue;
use tracing::debug;

use crate::block::{BlockRange, GridBlock};
use crate::codec::{BlockHeader, read_block_file, read_block_header, write_block_file};
use crate::error::BlockError;

/// A folder holding the blocks of one grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockStore {
    root: PathBuf,
}

impl BlockStore {
    /// Opens `root`, creating the folder if it does not exist.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self, BlockError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| BlockError::io(&root, source))?;
        Ok(Self { root })
    }

    /// Refers to `root` without touching the filesystem.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The folder path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file for a block covering `range`.
    pub fn path_for(&self, range: BlockRange) -> PathBuf {
        self.root.join(range.file_name())
    }

    /// Writes `block` into the folder, returning its path.
    pub fn save<V: CellValue>(&self, block: &GridBlock<V>) -> Result<PathBuf, BlockError> {
        let path = self.path_for(block.range());
        write_block_file(&path, block)?;
        Ok(path)
    }

    /// Ranges of every block file in the folder, sorted by first slice.
    ///
    /// A missing folder holds no blocks.
    pub fn ranges(&self) -> Result<Vec<BlockRange>, BlockError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(BlockError::io(&self.root, source)),
        };
        let mut ranges = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| BlockError::io(&self.root, source))?;
            if let Some(range) = entry.file_name().to_str().and_then(BlockRange::parse_file_name) {
                ranges.push(range);
            }
        }
        ranges.sort_unstable();
        Ok(ranges)
    }

    /// Range of the block whose first slice is `min_x`.
    pub fn find(&self, min_x: u32) -> Result<BlockRange, BlockError> {
        self.ranges()?
            .into_iter()
            .find(|range| range.min_x == min_x)
            .ok_or_else(|| BlockError::NotFound {
                min_x,
                folder: self.root.clone(),
            })
    }

    /// Range of the block holding slice `x`.
    pub fn find_containing(&self, x: u32) -> Result<BlockRange, BlockError> {
        self.ranges()?
            .into_iter()
            .find(|range| range.contains(x))
            .ok_or_else(|| BlockError::NotFound {
                min_x: x,
                folder: self.root.clone(),
            })
    }

    /// Loads the block whose first slice is `min_x`.
    pub fn load<V: CellValue>(&self, min_x: u32) -> Result<GridBlock<V>, BlockError> {
        let range = self.find(min_x)?;
        self.load_range(range)
    }

    /// Loads the block covering exactly `range`.
    pub fn load_range<V: CellValue>(&self, range: BlockRange) -> Result<GridBlock<V>, BlockError> {
        let path = self.path_for(range);
        if !path.exists() {
            return Err(BlockError::NotFound {
                min_x: range.min_x,
                folder: self.root.clone(),
            });
        }
        let block = read_block_file::<V>(&path)?;
        if block.range() != range {
            return Err(BlockError::Corrupted {
                reason: format!(
                    "{} holds [{}, {}]",
                    path.display(),
                    block.min_x(),
                    block.max_x()
                ),
            });
        }
        Ok(block)
    }

    /// Header of the first block, describing the grid's width and dimension.
    pub fn peek_header(&self) -> Result<Option<BlockHeader>, BlockError> {
        match self.ranges()?.first() {
            Some(&range) => Ok(Some(read_block_header(&self.path_for(range))?)),
            None => Ok(None),
        }
    }

    /// Returns `true` if the folder is missing or holds no files at all.
    pub fn is_empty(&self) -> Result<bool, BlockError> {
        match fs::read_dir(&self.root) {
            Ok(mut entries) => Ok(entries.next().is_none()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(source) => Err(BlockError::io(&self.root, source)),
        }
    }

    /// Deletes every block file in the folder.
    pub fn clear(&self) -> Result<(), BlockError> {
        for range in self.ranges()? {
            let path = self.path_for(range);
            fs::remove_file(&path).map_err(|source| BlockError::io(&path, source))?;
        }
        debug!(folder = %self.root.display(), "Block store cleared");
        Ok(())
    }

    /// Deletes the folder and everything in it.
    pub fn destroy(self) -> Result<(), BlockError> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(BlockError::io(&self.root, source)),
        }
    }

    /// Copies every block file into `target`, creating it.
    pub fn copy_to(&self, target: &Path) -> Result<Self, BlockError> {
        let copy = Self::create(target)?;
        for range in self.ranges()? {
            let from = self.path_for(range);
            let to = copy.path_for(range);
            fs::copy(&from, &to).map_err(|source| BlockError::io(&from, source))?;
        }
        Ok(copy)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::slice::GridSlice;

    fn make_block(min_x: u32, max_x: u32) -> GridBlock<i32> {
        let mut block = GridBlock::new(1, min_x, max_x).unwrap();
        for x in min_x..=max_x {
            let value = i32::try_from(x).unwrap();
            block.push_slice(GridSlice::filled(1, x, value).unwrap()).unwrap();
        }
        block
    }

    #[test]
    fn saved_blocks_are_listed_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::create(dir.path().join("grid")).unwrap();
        store.save(&make_block(10, 12)).unwrap();
        store.save(&make_block(0, 9)).unwrap();
        fs::write(store.root().join("notes.txt"), "ignored").unwrap();
        assert_eq!(
            store.ranges().unwrap(),
            vec![
                BlockRange { min_x: 0, max_x: 9 },
                BlockRange {
                    min_x: 10,
                    max_x: 12
                }
            ]
        );
        assert_eq!(store.find_containing(11).unwrap().min_x, 10);
    }

    #[test]
    fn load_by_first_slice() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::create(dir.path()).unwrap();
        let block = make_block(3, 5);
        store.save(&block).unwrap();
        assert_eq!(store.load::<i32>(3).unwrap(), block);
        assert!(matches!(
            store.load::<i32>(4),
            Err(BlockError::NotFound { min_x: 4, .. })
        ));
    }

    #[test]
    fn missing_folder_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::at(dir.path().join("absent"));
        assert!(store.ranges().unwrap().is_empty());
        assert!(store.is_empty().unwrap());
        assert!(store.peek_header().unwrap().is_none());
    }

    #[test]
    fn clear_and_copy() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::create(dir.path().join("a")).unwrap();
        store.save(&make_block(0, 1)).unwrap();
        let copy = store.copy_to(&dir.path().join("b")).unwrap();
        store.clear().unwrap();
        assert!(store.ranges().unwrap().is_empty());
        assert_eq!(copy.ranges().unwrap().len(), 1);
        copy.destroy().unwrap();
        assert!(!dir.path().join("b").exists());
    }
}
