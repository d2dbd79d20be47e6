//! Block file encoding.
//!
//! A block file is a fixed-size bincode header followed by the bincode
//! encoding of the block's slices:
//!
//! ```text
//! [magic "SIVB"][version][width][dimension][min_x][max_x][payload_len][crc32]
//! [slices...]
//! ```
//!
//! The CRC32 covers the payload only. Files are written to a temporary
//! sibling and renamed into place, so a reader never observes a partial
//! block.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use siv_lattice::{CellValue, ValueWidth};
use tracing::debug;

use crate::block::GridBlock;
use crate::error::BlockError;
use crate::slice::GridSlice;

/// Version of the block file format.
pub const BLOCK_FORMAT_VERSION: u16 = 1;

/// Magic bytes identifying block files.
pub const BLOCK_MAGIC: [u8; 4] = *b"SIVB";

/// Fixed-size header at the start of every block file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Always [`BLOCK_MAGIC`].
    pub magic: [u8; 4],
    /// Format version, currently [`BLOCK_FORMAT_VERSION`].
    pub version: u16,
    /// Width of the stored cells.
    pub width: ValueWidth,
    /// Lattice dimension.
    pub dimension: u32,
    /// First slice.
    pub min_x: u32,
    /// Last slice.
    pub max_x: u32,
    /// Payload length in bytes.
    pub payload_len: u64,
    /// CRC32 of the payload.
    pub checksum: u32,
}

impl BlockHeader {
    const fn template() -> Self {
        Self {
            magic: BLOCK_MAGIC,
            version: BLOCK_FORMAT_VERSION,
            width: ValueWidth::I32,
            dimension: 0,
            min_x: 0,
            max_x: 0,
            payload_len: 0,
            checksum: 0,
        }
    }

    /// Encoded size of the header in bytes.
    pub fn encoded_len() -> Result<usize, BlockError> {
        let size = bincode::serialized_size(&Self::template())?;
        usize::try_from(size).map_err(|_e| corrupted("header size does not fit in memory"))
    }
}

fn corrupted(reason: impl Into<String>) -> BlockError {
    BlockError::Corrupted {
        reason: reason.into(),
    }
}

fn calculate_checksum(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Encodes a block into header and payload bytes.
pub fn encode_block<V: CellValue>(block: &GridBlock<V>) -> Result<Vec<u8>, BlockError> {
    let payload = bincode::serialize(block.slices())?;
    let header = BlockHeader {
        magic: BLOCK_MAGIC,
        version: BLOCK_FORMAT_VERSION,
        width: V::WIDTH,
        dimension: u32::try_from(block.dimension())
            .map_err(|_e| corrupted("dimension does not fit the header"))?,
        min_x: block.min_x(),
        max_x: block.max_x(),
        payload_len: u64::try_from(payload.len())
            .map_err(|_e| corrupted("payload length does not fit the header"))?,
        checksum: calculate_checksum(&payload),
    };
    let mut buffer = bincode::serialize(&header)?;
    buffer.extend_from_slice(&payload);
    Ok(buffer)
}

/// Decodes and validates a block header.
pub fn decode_header(data: &[u8]) -> Result<BlockHeader, BlockError> {
    let header_len = BlockHeader::encoded_len()?;
    let header_bytes = data
        .get(..header_len)
        .ok_or_else(|| corrupted("data too small to contain a block header"))?;
    let header: BlockHeader = bincode::deserialize(header_bytes)?;
    if header.magic != BLOCK_MAGIC {
        return Err(corrupted("invalid block magic"));
    }
    if header.version != BLOCK_FORMAT_VERSION {
        return Err(BlockError::VersionMismatch {
            expected: BLOCK_FORMAT_VERSION,
            found: header.version,
        });
    }
    if header.min_x > header.max_x {
        return Err(corrupted(format!(
            "inverted range [{}, {}]",
            header.min_x, header.max_x
        )));
    }
    Ok(header)
}

/// Decodes a block, checking magic, version, width, and checksum.
pub fn decode_block<V: CellValue>(data: &[u8]) -> Result<GridBlock<V>, BlockError> {
    let header = decode_header(data)?;
    if header.width != V::WIDTH {
        return Err(BlockError::WidthMismatch {
            expected: V::WIDTH,
            found: header.width,
        });
    }
    let header_len = BlockHeader::encoded_len()?;
    let payload = data
        .get(header_len..)
        .ok_or_else(|| corrupted("data smaller than header size"))?;
    if u64::try_from(payload.len()).ok() != Some(header.payload_len) {
        return Err(corrupted(format!(
            "payload is {} bytes, header says {}",
            payload.len(),
            header.payload_len
        )));
    }
    if calculate_checksum(payload) != header.checksum {
        return Err(corrupted("checksum mismatch"));
    }
    let slices: Vec<GridSlice<V>> = bincode::deserialize(payload)?;
    let dimension = usize::try_from(header.dimension)
        .map_err(|_e| corrupted("dimension does not fit in memory"))?;
    GridBlock::from_slices(dimension, header.min_x, header.max_x, slices)
}

/// Writes `data` to `path` through a temporary sibling and a rename.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), BlockError> {
    let tmp = path.with_extension("tmp");
    let write = || -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    };
    write().map_err(|source| {
        let _ = fs::remove_file(&tmp);
        BlockError::io(path, source)
    })
}

/// Encodes `block` and writes it atomically to `path`.
pub fn write_block_file<V: CellValue>(path: &Path, block: &GridBlock<V>) -> Result<(), BlockError> {
    let data = encode_block(block)?;
    atomic_write(path, &data)?;
    debug!(
        path = %path.display(),
        min_x = block.min_x(),
        max_x = block.max_x(),
        bytes = data.len(),
        "Block written"
    );
    Ok(())
}

/// Reads and decodes the block file at `path`.
pub fn read_block_file<V: CellValue>(path: &Path) -> Result<GridBlock<V>, BlockError> {
    let data = fs::read(path).map_err(|source| BlockError::io(path, source))?;
    let block = decode_block(&data)?;
    debug!(
        path = %path.display(),
        min_x = block.min_x(),
        max_x = block.max_x(),
        "Block read"
    );
    Ok(block)
}

/// Reads only the header of the block file at `path`.
pub fn read_block_header(path: &Path) -> Result<BlockHeader, BlockError> {
    let header_len = BlockHeader::encoded_len()?;
    let mut buffer = vec![0_u8; header_len];
    let mut file = fs::File::open(path).map_err(|source| BlockError::io(path, source))?;
    file.read_exact(&mut buffer)
        .map_err(|source| BlockError::io(path, source))?;
    decode_header(&buffer)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use super::*;

    fn make_block() -> GridBlock<i64> {
        let mut block = GridBlock::new(3, 2, 4).unwrap();
        for x in 2..=4 {
            let mut slice = GridSlice::filled(3, x, -1).unwrap();
            slice.values_mut()[0] = i64::from(x) * 1_000_000_007;
            block.push_slice(slice).unwrap();
        }
        block
    }

    #[test]
    fn header_size_is_fixed() {
        let block = make_block();
        let encoded = encode_block(&block).unwrap();
        let header = decode_header(&encoded).unwrap();
        assert_eq!(header.width, ValueWidth::I64);
        assert_eq!((header.min_x, header.max_x, header.dimension), (2, 4, 3));
        assert_eq!(
            encoded.len(),
            BlockHeader::encoded_len().unwrap() + usize::try_from(header.payload_len).unwrap()
        );
    }

    #[test]
    fn blocks_survive_encoding() {
        let block = make_block();
        let decoded: GridBlock<i64> = decode_block(&encode_block(&block).unwrap()).unwrap();
        assert_eq!(decoded, block);
    }

    #[test]
    fn flipped_payload_byte_fails_checksum() {
        let mut encoded = encode_block(&make_block()).unwrap();
        let last = encoded.len() - 1;
        encoded[last] ^= 0xFF;
        let err = decode_block::<i64>(&encoded).unwrap_err();
        assert!(matches!(err, BlockError::Corrupted { .. }), "{err}");
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let mut encoded = encode_block(&make_block()).unwrap();
        encoded[0] = b'X';
        assert!(matches!(
            decode_block::<i64>(&encoded),
            Err(BlockError::Corrupted { .. })
        ));
    }

    #[test]
    fn future_versions_are_rejected() {
        let mut encoded = encode_block(&make_block()).unwrap();
        // Version follows the four magic bytes, little endian.
        encoded[4] = 9;
        assert!(matches!(
            decode_block::<i64>(&encoded),
            Err(BlockError::VersionMismatch {
                expected: 1,
                found: 9
            })
        ));
    }

    #[test]
    fn width_is_enforced() {
        let encoded = encode_block(&make_block()).unwrap();
        assert!(matches!(
            decode_block::<i32>(&encoded),
            Err(BlockError::WidthMismatch { .. })
        ));
    }

    #[test]
    fn truncated_data_is_corrupted() {
        assert!(matches!(
            decode_header(&[0_u8; 3]),
            Err(BlockError::Corrupted { .. })
        ));
    }

    #[test]
    fn files_round_trip_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let block = make_block();
        let path = dir.path().join(block.file_name());
        write_block_file(&path, &block).unwrap();
        assert!(!path.with_extension("tmp").exists());
        assert_eq!(read_block_file::<i64>(&path).unwrap(), block);
        assert_eq!(read_block_header(&path).unwrap().max_x, 4);
    }
}
