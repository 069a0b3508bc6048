//! Append-only block and undo file streams.
//!
//! Blocks live in `plrNNNNNNNNNN.dat`, undo records in `revNNNNNNNNNN.dat`,
//! both zero-padded to ten digits under one storage directory. Files grow
//! strictly by append; a file closes when the next record would push it past
//! the size cap, and the writer rolls over to the next index. Every record
//! opens with the magic bytes and a length prefix; undo records also carry a
//! trailing double-SHA256 checksum of their payload.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::block::Block;
use crate::block_index::BlockIndex;
use crate::constants::{MAGIC_BYTES, MAX_FILE_SIZE};
use crate::crypto::{double_sha256, Hash};
use crate::error::{ChainError, Result};

fn plr_file_name(file_index: u32) -> String {
    format!("plr{file_index:010}.dat")
}

fn rev_file_name(file_index: u32) -> String {
    format!("rev{file_index:010}.dat")
}

/// Appends block records, maintaining the current file index, its remaining
/// capacity and the plr side of the file-info records.
pub struct BlockWriter {
    file_index: u32,
    dir: PathBuf,
    max_size: u64,
    rem_size: u64,
    block_count: u32,
    lowest_height: u32,
}

impl BlockWriter {
    pub fn open(dir: PathBuf, index: &BlockIndex) -> Result<Self> {
        Self::open_with_max_size(dir, index, MAX_FILE_SIZE)
    }

    /// Resume from the persisted last-file-index singleton and the current
    /// file's info record; both are created on first open. Tests shrink
    /// `max_size` to force rollover.
    pub fn open_with_max_size(dir: PathBuf, index: &BlockIndex, max_size: u64) -> Result<Self> {
        let file_index = match index.last_plr_file_index()? {
            Some(existing) => existing,
            None => {
                index.set_last_plr_file_index(0)?;
                0
            }
        };
        let (rem_size, block_count, lowest_height) = match index.file_info_record(file_index)? {
            Some(record) => (
                max_size.saturating_sub(u64::from(record.plr_bytes)),
                record.block_count,
                record.lowest_height,
            ),
            None => (max_size, 0, 0),
        };
        Ok(BlockWriter {
            file_index,
            dir,
            max_size,
            rem_size,
            block_count,
            lowest_height,
        })
    }

    pub fn file_index(&self) -> u32 {
        self.file_index
    }

    /// Append one block record and return its (file index, offset) locator.
    /// The file-info record is refreshed after the write, leaving the undo
    /// byte count untouched.
    pub fn write(&mut self, block: &Block, height: u32, index: &BlockIndex) -> Result<(u32, u32)> {
        let ser = block.serialize();
        let mut data = Vec::with_capacity(8 + ser.len());
        data.extend_from_slice(&MAGIC_BYTES);
        data.extend_from_slice(&(ser.len() as u32).to_be_bytes());
        data.extend_from_slice(&ser);

        if data.len() as u64 > self.rem_size {
            self.roll_over(height, index)?;
        }

        fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(self.dir.join(plr_file_name(self.file_index)))?;
        file.write_all(&data)?;

        let offset = (self.max_size - self.rem_size) as u32;
        self.rem_size = self.rem_size.saturating_sub(data.len() as u64);
        self.block_count += 1;
        if self.block_count == 1 {
            self.lowest_height = height;
        }
        index.update_plr_info(
            self.file_index,
            self.block_count,
            (self.max_size - self.rem_size) as u32,
            self.lowest_height,
            height,
        )?;
        Ok((self.file_index, offset))
    }

    /// Finalize the current file's record, bump the file index and persist
    /// it, then reset the capacity counters.
    fn roll_over(&mut self, next_height: u32, index: &BlockIndex) -> Result<()> {
        index.update_plr_info(
            self.file_index,
            self.block_count,
            (self.max_size - self.rem_size) as u32,
            self.lowest_height,
            next_height.saturating_sub(1),
        )?;
        self.file_index += 1;
        index.set_last_plr_file_index(self.file_index)?;
        self.rem_size = self.max_size;
        self.block_count = 0;
        tracing::debug!(file_index = self.file_index, "rolled over to a new block file");
        Ok(())
    }
}

/// Appends undo records, mirroring [`BlockWriter`] for the rev stream and the
/// undo side of the file-info records.
pub struct UndoWriter {
    file_index: u32,
    dir: PathBuf,
    max_size: u64,
    rem_size: u64,
}

impl UndoWriter {
    pub fn open(dir: PathBuf, index: &BlockIndex) -> Result<Self> {
        Self::open_with_max_size(dir, index, MAX_FILE_SIZE)
    }

    pub fn open_with_max_size(dir: PathBuf, index: &BlockIndex, max_size: u64) -> Result<Self> {
        let file_index = match index.last_undo_file_index()? {
            Some(existing) => existing,
            None => {
                index.set_last_undo_file_index(0)?;
                0
            }
        };
        let rem_size = match index.file_info_record(file_index)? {
            Some(record) => max_size.saturating_sub(u64::from(record.undo_bytes)),
            None => max_size,
        };
        Ok(UndoWriter {
            file_index,
            dir,
            max_size,
            rem_size,
        })
    }

    pub fn file_index(&self) -> u32 {
        self.file_index
    }

    /// Append one undo record (magic, u64 length, payload, checksum) and
    /// return its (file index, offset) locator. Plr fields of the shared
    /// file-info record are preserved.
    pub fn write(&mut self, payload: &[u8], checksum: &Hash, index: &BlockIndex) -> Result<(u32, u32)> {
        let mut data = Vec::with_capacity(44 + payload.len());
        data.extend_from_slice(&MAGIC_BYTES);
        data.extend_from_slice(&(payload.len() as u64).to_be_bytes());
        data.extend_from_slice(payload);
        data.extend_from_slice(checksum);

        if data.len() as u64 > self.rem_size {
            index.update_undo_info(self.file_index, (self.max_size - self.rem_size) as u32)?;
            self.file_index += 1;
            index.set_last_undo_file_index(self.file_index)?;
            self.rem_size = self.max_size;
            tracing::debug!(file_index = self.file_index, "rolled over to a new undo file");
        }

        fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(self.dir.join(rev_file_name(self.file_index)))?;
        file.write_all(&data)?;

        let offset = (self.max_size - self.rem_size) as u32;
        self.rem_size = self.rem_size.saturating_sub(data.len() as u64);
        index.update_undo_info(self.file_index, (self.max_size - self.rem_size) as u32)?;
        Ok((self.file_index, offset))
    }
}

/// Read a block record at its locator, re-checking the magic bytes and length
/// prefix. Returns the serialized block.
pub fn read_block_at(dir: &Path, file_index: u32, offset: u32) -> Result<Vec<u8>> {
    let mut file = File::open(dir.join(plr_file_name(file_index)))?;
    file.seek(SeekFrom::Start(u64::from(offset)))?;

    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)?;
    if magic != MAGIC_BYTES {
        return Err(ChainError::Serialization("bad magic bytes in block record"));
    }
    let mut len_bytes = [0u8; 4];
    file.read_exact(&mut len_bytes)?;
    let mut data = vec![0u8; u32::from_be_bytes(len_bytes) as usize];
    file.read_exact(&mut data)?;
    Ok(data)
}

/// Read an undo record at its locator, re-checking the magic bytes, length
/// prefix and trailing checksum. Returns the undo payload.
pub fn read_undo_at(dir: &Path, file_index: u32, offset: u32) -> Result<Vec<u8>> {
    let mut file = File::open(dir.join(rev_file_name(file_index)))?;
    file.seek(SeekFrom::Start(u64::from(offset)))?;

    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)?;
    if magic != MAGIC_BYTES {
        return Err(ChainError::Serialization("bad magic bytes in undo record"));
    }
    let mut len_bytes = [0u8; 8];
    file.read_exact(&mut len_bytes)?;
    let mut payload = vec![0u8; u64::from_be_bytes(len_bytes) as usize];
    file.read_exact(&mut payload)?;
    let mut checksum = [0u8; 32];
    file.read_exact(&mut checksum)?;
    if double_sha256(&payload) != checksum {
        return Err(ChainError::Serialization("undo record checksum mismatch"));
    }
    Ok(payload)
}
