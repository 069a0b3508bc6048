//! Block index: a key-value database of block records (`'b'`), file-info
//! records (`'f'`), transaction locators (`'t'`) and the two last-file-index
//! singletons (`'I'` for plr files, `'U'` for undo files).
//!
//! This is the same engine family as the chainstate but a distinct physical
//! database, with the same obfuscation at rest.

use std::path::Path;

use crate::block::{Block, FIRST_TX_OFFSET};
use crate::crypto::Hash;
use crate::db::{
    build_key, DbWrapper, BLOCK_INDEX_KEY, FILE_INFO_KEY, LAST_PLR_FILE_KEY, LAST_UNDO_FILE_KEY,
    TX_INDEX_KEY,
};
use crate::error::{ChainError, Result};
use crate::serialization::{read_bytes, read_u32};

/// Where a block lives: its header, height, transaction count and the file
/// locators of its block and undo records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockIndexRecord {
    pub header: Vec<u8>,
    pub height: u32,
    pub tx_count: u32,
    pub plr_file_index: u32,
    pub plr_offset: u32,
    pub undo_file_index: u32,
    pub undo_offset: u32,
}

impl BlockIndexRecord {
    fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.header.len() + 24);
        buf.extend_from_slice(&self.header);
        buf.extend_from_slice(&self.height.to_be_bytes());
        buf.extend_from_slice(&self.tx_count.to_be_bytes());
        buf.extend_from_slice(&self.plr_file_index.to_be_bytes());
        buf.extend_from_slice(&self.plr_offset.to_be_bytes());
        buf.extend_from_slice(&self.undo_file_index.to_be_bytes());
        buf.extend_from_slice(&self.undo_offset.to_be_bytes());
        buf
    }

    fn deserialize(data: &[u8]) -> Result<Self> {
        let header = read_bytes(data, 0, 80)?.to_vec();
        Ok(BlockIndexRecord {
            header,
            height: read_u32(data, 80)?,
            tx_count: read_u32(data, 84)?,
            plr_file_index: read_u32(data, 88)?,
            plr_offset: read_u32(data, 92)?,
            undo_file_index: read_u32(data, 96)?,
            undo_offset: read_u32(data, 100)?,
        })
    }
}

/// Fill level and height range of one plr/rev file pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileInfoRecord {
    pub block_count: u32,
    pub plr_bytes: u32,
    pub undo_bytes: u32,
    pub lowest_height: u32,
    pub highest_height: u32,
}

impl FileInfoRecord {
    fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(20);
        buf.extend_from_slice(&self.block_count.to_be_bytes());
        buf.extend_from_slice(&self.plr_bytes.to_be_bytes());
        buf.extend_from_slice(&self.undo_bytes.to_be_bytes());
        buf.extend_from_slice(&self.lowest_height.to_be_bytes());
        buf.extend_from_slice(&self.highest_height.to_be_bytes());
        buf
    }

    fn deserialize(data: &[u8]) -> Result<Self> {
        Ok(FileInfoRecord {
            block_count: read_u32(data, 0)?,
            plr_bytes: read_u32(data, 4)?,
            undo_bytes: read_u32(data, 8)?,
            lowest_height: read_u32(data, 12)?,
            highest_height: read_u32(data, 16)?,
        })
    }
}

/// Where a transaction's canonical bytes live: file, block offset within the
/// file, and the offset of its length prefix within the block record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIndexRecord {
    pub plr_file_index: u32,
    pub block_offset: u32,
    pub tx_offset: u32,
}

pub struct BlockIndex {
    db: DbWrapper,
}

impl BlockIndex {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(BlockIndex {
            db: DbWrapper::open(path, true)?,
        })
    }

    pub fn insert_block_record(&self, block_hash: &Hash, record: &BlockIndexRecord) -> Result<()> {
        self.db
            .insert(&build_key(BLOCK_INDEX_KEY, block_hash), &record.serialize())
    }

    pub fn block_record(&self, block_hash: &Hash) -> Result<Option<BlockIndexRecord>> {
        self.db
            .get(&build_key(BLOCK_INDEX_KEY, block_hash))?
            .map(|data| BlockIndexRecord::deserialize(&data))
            .transpose()
    }

    pub fn file_info_record(&self, file_index: u32) -> Result<Option<FileInfoRecord>> {
        self.db
            .get(&build_key(FILE_INFO_KEY, &file_index.to_be_bytes()))?
            .map(|data| FileInfoRecord::deserialize(&data))
            .transpose()
    }

    fn put_file_info_record(&self, file_index: u32, record: &FileInfoRecord) -> Result<()> {
        self.db.insert(
            &build_key(FILE_INFO_KEY, &file_index.to_be_bytes()),
            &record.serialize(),
        )
    }

    /// Update the plr side of a file-info record, preserving whatever the
    /// undo writer has recorded for the same file.
    pub fn update_plr_info(
        &self,
        file_index: u32,
        block_count: u32,
        plr_bytes: u32,
        lowest_height: u32,
        highest_height: u32,
    ) -> Result<()> {
        let undo_bytes = self
            .file_info_record(file_index)?
            .map_or(0, |record| record.undo_bytes);
        self.put_file_info_record(
            file_index,
            &FileInfoRecord {
                block_count,
                plr_bytes,
                undo_bytes,
                lowest_height,
                highest_height,
            },
        )
    }

    /// Update the undo side of a file-info record, preserving the plr fields.
    pub fn update_undo_info(&self, file_index: u32, undo_bytes: u32) -> Result<()> {
        let existing = self.file_info_record(file_index)?.unwrap_or_default();
        self.put_file_info_record(
            file_index,
            &FileInfoRecord {
                undo_bytes,
                ..existing
            },
        )
    }

    /// Queue one transaction locator on the pending batch.
    pub fn insert_tx_record_batched(
        &mut self,
        txid: &Hash,
        plr_file_index: u32,
        block_offset: u32,
        tx_offset: u32,
    ) {
        let mut value = Vec::with_capacity(12);
        value.extend_from_slice(&plr_file_index.to_be_bytes());
        value.extend_from_slice(&block_offset.to_be_bytes());
        value.extend_from_slice(&tx_offset.to_be_bytes());
        self.db.put_in_batch(&build_key(TX_INDEX_KEY, txid), &value);
    }

    pub fn tx_record(&self, txid: &Hash) -> Result<Option<TxIndexRecord>> {
        self.db
            .get(&build_key(TX_INDEX_KEY, txid))?
            .map(|data| {
                Ok(TxIndexRecord {
                    plr_file_index: read_u32(&data, 0)?,
                    block_offset: read_u32(&data, 4)?,
                    tx_offset: read_u32(&data, 8)?,
                })
            })
            .transpose()
    }

    pub fn write_batch(&mut self) -> Result<()> {
        self.db.write_batch()
    }

    /// Batch locators for every transaction of a freshly written block,
    /// advancing a byte cursor across the serialized layout, then commit.
    pub fn index_block_transactions(
        &mut self,
        block: &Block,
        plr_file_index: u32,
        block_offset: u32,
    ) -> Result<()> {
        let mut cursor = FIRST_TX_OFFSET;
        for tx in block.transactions() {
            self.insert_tx_record_batched(&tx.txid, plr_file_index, block_offset, cursor);
            cursor += 4 + tx.serialize().len() as u32;
        }
        self.write_batch()
    }

    pub fn last_plr_file_index(&self) -> Result<Option<u32>> {
        self.read_singleton(&LAST_PLR_FILE_KEY)
    }

    pub fn set_last_plr_file_index(&self, file_index: u32) -> Result<()> {
        self.db.insert(&LAST_PLR_FILE_KEY, &file_index.to_be_bytes())
    }

    pub fn last_undo_file_index(&self) -> Result<Option<u32>> {
        self.read_singleton(&LAST_UNDO_FILE_KEY)
    }

    pub fn set_last_undo_file_index(&self, file_index: u32) -> Result<()> {
        self.db
            .insert(&LAST_UNDO_FILE_KEY, &file_index.to_be_bytes())
    }

    fn read_singleton(&self, key: &[u8]) -> Result<Option<u32>> {
        match self.db.get(key)? {
            Some(data) if data.len() == 4 => Ok(Some(read_u32(&data, 0)?)),
            Some(_) => Err(ChainError::IndexIo(
                "malformed last-file-index singleton".into(),
            )),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_block_record() -> BlockIndexRecord {
        BlockIndexRecord {
            header: vec![0xab; 80],
            height: 12,
            tx_count: 3,
            plr_file_index: 1,
            plr_offset: 4_096,
            undo_file_index: 1,
            undo_offset: 128,
        }
    }

    #[test]
    fn block_records_round_trip() {
        let dir = TempDir::new().unwrap();
        let index = BlockIndex::open(dir.path()).unwrap();
        let record = sample_block_record();
        index.insert_block_record(&[0x01; 32], &record).unwrap();
        assert_eq!(index.block_record(&[0x01; 32]).unwrap(), Some(record));
        assert_eq!(index.block_record(&[0x02; 32]).unwrap(), None);
    }

    #[test]
    fn plr_and_undo_updates_preserve_each_other() {
        let dir = TempDir::new().unwrap();
        let index = BlockIndex::open(dir.path()).unwrap();

        index.update_plr_info(0, 5, 700, 1, 5).unwrap();
        index.update_undo_info(0, 250).unwrap();
        index.update_plr_info(0, 6, 850, 1, 6).unwrap();

        let record = index.file_info_record(0).unwrap().unwrap();
        assert_eq!(record.block_count, 6);
        assert_eq!(record.plr_bytes, 850);
        assert_eq!(record.undo_bytes, 250);
        assert_eq!(record.lowest_height, 1);
        assert_eq!(record.highest_height, 6);
    }

    #[test]
    fn undo_update_without_plr_record_starts_from_zeroes() {
        let dir = TempDir::new().unwrap();
        let index = BlockIndex::open(dir.path()).unwrap();
        index.update_undo_info(3, 99).unwrap();
        let record = index.file_info_record(3).unwrap().unwrap();
        assert_eq!(record.undo_bytes, 99);
        assert_eq!(record.block_count, 0);
        assert_eq!(record.plr_bytes, 0);
    }

    #[test]
    fn singletons_default_to_absent() {
        let dir = TempDir::new().unwrap();
        let index = BlockIndex::open(dir.path()).unwrap();
        assert_eq!(index.last_plr_file_index().unwrap(), None);
        index.set_last_plr_file_index(7).unwrap();
        assert_eq!(index.last_plr_file_index().unwrap(), Some(7));
        assert_eq!(index.last_undo_file_index().unwrap(), None);
        index.set_last_undo_file_index(2).unwrap();
        assert_eq!(index.last_undo_file_index().unwrap(), Some(2));
    }

    #[test]
    fn tx_locators_are_batched() {
        let dir = TempDir::new().unwrap();
        let mut index = BlockIndex::open(dir.path()).unwrap();
        index.insert_tx_record_batched(&[0x0a; 32], 0, 500, 92);
        assert_eq!(index.tx_record(&[0x0a; 32]).unwrap(), None);
        index.write_batch().unwrap();
        let record = index.tx_record(&[0x0a; 32]).unwrap().unwrap();
        assert_eq!(record.plr_file_index, 0);
        assert_eq!(record.block_offset, 500);
        assert_eq!(record.tx_offset, 92);
    }
}
