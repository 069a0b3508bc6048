//! Blocks and headers: hashing, merkle roots, mining, undo payloads and
//! block-level validation.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use p256::ecdsa::VerifyingKey;
use serde::{Deserialize, Serialize};

use crate::chainstate::Chainstate;
use crate::constants::{block_subsidy, MAX_TIMESTAMP_BUMPS, MAX_TX_PER_BLOCK};
use crate::crypto::{double_sha256, Hash};
use crate::error::{ChainError, Result};
use crate::mempool::Mempool;
use crate::merkle::compute_merkle_root;
use crate::pow::expand_bits;
use crate::serialization::{read_bytes, read_u32};
use crate::transaction::{Transaction, UtxoProvider};
use crate::tx_metadata::TxMetadataReader;

/// Serialized header length in bytes.
pub const HEADER_LEN: usize = 80;

/// Byte offset of a transaction's length prefix relative to the start of its
/// block record on disk: magic (4), record length (4), header (80), tx count
/// (4).
pub const FIRST_TX_OFFSET: u32 = 92;

fn current_unix_time() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub previous_block_hash: Hash,
    pub merkle_root: Hash,
    pub timestamp: i64,
    pub target_bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// 80-byte wire form: previous hash (32), merkle root (32), timestamp
    /// (i64), target bits (u32), nonce (u32), all big-endian.
    pub fn serialize(&self) -> Vec<u8> {
        let mut header = Vec::with_capacity(HEADER_LEN);
        header.extend_from_slice(&self.previous_block_hash);
        header.extend_from_slice(&self.merkle_root);
        header.extend_from_slice(&self.timestamp.to_be_bytes());
        header.extend_from_slice(&self.target_bits.to_be_bytes());
        header.extend_from_slice(&self.nonce.to_be_bytes());
        header
    }

    /// Block hash: double-SHA256 of the 80 header bytes.
    pub fn hash(&self) -> Hash {
        double_sha256(&self.serialize())
    }
}

/// Field accessors over a raw 80-byte header.
pub struct BlockHeaderReader<'a> {
    header: &'a [u8],
}

impl<'a> BlockHeaderReader<'a> {
    pub fn new(header: &'a [u8]) -> Result<Self> {
        if header.len() != HEADER_LEN {
            return Err(ChainError::InvalidHeaderLength);
        }
        Ok(BlockHeaderReader { header })
    }

    pub fn previous_hash(&self) -> &[u8] {
        &self.header[..32]
    }

    pub fn merkle_root(&self) -> &[u8] {
        &self.header[32..64]
    }

    pub fn timestamp(&self) -> i64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.header[64..72]);
        i64::from_be_bytes(buf)
    }

    pub fn target_bits(&self) -> u32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.header[72..76]);
        u32::from_be_bytes(buf)
    }

    pub fn nonce(&self) -> u32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.header[76..80]);
        u32::from_be_bytes(buf)
    }

    /// Reassemble the structured header from the raw bytes.
    pub fn to_header(&self) -> BlockHeader {
        let mut previous_block_hash = [0u8; 32];
        previous_block_hash.copy_from_slice(self.previous_hash());
        let mut merkle_root = [0u8; 32];
        merkle_root.copy_from_slice(self.merkle_root());
        BlockHeader {
            previous_block_hash,
            merkle_root,
            timestamp: self.timestamp(),
            target_bits: self.target_bits(),
            nonce: self.nonce(),
        }
    }
}

/// A block: header plus ordered transactions, the coinbase first once mined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    transactions: Vec<Transaction>,
}

impl Block {
    /// Assemble a candidate block on top of `previous_block_hash`. The merkle
    /// root, timestamp and nonce are filled in by mining.
    pub fn new(previous_block_hash: Hash, target_bits: u32, transactions: Vec<Transaction>) -> Self {
        Block {
            header: BlockHeader {
                previous_block_hash,
                merkle_root: [0u8; 32],
                timestamp: 0,
                target_bits,
                nonce: 0,
            },
            transactions,
        }
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn block_hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn header_bytes(&self) -> Vec<u8> {
        self.header.serialize()
    }

    /// Merkle root over the transaction ids in block order.
    pub fn merkle_root_of_transactions(&self) -> Hash {
        let ids: Vec<Hash> = self.transactions.iter().map(|tx| tx.txid).collect();
        compute_merkle_root(&ids)
    }

    pub fn compute_merkle_root(&mut self) {
        self.header.merkle_root = self.merkle_root_of_transactions();
    }

    /// Total fees collected by the block's transactions. When the coinbase is
    /// already attached it is skipped, its fee being undefined.
    pub fn block_fees(&self, contains_coinbase: bool) -> u64 {
        self.transactions
            .iter()
            .enumerate()
            .filter(|(i, _)| !(contains_coinbase && *i == 0))
            .map(|(_, tx)| tx.fees())
            .sum()
    }

    /// Serialized block: header (80), tx count (u32), then each transaction
    /// prefixed by its length (u32).
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + 4);
        buf.extend_from_slice(&self.header.serialize());
        buf.extend_from_slice(&(self.transactions.len() as u32).to_be_bytes());
        for tx in &self.transactions {
            let ser = tx.serialize();
            buf.extend_from_slice(&(ser.len() as u32).to_be_bytes());
            buf.extend_from_slice(&ser);
        }
        buf
    }

    /// Parse a block from its serialized bytes.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let header_bytes = read_bytes(data, 0, HEADER_LEN)?;
        let header = BlockHeaderReader::new(header_bytes)?.to_header();
        let tx_count = read_u32(data, HEADER_LEN)? as usize;
        let mut offset = HEADER_LEN + 4;
        let mut transactions = Vec::with_capacity(tx_count.min(MAX_TX_PER_BLOCK));
        for _ in 0..tx_count {
            let tx_len = read_u32(data, offset)? as usize;
            offset += 4;
            let tx_bytes = read_bytes(data, offset, tx_len)?;
            offset += tx_len;
            transactions.push(Transaction::deserialize(tx_bytes)?);
        }
        Ok(Block {
            header,
            transactions,
        })
    }

    /// Mine this block as the successor of `current_height`.
    ///
    /// Every candidate transaction is validated against the chainstate first;
    /// a failing one is also evicted from the mempool. The coinbase paying
    /// subsidy plus fees is prepended, the merkle root fixed, and nonces are
    /// searched from a wall-clock timestamp. Each nonce wraparound bumps the
    /// timestamp, up to [`MAX_TIMESTAMP_BUMPS`] times.
    pub fn mine(
        &mut self,
        current_height: u32,
        miner_key: &VerifyingKey,
        chainstate: &impl UtxoProvider,
        mempool: &mut Mempool,
    ) -> Result<()> {
        for tx in &self.transactions {
            if let Err(err) = tx.validate(chainstate) {
                let _ = mempool.remove(tx);
                return Err(err);
            }
        }
        if self.transactions.len() > MAX_TX_PER_BLOCK {
            return Err(ChainError::ExceededMaxTx);
        }

        let subsidy = block_subsidy(current_height + 1);
        let fees = self.block_fees(false);
        let coinbase =
            Transaction::new_coinbase("coinbase", subsidy + fees, miner_key, current_height)?;
        self.transactions.insert(0, coinbase);
        self.compute_merkle_root();

        self.header.timestamp = current_unix_time();
        self.header.nonce = 0;
        let target = expand_bits(self.header.target_bits);
        let mut time_bumps: u8 = 0;
        loop {
            if self.block_hash() < target {
                return Ok(());
            }
            self.header.nonce = self.header.nonce.wrapping_add(1);
            if self.header.nonce == 0 {
                if time_bumps < MAX_TIMESTAMP_BUMPS {
                    self.header.timestamp += 1;
                    time_bumps += 1;
                } else {
                    return Err(ChainError::StaleBlock);
                }
            }
        }
    }

    /// Validate every non-coinbase transaction and reject any output
    /// referenced twice across the block.
    fn validate_transactions(&self, chainstate: &impl UtxoProvider) -> Result<()> {
        let mut referenced: HashSet<Hash> = HashSet::new();
        for tx in self.transactions.iter().skip(1) {
            tx.validate(chainstate)?;
            for input in tx.inputs() {
                if !referenced.insert(input.output_referred.output_id) {
                    return Err(ChainError::InvalidTxInBlock);
                }
            }
        }
        Ok(())
    }

    /// The coinbase may claim at most the subsidy at `height` plus the fees
    /// collected from the other transactions.
    pub fn validate_coinbase(&self, height: u32) -> Result<()> {
        let Some(coinbase) = self.transactions.first() else {
            return Err(ChainError::InvalidTxInBlock);
        };
        let mut coinbase_value: u64 = 0;
        for output in coinbase.outputs() {
            coinbase_value = coinbase_value
                .checked_add(output.value)
                .ok_or(ChainError::InvalidTxInBlock)?;
        }
        let ceiling = block_subsidy(height).saturating_add(self.block_fees(true));
        if coinbase_value > ceiling {
            return Err(ChainError::InvalidTxInBlock);
        }
        Ok(())
    }

    /// Full validation at insertion height: transactions, coinbase ceiling,
    /// merkle recomputation, then the header checks.
    pub fn validate(&self, height: u32, chainstate: &impl UtxoProvider) -> Result<()> {
        self.validate_transactions(chainstate)?;
        self.validate_coinbase(height)?;
        if self.header.merkle_root != self.merkle_root_of_transactions() {
            return Err(ChainError::InvalidMerkleRoot);
        }
        validate_block_header(&self.header.serialize())?;
        Ok(())
    }

    /// Undo payload and checksum: the prior state of every UTXO this block
    /// consumes, read from chainstate metadata before confirmation removes
    /// it. Per record: a u64 whose low bit is the coinbase flag of the spent
    /// output and whose upper bits hold its creation height, then the locking
    /// script (length-prefixed) and the value.
    pub fn undo_data(&self, chainstate: &Chainstate) -> Result<(Vec<u8>, Hash)> {
        let mut payload = Vec::new();
        payload
            .extend_from_slice(&(self.transactions.len().saturating_sub(1) as u32).to_be_bytes());
        for tx in self.transactions.iter().skip(1) {
            for input in tx.inputs() {
                let metadata = chainstate
                    .tx_metadata(&input.output_referred.parent_txid)?
                    .ok_or_else(|| {
                        ChainError::IndexIo("undo metadata missing for spent output".into())
                    })?;
                let reader =
                    TxMetadataReader::new(input.output_referred.parent_txid, &metadata);
                let mut height_field = 2 * u64::from(reader.block_height()?);
                if reader.is_coinbase() {
                    height_field += 1;
                }
                payload.extend_from_slice(&height_field.to_be_bytes());
                payload.extend_from_slice(
                    &(input.output_referred.script_pubkey.len() as u64).to_be_bytes(),
                );
                payload.extend_from_slice(&input.output_referred.script_pubkey);
                payload.extend_from_slice(&input.output_referred.value.to_be_bytes());
            }
        }
        let checksum = double_sha256(&payload);
        Ok((payload, checksum))
    }

    /// Two-pass confirmation at `height`: remove every consumed UTXO, then
    /// queue each transaction's metadata on the chainstate batch; one commit
    /// at the end of the block makes the new outputs visible. The coinbase's
    /// synthetic input consumes nothing and is skipped in the first pass.
    pub fn confirm(&mut self, height: u32, chainstate: &mut Chainstate) -> Result<()> {
        for tx in &mut self.transactions {
            tx.block_height = height;
            if !tx.is_coinbase {
                for input in tx.inputs() {
                    let removed = chainstate.remove_utxo(
                        &input.output_referred.parent_txid,
                        input.output_referred.vout,
                    )?;
                    if !removed {
                        return Err(ChainError::NonexistentUtxo);
                    }
                }
            }
        }
        for tx in &self.transactions {
            chainstate.insert_tx_batched(tx)?;
        }
        chainstate.commit_batch()
    }
}

/// Header-only validation over the raw 80-byte form: exact length, timestamp
/// not in the future, and a block hash below the expanded target.
pub fn validate_block_header(header: &[u8]) -> Result<()> {
    let reader = BlockHeaderReader::new(header)?;
    if reader.timestamp() > current_unix_time() {
        return Err(ChainError::InvalidTimestamp);
    }
    let block_hash = double_sha256(header);
    if block_hash >= expand_bits(reader.target_bits()) {
        return Err(ChainError::TargetNotReached);
    }
    Ok(())
}
