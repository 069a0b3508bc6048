//! The in-memory header chain, side-fork bookkeeping and the block-insertion
//! pipeline tying validation, storage, the index, the chainstate and the
//! mempool together.

use std::path::PathBuf;

use p256::ecdsa::VerifyingKey;

use crate::block::{validate_block_header, Block, BlockHeader};
use crate::block_index::{BlockIndex, BlockIndexRecord};
use crate::chainstate::Chainstate;
use crate::constants::{
    default_block_index_dir, default_chainstate_dir, default_storage_dir,
    EXPECTED_SECONDS_PER_BLOCK, GenesisParams, MAX_FILE_SIZE, RETARGET_INTERVAL,
};
use crate::error::{ChainError, Result};
use crate::mempool::Mempool;
use crate::pow::apply_coeff_to_target;
use crate::storage::{BlockWriter, UndoWriter};
use crate::transaction::Transaction;

/// One accepted header. Predecessor and successor are implied by position:
/// the main chain is a vector indexed by height.
#[derive(Debug, Clone)]
pub struct ChainNode {
    pub header: BlockHeader,
    pub height: u32,
}

/// A side branch competing with the main chain. The fork owns its nodes; no
/// pointers back into the main chain are kept.
#[derive(Debug, Clone)]
pub struct Fork {
    root_height: u32,
    nodes: Vec<ChainNode>,
}

impl Fork {
    pub fn root_height(&self) -> u32 {
        self.root_height
    }

    pub fn max_height(&self) -> u32 {
        self.root_height + self.nodes.len() as u32 - 1
    }

    pub fn head_hash(&self) -> [u8; 32] {
        self.nodes
            .last()
            .map(|node| node.header.hash())
            .unwrap_or([0u8; 32])
    }
}

/// Paths, genesis parameters and the storage options for one node instance.
#[derive(Debug, Clone)]
pub struct BlockchainConfig {
    pub storage_dir: PathBuf,
    pub chainstate_dir: PathBuf,
    pub block_index_dir: PathBuf,
    pub max_file_size: u64,
    /// Whether block writes also batch a `'t'` locator per transaction.
    pub index_txs: bool,
    pub genesis: GenesisParams,
}

impl Default for BlockchainConfig {
    fn default() -> Self {
        BlockchainConfig {
            storage_dir: default_storage_dir(),
            chainstate_dir: default_chainstate_dir(),
            block_index_dir: default_block_index_dir(),
            max_file_size: MAX_FILE_SIZE,
            index_txs: true,
            genesis: GenesisParams::default(),
        }
    }
}

pub struct Blockchain {
    chain: Vec<ChainNode>,
    forks: Vec<Fork>,
    chainstate: Chainstate,
    block_index: BlockIndex,
    block_writer: BlockWriter,
    undo_writer: UndoWriter,
    mempool: Mempool,
    index_txs: bool,
}

impl Blockchain {
    /// Open every backing store and seed the chain with the genesis node at
    /// height 0. The genesis has no previous hash and is never re-validated.
    ///
    /// On the first open of an empty node, the genesis coinbase paying the
    /// initial subsidy to the configured recipient key is inserted into the
    /// chainstate so the reward is claimable; an empty key skips seeding.
    pub fn open(config: BlockchainConfig) -> Result<Self> {
        let chainstate = Chainstate::open(&config.chainstate_dir)?;
        let block_index = BlockIndex::open(&config.block_index_dir)?;
        // A block index without its last-file singleton marks a fresh node;
        // the check has to come before the writers initialize it.
        let fresh = block_index.last_plr_file_index()?.is_none();
        if fresh && !config.genesis.recipient_key.is_empty() {
            let coinbase = Transaction::genesis_coinbase(config.genesis.recipient_key.clone());
            chainstate.insert_tx(&coinbase)?;
            tracing::debug!("seeded the genesis coinbase output");
        }
        let block_writer = BlockWriter::open_with_max_size(
            config.storage_dir.clone(),
            &block_index,
            config.max_file_size,
        )?;
        let undo_writer = UndoWriter::open_with_max_size(
            config.storage_dir,
            &block_index,
            config.max_file_size,
        )?;
        let genesis = ChainNode {
            header: BlockHeader {
                previous_block_hash: [0u8; 32],
                merkle_root: config.genesis.merkle_root,
                timestamp: 0,
                target_bits: config.genesis.target_bits,
                nonce: config.genesis.nonce,
            },
            height: 0,
        };
        Ok(Blockchain {
            chain: vec![genesis],
            forks: Vec::new(),
            chainstate,
            block_index,
            block_writer,
            undo_writer,
            mempool: Mempool::new(),
            index_txs: config.index_txs,
        })
    }

    /// Height of the chain tip.
    pub fn height(&self) -> u32 {
        (self.chain.len() - 1) as u32
    }

    pub fn tip(&self) -> &ChainNode {
        &self.chain[self.chain.len() - 1]
    }

    pub fn header_at(&self, height: u32) -> Option<&BlockHeader> {
        self.chain.get(height as usize).map(|node| &node.header)
    }

    pub fn forks(&self) -> &[Fork] {
        &self.forks
    }

    pub fn chainstate(&self) -> &Chainstate {
        &self.chainstate
    }

    pub fn block_index(&self) -> &BlockIndex {
        &self.block_index
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    /// Validate a transaction against the live chainstate and admit it to the
    /// mempool.
    pub fn accept_to_mempool(&mut self, tx: Transaction) -> Result<()> {
        self.mempool.add(tx, &self.chainstate)
    }

    /// Assemble a candidate from the highest-fee mempool transactions and
    /// mine it on top of the current tip.
    pub fn mine_candidate(&mut self, miner_key: &VerifyingKey, max_txs: usize) -> Result<Block> {
        let candidates = self.mempool.top_k(max_txs);
        let mut block = Block::new(self.tip().header.hash(), self.next_target_bits(), candidates);
        let current_height = self.height();
        block.mine(current_height, miner_key, &self.chainstate, &mut self.mempool)?;
        Ok(block)
    }

    /// Compact target for the next block. Outside a retarget boundary this is
    /// the tip's target; on the boundary the previous interval's actual
    /// duration is measured against the expected one and the clamped ratio
    /// applied.
    pub fn next_target_bits(&self) -> u32 {
        let last_height = self.height();
        let last_header = &self.tip().header;
        if (last_height + 1) % RETARGET_INTERVAL != 0 {
            return last_header.target_bits;
        }

        // The interval is timed from the block before its first block. The
        // genesis has no predecessor, so the first retarget pretends it was
        // mined exactly on schedule.
        let (start_height, compensation) = if RETARGET_INTERVAL > last_height {
            (0, EXPECTED_SECONDS_PER_BLOCK as i64)
        } else {
            (last_height - RETARGET_INTERVAL, 0)
        };
        let Some(start_header) = self.header_at(start_height) else {
            return last_header.target_bits;
        };
        let first_timestamp = start_header.timestamp + compensation;
        let actual = (last_header.timestamp - first_timestamp) as f64;
        let expected = (EXPECTED_SECONDS_PER_BLOCK * u64::from(RETARGET_INTERVAL)) as f64;
        let new_bits = apply_coeff_to_target(actual / expected, last_header.target_bits);
        tracing::debug!(
            height = last_height + 1,
            previous_bits = last_header.target_bits,
            next_bits = new_bits,
            "retargeted difficulty"
        );
        new_bits
    }

    /// Insert a block at `height`.
    ///
    /// A block at the next height extends the main chain after full
    /// validation, runs the persistence pipeline and prunes the mempool. A
    /// block below the tip is a fork candidate and gets header-only
    /// validation with no chainstate effect. Height 0 and heights beyond the
    /// tip's successor are rejected outright.
    pub fn insert_block(&mut self, block: Block, height: u32) -> Result<()> {
        if height == 0 || height as usize > self.chain.len() {
            return Err(ChainError::InvalidHeight(height));
        }
        if (height as usize) < self.chain.len() {
            return self.insert_fork_block(block, height);
        }
        self.extend_main_chain(block, height)
    }

    fn extend_main_chain(&mut self, mut block: Block, height: u32) -> Result<()> {
        if block.header.previous_block_hash != self.tip().header.hash() {
            return Err(ChainError::InvalidLink);
        }
        block.validate(height, &self.chainstate)?;

        // First durable step. Every failure before this returns with no state
        // change; from here on, a failure leaves the on-disk stream ahead of
        // the in-memory chain and cannot be reconciled.
        let (plr_file_index, plr_offset) =
            self.block_writer.write(&block, height, &self.block_index)?;

        if let Err(err) = self.finish_insertion(&mut block, height, plr_file_index, plr_offset) {
            tracing::error!(
                height,
                error = %err,
                "block persisted but the insertion pipeline failed"
            );
            panic!("block insertion failed after the storage write: {err}");
        }

        self.chain.push(ChainNode {
            header: block.header.clone(),
            height,
        });
        self.mempool.remove_block(&block);
        tracing::info!(height, tx_count = block.tx_count(), "block connected");
        Ok(())
    }

    /// The tail of the pipeline: undo write, index records, chainstate
    /// commit. Runs only after the block file append succeeded.
    fn finish_insertion(
        &mut self,
        block: &mut Block,
        height: u32,
        plr_file_index: u32,
        plr_offset: u32,
    ) -> Result<()> {
        let (undo_payload, checksum) = block.undo_data(&self.chainstate)?;
        let (undo_file_index, undo_offset) =
            self.undo_writer
                .write(&undo_payload, &checksum, &self.block_index)?;

        let record = BlockIndexRecord {
            header: block.header_bytes(),
            height,
            tx_count: block.tx_count() as u32,
            plr_file_index,
            plr_offset,
            undo_file_index,
            undo_offset,
        };
        self.block_index
            .insert_block_record(&block.block_hash(), &record)?;
        if self.index_txs {
            self.block_index
                .index_block_transactions(block, plr_file_index, plr_offset)?;
        }

        block.confirm(height, &mut self.chainstate)
    }

    fn insert_fork_block(&mut self, block: Block, height: u32) -> Result<()> {
        let header_bytes = block.header_bytes();
        // A sibling of the main-chain node at this height starts a new fork.
        if block.header.previous_block_hash == self.chain[height as usize].header.previous_block_hash
        {
            validate_block_header(&header_bytes)?;
            self.forks.push(Fork {
                root_height: height,
                nodes: vec![ChainNode {
                    header: block.header.clone(),
                    height,
                }],
            });
            tracing::debug!(height, "registered a new fork");
            return Ok(());
        }
        // Otherwise the block may extend an existing fork head.
        // TODO: rewind the main chain with undo records when a fork's max
        // height passes the tip, then roll forward along the fork.
        for fork in &mut self.forks {
            if fork.max_height() == height - 1
                && fork.head_hash() == block.header.previous_block_hash
            {
                validate_block_header(&header_bytes)?;
                fork.nodes.push(ChainNode {
                    header: block.header.clone(),
                    height,
                });
                tracing::debug!(height, "extended an existing fork");
                return Ok(());
            }
        }
        Err(ChainError::InvalidLink)
    }
}
