//! Error types shared across the node core.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChainError>;

/// Every failure the core can report, from per-transaction validation up to
/// persistence. Validation errors never mutate state; storage errors occurring
/// after a block has reached disk are escalated by the caller instead of being
/// handled here.
#[derive(Error, Debug)]
pub enum ChainError {
    // Transaction validation
    #[error("output value exceeds the maximum valid amount")]
    InvalidValue,

    #[error("input value does not cover outputs plus the minimum fee")]
    InsufficientFunds,

    #[error("transaction references the same output twice")]
    DuplicateInput,

    #[error("referenced utxo does not exist in the chainstate")]
    NonexistentUtxo,

    #[error("referred output does not match the chainstate record")]
    InputOutputMismatch,

    #[error("invalid signature provided for input")]
    InvalidSignature,

    // Block validation
    #[error("block contains an invalid transaction")]
    InvalidTxInBlock,

    #[error("merkle root does not match the block transactions")]
    InvalidMerkleRoot,

    #[error("block header length is not 80 bytes")]
    InvalidHeaderLength,

    #[error("block timestamp lies in the future")]
    InvalidTimestamp,

    #[error("block hash does not satisfy the target")]
    TargetNotReached,

    #[error("block exceeds the maximum transaction count")]
    ExceededMaxTx,

    #[error("all nonce and timestamp attempts exhausted, block is stale")]
    StaleBlock,

    // Chain operations
    #[error("block does not link to the chain tip or any fork head")]
    InvalidLink,

    #[error("invalid insertion height {0}")]
    InvalidHeight(u32),

    // Mempool
    #[error("output already referenced by a mempool transaction")]
    DoubleSpentOutput,

    #[error("transaction does not exist in the mempool")]
    TxNotInMempool,

    // Persistence
    #[error("transaction has no unspent outputs")]
    AlreadySpent,

    #[error("storage i/o failed: {0}")]
    StorageIo(#[from] std::io::Error),

    #[error("block index operation failed: {0}")]
    IndexIo(String),

    #[error("malformed serialized data: {0}")]
    Serialization(&'static str),

    #[error("key encoding failed: {0}")]
    Key(String),
}

impl From<sled::Error> for ChainError {
    fn from(err: sled::Error) -> Self {
        ChainError::IndexIo(err.to_string())
    }
}
