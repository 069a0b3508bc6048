//! # plairo
//!
//! Core of a minimal UTXO-model blockchain node: the transaction and block
//! validation pipeline, the chainstate (live UTXO index), the fee-ordered
//! mempool, append-only block/undo storage with its key-value block index,
//! and the chain orchestration that ties them together.
//!
//! ## Architecture
//!
//! Leaves first:
//! - [`serialization`], [`crypto`], [`merkle`], [`pow`]: big-endian codecs,
//!   double-SHA256 and ECDSA P-256, merkle roots, compact-target arithmetic
//! - [`transaction`], [`tx_metadata`]: the transaction model, SIGHASH_ALL
//!   signing and validation, and the chainstate metadata codec
//! - [`db`], [`chainstate`], [`block_index`]: key-value wrappers with
//!   obfuscation at rest, the UTXO index and the block index
//! - [`mempool`], [`block`], [`storage`]: the fee tree, blocks with mining
//!   and undo payloads, and the plr/rev file streams
//! - [`blockchain`]: the height-indexed header chain, fork bookkeeping and
//!   the insertion pipeline
//!
//! Validation is pure: transactions and blocks are checked against a
//! read-only chainstate capability, and consumed outputs are removed only
//! when a confirmed block commits its batch.
//!
//! Out of scope here: key management beyond the [`crypto`] provider,
//! peer-to-peer networking, and any CLI surface.

pub mod block;
pub mod block_index;
pub mod blockchain;
pub mod chainstate;
pub mod constants;
pub mod crypto;
pub mod db;
pub mod error;
pub mod mempool;
pub mod merkle;
pub mod pow;
pub mod serialization;
pub mod storage;
pub mod transaction;
pub mod tx_metadata;

pub use error::{ChainError, Result};
