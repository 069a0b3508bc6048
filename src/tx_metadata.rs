//! Compact on-disk form of a transaction's live outputs, stored as the
//! chainstate value.
//!
//! Layout:
//! - is-coinbase (1 byte)
//! - block height (u32)
//! - total output count (u32)
//! - packed bit-vector of unspent flags
//! - for each unspent output in ascending vout order: value (u64),
//!   script-pubkey length (u64), script-pubkey
//!
//! Spent outputs contribute only their zero bit; their value and script are
//! not stored.

use crate::crypto::Hash;
use crate::error::Result;
use crate::serialization::{pack_one_hot, read_bytes, read_u32, read_u64, unpack_one_hot};
use crate::transaction::TransactionOutput;

/// Serialize metadata for a set of outputs belonging to one transaction.
pub fn serialize_tx_metadata(
    is_coinbase: bool,
    block_height: u32,
    outputs: &[TransactionOutput],
) -> Vec<u8> {
    let unspent: Vec<bool> = outputs.iter().map(|output| output.is_unspent).collect();
    let mut metadata = Vec::with_capacity(9 + unspent.len() / 8 + 1);
    metadata.push(u8::from(is_coinbase));
    metadata.extend_from_slice(&block_height.to_be_bytes());
    metadata.extend_from_slice(&(outputs.len() as u32).to_be_bytes());
    metadata.extend_from_slice(&pack_one_hot(&unspent));
    for output in outputs.iter().filter(|output| output.is_unspent) {
        metadata.extend_from_slice(&output.value.to_be_bytes());
        metadata.extend_from_slice(&(output.script_pubkey.len() as u64).to_be_bytes());
        metadata.extend_from_slice(&output.script_pubkey);
    }
    metadata
}

/// Read-side view over one metadata record. Out-of-range vouts read as not
/// present.
pub struct TxMetadataReader<'a> {
    txid: Hash,
    metadata: &'a [u8],
}

impl<'a> TxMetadataReader<'a> {
    pub fn new(txid: Hash, metadata: &'a [u8]) -> Self {
        TxMetadataReader { txid, metadata }
    }

    pub fn is_coinbase(&self) -> bool {
        self.metadata.first() == Some(&0x01)
    }

    pub fn block_height(&self) -> Result<u32> {
        read_u32(self.metadata, 1)
    }

    pub fn output_count(&self) -> Result<u32> {
        read_u32(self.metadata, 5)
    }

    /// The unspent flags and the ascending list of unspent vouts.
    pub fn bit_vector(&self) -> Result<(Vec<bool>, Vec<u32>)> {
        let count = self.output_count()? as usize;
        let size = (count + 7) / 8;
        let packed = read_bytes(self.metadata, 9, size)?;
        let flags = unpack_one_hot(packed, count)?;
        let vouts = flags
            .iter()
            .enumerate()
            .filter(|(_, &flag)| flag)
            .map(|(i, _)| i as u32)
            .collect();
        Ok((flags, vouts))
    }

    /// Materialize the surviving outputs as snapshots, regenerating each
    /// output id from the parent txid and its vout.
    pub fn outputs(&self) -> Result<Vec<TransactionOutput>> {
        let count = self.output_count()? as usize;
        let (_, vouts) = self.bit_vector()?;
        let mut caret = 9 + (count + 7) / 8;
        let mut outputs = Vec::with_capacity(vouts.len());
        for vout in vouts {
            let value = read_u64(self.metadata, caret)?;
            caret += 8;
            let script_len = read_u64(self.metadata, caret)? as usize;
            caret += 8;
            let script_pubkey = read_bytes(self.metadata, caret, script_len)?.to_vec();
            caret += script_len;
            outputs.push(TransactionOutput::new(self.txid, vout, value, script_pubkey));
        }
        Ok(outputs)
    }
}
