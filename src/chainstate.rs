//! The chainstate: a persistent index of every transaction that still has
//! unspent outputs, keyed by `'c' ‖ txid` with metadata values.

use std::path::Path;

use crate::crypto::Hash;
use crate::db::{build_key, DbWrapper, TX_KEY};
use crate::error::{ChainError, Result};
use crate::transaction::{Transaction, TransactionOutput, UtxoProvider};
use crate::tx_metadata::{serialize_tx_metadata, TxMetadataReader};

pub struct Chainstate {
    db: DbWrapper,
}

impl Chainstate {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Chainstate {
            db: DbWrapper::open(path, true)?,
        })
    }

    /// Store the metadata of a transaction's outputs. A fully spent
    /// transaction has nothing to index and is refused.
    pub fn insert_tx(&self, tx: &Transaction) -> Result<()> {
        if tx.is_spent() {
            return Err(ChainError::AlreadySpent);
        }
        self.db
            .insert(&build_key(TX_KEY, &tx.txid), &tx.serialize_metadata())
    }

    /// Queue a metadata write on the pending batch; the caller commits at
    /// block-confirmation boundaries.
    pub fn insert_tx_batched(&mut self, tx: &Transaction) -> Result<()> {
        if tx.is_spent() {
            return Err(ChainError::AlreadySpent);
        }
        let key = build_key(TX_KEY, &tx.txid);
        self.db.put_in_batch(&key, &tx.serialize_metadata());
        Ok(())
    }

    pub fn commit_batch(&mut self) -> Result<()> {
        self.db.write_batch()
    }

    /// Raw metadata record for a transaction, if any output survives.
    pub fn tx_metadata(&self, txid: &Hash) -> Result<Option<Vec<u8>>> {
        self.db.get(&build_key(TX_KEY, txid))
    }

    pub fn utxo_exists(&self, txid: &Hash, vout: u32) -> Result<bool> {
        match self.tx_metadata(txid)? {
            Some(metadata) => {
                let (flags, _) = TxMetadataReader::new(*txid, &metadata).bit_vector()?;
                Ok(flags.get(vout as usize).copied().unwrap_or(false))
            }
            None => Ok(false),
        }
    }

    pub fn get_utxo(&self, txid: &Hash, vout: u32) -> Result<Option<TransactionOutput>> {
        let Some(metadata) = self.tx_metadata(txid)? else {
            return Ok(None);
        };
        let reader = TxMetadataReader::new(*txid, &metadata);
        let (_, vouts) = reader.bit_vector()?;
        let Some(position) = vouts.iter().position(|&v| v == vout) else {
            return Ok(None);
        };
        Ok(reader.outputs()?.into_iter().nth(position))
    }

    /// Remove one UTXO. When it is the last survivor the whole record is
    /// deleted; otherwise the metadata is rewritten with a spent placeholder
    /// at that vout, keeping the remaining positions stable. The original
    /// coinbase flag and creation height are carried over since undo records
    /// depend on them.
    pub fn remove_utxo(&self, txid: &Hash, vout: u32) -> Result<bool> {
        let Some(metadata) = self.tx_metadata(txid)? else {
            return Ok(false);
        };
        let reader = TxMetadataReader::new(*txid, &metadata);
        let (flags, vouts) = reader.bit_vector()?;

        if vouts.len() == 1 && vouts[0] == vout {
            return self.db.remove(&build_key(TX_KEY, txid));
        }
        if !flags.get(vout as usize).copied().unwrap_or(false) {
            return Ok(false);
        }

        let survivors = reader.outputs()?;
        let total = reader.output_count()? as usize;
        let mut rebuilt: Vec<TransactionOutput> =
            (0..total).map(|_| TransactionOutput::dummy_spent()).collect();
        for output in survivors {
            if output.vout == vout {
                continue;
            }
            let idx = output.vout as usize;
            rebuilt[idx] = output;
        }
        let new_metadata =
            serialize_tx_metadata(reader.is_coinbase(), reader.block_height()?, &rebuilt);
        self.db.insert(&build_key(TX_KEY, txid), &new_metadata)?;
        Ok(true)
    }

    /// Number of outputs of this transaction still unspent.
    pub fn count_utxos(&self, txid: &Hash) -> Result<usize> {
        match self.tx_metadata(txid)? {
            Some(metadata) => Ok(TxMetadataReader::new(*txid, &metadata).bit_vector()?.1.len()),
            None => Ok(0),
        }
    }
}

impl UtxoProvider for Chainstate {
    fn utxo(&self, txid: &Hash, vout: u32) -> Result<Option<TransactionOutput>> {
        self.get_utxo(txid, vout)
    }
}
