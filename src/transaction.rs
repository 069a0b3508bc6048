//! Transaction model: outputs, inputs, canonical serialization, signature
//! hashing, fee arithmetic and validation.
//!
//! Validation takes the chainstate as an explicit read-only capability (the
//! [`UtxoProvider`] trait) and never mutates it; consumed outputs are removed
//! in a separate pass once the enclosing block is confirmed.

use std::collections::HashSet;

use p256::ecdsa::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::constants::{value_is_valid, FEE_PER_BYTE, INITIAL_SUBSIDY};
use crate::crypto::{self, double_sha256, pubkey_from_bytes, pubkey_to_bytes, Hash};
use crate::error::{ChainError, Result};
use crate::serialization::{read_bytes, read_u32, read_u64};
use crate::tx_metadata::serialize_tx_metadata;

/// Vout marker of the synthetic coinbase input.
pub const COINBASE_VOUT: u32 = 0xffff_ffff;

/// Read-only lookup of unspent outputs, implemented by the chainstate and by
/// in-memory fixtures in tests.
pub trait UtxoProvider {
    /// The unspent output at (txid, vout), if present.
    fn utxo(&self, txid: &Hash, vout: u32) -> Result<Option<TransactionOutput>>;
}

/// Sighash flag appended to every signature. Only [`SigHash::All`] commits to
/// anything; other flags produce no signable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SigHash {
    All = 1,
    None = 2,
}

impl SigHash {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(SigHash::All),
            2 => Some(SigHash::None),
            _ => None,
        }
    }
}

/// A spendable output. The `is_unspent` flag is a snapshot taken at creation
/// or chainstate-read time; the metadata bit-vector remains the single source
/// of truth for live state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub parent_txid: Hash,
    pub vout: u32,
    pub value: u64,
    pub script_pubkey: Vec<u8>,
    pub output_id: Hash,
    pub is_unspent: bool,
}

impl TransactionOutput {
    pub fn new(parent_txid: Hash, vout: u32, value: u64, script_pubkey: Vec<u8>) -> Self {
        let mut output = TransactionOutput {
            parent_txid,
            vout,
            value,
            script_pubkey,
            output_id: [0u8; 32],
            is_unspent: true,
        };
        output.regenerate_output_id();
        output
    }

    /// The output id is the double-SHA256 of the parent txid followed by the
    /// big-endian vout.
    pub fn regenerate_output_id(&mut self) {
        let mut buf = Vec::with_capacity(36);
        buf.extend_from_slice(&self.parent_txid);
        buf.extend_from_slice(&self.vout.to_be_bytes());
        self.output_id = double_sha256(&buf);
    }

    /// Whether this output agrees with another copy of the same output:
    /// identity, value, locking script and unspent flag all match.
    pub fn matches(&self, other: &TransactionOutput) -> bool {
        self.output_id == other.output_id
            && self.value == other.value
            && self.is_unspent == other.is_unspent
            && self.script_pubkey == other.script_pubkey
    }

    /// Placeholder written into rebuilt metadata where a spent output used to
    /// sit, keeping the surviving vout positions stable.
    pub(crate) fn dummy_spent() -> Self {
        let mut output = TransactionOutput::new([0u8; 32], 0, 0, Vec::new());
        output.is_unspent = false;
        output
    }
}

/// An input spending one prior output. Carries a full copy of the output it
/// refers to plus the unlocking `signature ‖ sighash-byte` script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub output_referred: TransactionOutput,
    pub script_sig: Vec<u8>,
}

impl TransactionInput {
    pub fn new(output_referred: TransactionOutput, script_sig: Vec<u8>) -> Self {
        TransactionInput {
            output_referred,
            script_sig,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub txid: Hash,
    pub block_height: u32,
    pub is_coinbase: bool,
    inputs: Vec<TransactionInput>,
    outputs: Vec<TransactionOutput>,
}

impl Transaction {
    /// Build a non-coinbase transaction. The txid is fixed here, before any
    /// input is signed, and each output is stamped with it.
    pub fn new(inputs: Vec<TransactionInput>, outputs: Vec<TransactionOutput>) -> Self {
        let mut tx = Transaction {
            txid: [0u8; 32],
            block_height: 0,
            is_coinbase: false,
            inputs,
            outputs,
        };
        tx.update_outputs();
        tx
    }

    /// Build the coinbase for the block after `current_height`. Its single
    /// synthetic input embeds the new height and a free-form message in the
    /// script-sig; its single output pays `value` to the miner's key.
    pub fn new_coinbase(
        message: &str,
        value: u64,
        miner_key: &VerifyingKey,
        current_height: u32,
    ) -> Result<Self> {
        if !value_is_valid(value) {
            return Err(ChainError::InvalidValue);
        }
        let mut script_sig = Vec::with_capacity(4 + message.len());
        script_sig.extend_from_slice(&(current_height + 1).to_be_bytes());
        script_sig.extend_from_slice(message.as_bytes());

        let referred =
            TransactionOutput::new([0u8; 32], COINBASE_VOUT, u64::from(COINBASE_VOUT), Vec::new());
        let coinbase_input = TransactionInput::new(referred, script_sig);
        let reward = TransactionOutput::new([0u8; 32], 0, value, pubkey_to_bytes(miner_key)?);

        let mut tx = Transaction {
            txid: [0u8; 32],
            block_height: current_height + 1,
            is_coinbase: true,
            inputs: vec![coinbase_input],
            outputs: vec![reward],
        };
        tx.update_outputs();
        Ok(tx)
    }

    /// The coinbase of the genesis block: height 0, the initial subsidy, and
    /// the configured recipient key already in serialized form.
    pub fn genesis_coinbase(recipient_key: Vec<u8>) -> Self {
        let mut script_sig = Vec::with_capacity(11);
        script_sig.extend_from_slice(&0u32.to_be_bytes());
        script_sig.extend_from_slice(b"genesis");

        let referred =
            TransactionOutput::new([0u8; 32], COINBASE_VOUT, u64::from(COINBASE_VOUT), Vec::new());
        let coinbase_input = TransactionInput::new(referred, script_sig);
        let reward = TransactionOutput::new([0u8; 32], 0, INITIAL_SUBSIDY, recipient_key);

        let mut tx = Transaction {
            txid: [0u8; 32],
            block_height: 0,
            is_coinbase: true,
            inputs: vec![coinbase_input],
            outputs: vec![reward],
        };
        tx.update_outputs();
        tx
    }

    pub fn inputs(&self) -> &[TransactionInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TransactionOutput] {
        &self.outputs
    }

    /// Fix the txid if not yet set and stamp every output with its parent id
    /// and position.
    fn update_outputs(&mut self) {
        if self.txid == [0u8; 32] {
            self.txid = double_sha256(&Transaction::serialize(self));
        }
        for (i, output) in self.outputs.iter_mut().enumerate() {
            output.parent_txid = self.txid;
            output.vout = i as u32;
            output.regenerate_output_id();
        }
    }

    /// Canonical serialization. All integers big-endian; no version, locktime
    /// or sequence fields:
    /// - input count (u32), then per input: parent txid (32), vout (u32),
    ///   script-sig length (u64), script-sig
    /// - output count (u32), then per output: value (u64), script-pubkey
    ///   length (u64), script-pubkey
    pub fn serialize(&self) -> Vec<u8> {
        self.serialize_with(|_, input| &input.script_sig)
    }

    fn serialize_with<'a, F>(&'a self, script_sig_for: F) -> Vec<u8>
    where
        F: Fn(usize, &'a TransactionInput) -> &'a [u8],
    {
        let mut buf = Vec::with_capacity(8);
        buf.extend_from_slice(&(self.inputs.len() as u32).to_be_bytes());
        for (i, input) in self.inputs.iter().enumerate() {
            let script_sig = script_sig_for(i, input);
            buf.extend_from_slice(&input.output_referred.parent_txid);
            buf.extend_from_slice(&input.output_referred.vout.to_be_bytes());
            buf.extend_from_slice(&(script_sig.len() as u64).to_be_bytes());
            buf.extend_from_slice(script_sig);
        }
        buf.extend_from_slice(&(self.outputs.len() as u32).to_be_bytes());
        for output in &self.outputs {
            buf.extend_from_slice(&output.value.to_be_bytes());
            buf.extend_from_slice(&(output.script_pubkey.len() as u64).to_be_bytes());
            buf.extend_from_slice(&output.script_pubkey);
        }
        buf
    }

    /// Parse a transaction from its canonical bytes.
    ///
    /// The wire form carries only (parent txid, vout, script-sig) per input,
    /// so referred outputs are reconstructed as placeholders with zero value
    /// and an empty locking script; their output ids are still exact since
    /// those derive from parent and vout alone. The txid is recomputed over
    /// the parsed bytes.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let mut offset = 0;

        let input_count = read_u32(data, offset)? as usize;
        offset += 4;
        let mut inputs = Vec::with_capacity(input_count.min(1024));
        for _ in 0..input_count {
            let mut parent_txid = [0u8; 32];
            parent_txid.copy_from_slice(read_bytes(data, offset, 32)?);
            offset += 32;
            let vout = read_u32(data, offset)?;
            offset += 4;
            let script_sig_len = read_u64(data, offset)? as usize;
            offset += 8;
            let script_sig = read_bytes(data, offset, script_sig_len)?.to_vec();
            offset += script_sig_len;
            let referred = TransactionOutput::new(parent_txid, vout, 0, Vec::new());
            inputs.push(TransactionInput::new(referred, script_sig));
        }

        let output_count = read_u32(data, offset)? as usize;
        offset += 4;
        let mut outputs = Vec::with_capacity(output_count.min(1024));
        for _ in 0..output_count {
            let value = read_u64(data, offset)?;
            offset += 8;
            let script_len = read_u64(data, offset)? as usize;
            offset += 8;
            let script_pubkey = read_bytes(data, offset, script_len)?.to_vec();
            offset += script_len;
            outputs.push(TransactionOutput::new([0u8; 32], 0, value, script_pubkey));
        }

        let is_coinbase = inputs.len() == 1
            && inputs[0].output_referred.parent_txid == [0u8; 32]
            && inputs[0].output_referred.vout == COINBASE_VOUT;
        let mut tx = Transaction::new(inputs, outputs);
        tx.is_coinbase = is_coinbase;
        Ok(tx)
    }

    /// Metadata stored in the chainstate for this transaction's live outputs.
    pub fn serialize_metadata(&self) -> Vec<u8> {
        serialize_tx_metadata(self.is_coinbase, self.block_height, &self.outputs)
    }

    /// Whether every output has been spent, leaving nothing to index.
    pub fn is_spent(&self) -> bool {
        self.outputs.iter().all(|output| !output.is_unspent)
    }

    /// The message signed for `input_index` under `sighash`.
    ///
    /// For SIGHASH_ALL the input being signed carries its referred output's
    /// script-pubkey in place of a script-sig and every other input carries an
    /// empty one; the flag byte is appended and the whole double hashed. Any
    /// other flag yields no message.
    pub fn signature_data_for_input(&self, input_index: usize, sighash: SigHash) -> Option<Hash> {
        if sighash != SigHash::All || input_index >= self.inputs.len() {
            return None;
        }
        let mut buf = self.serialize_with(|i, input| {
            if i == input_index {
                &input.output_referred.script_pubkey
            } else {
                &[]
            }
        });
        buf.push(sighash as u8);
        Some(double_sha256(&buf))
    }

    /// Sign one input, storing `DER-signature ‖ sighash-byte` as its
    /// script-sig. The txid is not regenerated; it was fixed at construction.
    pub fn sign_input(
        &mut self,
        input_index: usize,
        key: &SigningKey,
        sighash: SigHash,
    ) -> Result<()> {
        let message = self
            .signature_data_for_input(input_index, sighash)
            .ok_or(ChainError::InvalidSignature)?;
        let mut script_sig = crypto::sign(&message, key);
        script_sig.push(sighash as u8);
        self.inputs[input_index].script_sig = script_sig;
        Ok(())
    }

    /// Validate against the chainstate. Pure: nothing is removed here.
    ///
    /// Checks, in order: duplicate inputs, referenced outputs exist and match
    /// the carried copies, signatures unlock the referenced scripts, output
    /// values stay in range, and inputs cover outputs plus the minimum fee.
    pub fn validate(&self, chainstate: &impl UtxoProvider) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.inputs.len());
        for input in &self.inputs {
            if !seen.insert(input.output_referred.output_id) {
                return Err(ChainError::DuplicateInput);
            }
        }

        let mut input_value: u64 = 0;
        for (i, input) in self.inputs.iter().enumerate() {
            let utxo = chainstate
                .utxo(
                    &input.output_referred.parent_txid,
                    input.output_referred.vout,
                )?
                .ok_or(ChainError::NonexistentUtxo)?;
            if !utxo.matches(&input.output_referred) {
                return Err(ChainError::InputOutputMismatch);
            }

            let (&sighash_byte, raw_signature) = input
                .script_sig
                .split_last()
                .ok_or(ChainError::InvalidSignature)?;
            let sighash = SigHash::from_byte(sighash_byte).ok_or(ChainError::InvalidSignature)?;
            let message = self
                .signature_data_for_input(i, sighash)
                .ok_or(ChainError::InvalidSignature)?;
            // The locking script is the recipient's full public key; pay to
            // public key is the only script form.
            let pubkey =
                pubkey_from_bytes(&utxo.script_pubkey).map_err(|_| ChainError::InvalidSignature)?;
            if !crypto::verify(&message, raw_signature, &pubkey) {
                return Err(ChainError::InvalidSignature);
            }

            input_value = input_value
                .checked_add(input.output_referred.value)
                .ok_or(ChainError::InvalidValue)?;
        }

        let mut output_value: u64 = 0;
        for output in &self.outputs {
            output_value = output_value
                .checked_add(output.value)
                .ok_or(ChainError::InvalidValue)?;
            if !value_is_valid(output_value) {
                return Err(ChainError::InvalidValue);
            }
        }

        let required = output_value
            .checked_add(self.minimum_fee())
            .ok_or(ChainError::InsufficientFunds)?;
        if input_value < required {
            return Err(ChainError::InsufficientFunds);
        }
        Ok(())
    }

    /// Minimum fee this transaction must pay, proportional to its size.
    pub fn minimum_fee(&self) -> u64 {
        FEE_PER_BYTE * self.serialize().len() as u64
    }

    /// Fee actually paid: input value minus output value. Undefined for the
    /// coinbase and excluded from block-fee totals.
    pub fn fees(&self) -> u64 {
        let input_value: u64 = self
            .inputs
            .iter()
            .map(|input| input.output_referred.value)
            .sum();
        let output_value: u64 = self.outputs.iter().map(|output| output.value).sum();
        input_value.saturating_sub(output_value)
    }
}


#[cfg(test)]
mod tests {
    use super::test_utils::MapProvider;
    use super::*;

    fn funded_output(value: u64, key: &VerifyingKey) -> TransactionOutput {
        TransactionOutput::new([0x11; 32], 0, value, pubkey_to_bytes(key).unwrap())
    }

    fn spend(
        funding: &TransactionOutput,
        key: &SigningKey,
        pay_to: &VerifyingKey,
        amount: u64,
    ) -> Transaction {
        let input = TransactionInput::new(funding.clone(), Vec::new());
        let output = TransactionOutput::new([0u8; 32], 0, amount, pubkey_to_bytes(pay_to).unwrap());
        let mut tx = Transaction::new(vec![input], vec![output]);
        tx.sign_input(0, key, SigHash::All).unwrap();
        tx
    }

    #[test]
    fn txid_is_deterministic_over_inputs_and_outputs() {
        let out = TransactionOutput::new([0x22; 32], 0, 500, vec![0xab; 4]);
        let a = Transaction::new(
            vec![TransactionInput::new(out.clone(), Vec::new())],
            vec![TransactionOutput::new([0u8; 32], 0, 400, vec![0xcd; 4])],
        );
        let b = Transaction::new(
            vec![TransactionInput::new(out, Vec::new())],
            vec![TransactionOutput::new([0u8; 32], 0, 400, vec![0xcd; 4])],
        );
        assert_eq!(a.txid, b.txid);
        assert_ne!(a.txid, [0u8; 32]);
    }

    #[test]
    fn outputs_are_stamped_with_parent_and_position() {
        let tx = Transaction::new(
            Vec::new(),
            vec![
                TransactionOutput::new([0u8; 32], 0, 1, Vec::new()),
                TransactionOutput::new([0u8; 32], 0, 2, Vec::new()),
            ],
        );
        assert_eq!(tx.outputs()[0].parent_txid, tx.txid);
        assert_eq!(tx.outputs()[0].vout, 0);
        assert_eq!(tx.outputs()[1].vout, 1);
        assert_ne!(tx.outputs()[0].output_id, tx.outputs()[1].output_id);
    }

    #[test]
    fn canonical_bytes_round_trip() {
        let (signing_key, verifying_key) = crypto::generate_keypair();
        let funding = funded_output(1_000, &verifying_key);
        let tx = spend(&funding, &signing_key, &verifying_key, 700);

        let bytes = tx.serialize();
        let parsed = Transaction::deserialize(&bytes).unwrap();
        assert_eq!(parsed.serialize(), bytes);
        assert_eq!(parsed.inputs()[0].output_referred.output_id, tx.inputs()[0].output_referred.output_id);
    }

    #[test]
    fn unsigned_round_trip_preserves_txid() {
        let tx = Transaction::new(
            Vec::new(),
            vec![TransactionOutput::new([0u8; 32], 0, 9, vec![1, 2, 3])],
        );
        let parsed = Transaction::deserialize(&tx.serialize()).unwrap();
        assert_eq!(parsed.txid, tx.txid);
    }

    #[test]
    fn valid_spend_passes_validation() {
        let (signing_key, verifying_key) = crypto::generate_keypair();
        let funding = funded_output(1_000, &verifying_key);
        let chainstate = MapProvider::with(&[funding.clone()]);
        let tx = spend(&funding, &signing_key, &verifying_key, 700);
        tx.validate(&chainstate).unwrap();
        assert_eq!(tx.fees(), 300);
    }

    #[test]
    fn duplicate_inputs_are_rejected_first() {
        let (signing_key, verifying_key) = crypto::generate_keypair();
        let funding = funded_output(1_000, &verifying_key);
        let chainstate = MapProvider::with(&[funding.clone()]);
        let mut tx = Transaction::new(
            vec![
                TransactionInput::new(funding.clone(), Vec::new()),
                TransactionInput::new(funding, Vec::new()),
            ],
            vec![TransactionOutput::new([0u8; 32], 0, 100, Vec::new())],
        );
        tx.sign_input(0, &signing_key, SigHash::All).unwrap();
        tx.sign_input(1, &signing_key, SigHash::All).unwrap();
        assert!(matches!(
            tx.validate(&chainstate),
            Err(ChainError::DuplicateInput)
        ));
    }

    #[test]
    fn missing_utxo_is_rejected() {
        let (signing_key, verifying_key) = crypto::generate_keypair();
        let funding = funded_output(1_000, &verifying_key);
        let chainstate = MapProvider::with(&[]);
        let tx = spend(&funding, &signing_key, &verifying_key, 700);
        assert!(matches!(
            tx.validate(&chainstate),
            Err(ChainError::NonexistentUtxo)
        ));
    }

    #[test]
    fn mismatched_referred_output_is_rejected() {
        let (signing_key, verifying_key) = crypto::generate_keypair();
        let funding = funded_output(1_000, &verifying_key);
        let chainstate = MapProvider::with(&[funding.clone()]);
        let mut tampered = funding;
        tampered.value = 2_000;
        let tx = spend(&tampered, &signing_key, &verifying_key, 700);
        assert!(matches!(
            tx.validate(&chainstate),
            Err(ChainError::InputOutputMismatch)
        ));
    }

    #[test]
    fn wrong_key_signature_is_rejected() {
        let (_, verifying_key) = crypto::generate_keypair();
        let (other_signing_key, _) = crypto::generate_keypair();
        let funding = funded_output(1_000, &verifying_key);
        let chainstate = MapProvider::with(&[funding.clone()]);
        let tx = spend(&funding, &other_signing_key, &verifying_key, 700);
        assert!(matches!(
            tx.validate(&chainstate),
            Err(ChainError::InvalidSignature)
        ));
    }

    #[test]
    fn empty_script_sig_is_an_invalid_signature() {
        let (_, verifying_key) = crypto::generate_keypair();
        let funding = funded_output(1_000, &verifying_key);
        let chainstate = MapProvider::with(&[funding.clone()]);
        let tx = Transaction::new(
            vec![TransactionInput::new(funding, Vec::new())],
            vec![TransactionOutput::new([0u8; 32], 0, 100, Vec::new())],
        );
        assert!(matches!(
            tx.validate(&chainstate),
            Err(ChainError::InvalidSignature)
        ));
    }

    #[test]
    fn zero_fee_spend_lacks_funds() {
        let (signing_key, verifying_key) = crypto::generate_keypair();
        let funding = funded_output(100, &verifying_key);
        let chainstate = MapProvider::with(&[funding.clone()]);
        let tx = spend(&funding, &signing_key, &verifying_key, 100);
        assert!(matches!(
            tx.validate(&chainstate),
            Err(ChainError::InsufficientFunds)
        ));
    }

    #[test]
    fn overlarge_output_sum_is_an_invalid_value() {
        let (signing_key, verifying_key) = crypto::generate_keypair();
        let funding = funded_output(1_000, &verifying_key);
        let chainstate = MapProvider::with(&[funding.clone()]);
        let input = TransactionInput::new(funding, Vec::new());
        let outputs = vec![
            TransactionOutput::new([0u8; 32], 0, crate::constants::MAX_VALID_AMOUNT, Vec::new()),
            TransactionOutput::new([0u8; 32], 0, 1, Vec::new()),
        ];
        let mut tx = Transaction::new(vec![input], outputs);
        tx.sign_input(0, &signing_key, SigHash::All).unwrap();
        assert!(matches!(
            tx.validate(&chainstate),
            Err(ChainError::InvalidValue)
        ));
    }

    #[test]
    fn sighash_message_ignores_other_signatures() {
        let (signing_key, verifying_key) = crypto::generate_keypair();
        let a = funded_output(500, &verifying_key);
        let b = TransactionOutput::new([0x33; 32], 1, 500, pubkey_to_bytes(&verifying_key).unwrap());
        let mut tx = Transaction::new(
            vec![
                TransactionInput::new(a, Vec::new()),
                TransactionInput::new(b, Vec::new()),
            ],
            vec![TransactionOutput::new([0u8; 32], 0, 600, Vec::new())],
        );
        let before = tx.signature_data_for_input(0, SigHash::All).unwrap();
        tx.sign_input(1, &signing_key, SigHash::All).unwrap();
        let after = tx.signature_data_for_input(0, SigHash::All).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn unsupported_sighash_has_no_message() {
        let tx = Transaction::new(Vec::new(), Vec::new());
        assert!(tx.signature_data_for_input(0, SigHash::None).is_none());
    }

    #[test]
    fn coinbase_embeds_height_and_message() {
        let (_, verifying_key) = crypto::generate_keypair();
        let coinbase = Transaction::new_coinbase("coinbase", 50, &verifying_key, 41).unwrap();
        assert!(coinbase.is_coinbase);
        assert_eq!(coinbase.block_height, 42);
        let script_sig = &coinbase.inputs()[0].script_sig;
        assert_eq!(&script_sig[..4], &42u32.to_be_bytes());
        assert_eq!(&script_sig[4..], b"coinbase");
        assert_eq!(coinbase.inputs()[0].output_referred.vout, COINBASE_VOUT);
        assert_eq!(coinbase.outputs()[0].value, 50);
    }

    #[test]
    fn genesis_coinbase_pays_the_initial_subsidy_at_height_zero() {
        let (_, verifying_key) = crypto::generate_keypair();
        let recipient = pubkey_to_bytes(&verifying_key).unwrap();
        let genesis = Transaction::genesis_coinbase(recipient.clone());
        assert!(genesis.is_coinbase);
        assert_eq!(genesis.block_height, 0);
        assert_eq!(genesis.outputs()[0].value, INITIAL_SUBSIDY);
        assert_eq!(genesis.outputs()[0].script_pubkey, recipient);
        assert_eq!(&genesis.inputs()[0].script_sig[..4], &0u32.to_be_bytes());
        assert_eq!(genesis.inputs()[0].output_referred.vout, COINBASE_VOUT);
        // deterministic for a fixed recipient
        assert_eq!(genesis.txid, Transaction::genesis_coinbase(recipient).txid);
    }

    #[test]
    fn coinbase_value_is_range_checked() {
        let (_, verifying_key) = crypto::generate_keypair();
        let result = Transaction::new_coinbase(
            "coinbase",
            crate::constants::MAX_VALID_AMOUNT + 1,
            &verifying_key,
            0,
        );
        assert!(matches!(result, Err(ChainError::InvalidValue)));
    }
}
