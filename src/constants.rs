//! Process-wide consensus and storage parameters.

use std::path::PathBuf;

/// Base units ("ticks") per whole coin.
pub const TICKS_PER_RO: u64 = 100_000_000;

/// Initial block reward in ticks.
pub const INITIAL_SUBSIDY: u64 = 500 * TICKS_PER_RO;

/// Blocks between subsidy halvings.
pub const HALVING_INTERVAL: u32 = 1000;

/// Per-output value cap in ticks.
pub const MAX_VALID_AMOUNT: u64 = 100_000_000 * TICKS_PER_RO;

/// Safety limit on transactions per block.
pub const MAX_TX_PER_BLOCK: usize = 1000;

/// Minimum fee rate in ticks per serialized byte.
pub const FEE_PER_BYTE: u64 = 1;

/// Blocks between difficulty retargets.
pub const RETARGET_INTERVAL: u32 = 2016;

/// Pacing target in seconds per block.
pub const EXPECTED_SECONDS_PER_BLOCK: u64 = 120;

/// Ceiling on the compact target (the easiest difficulty a retarget may
/// produce).
pub const MAX_DIFFICULTY: u32 = 0x18ff_ffff;

/// Maximum size of a single plr/rev storage file: 128 MiB.
pub const MAX_FILE_SIZE: u64 = 128 * 1024 * 1024;

/// Magic bytes prefixed to every block and undo record on disk.
pub const MAGIC_BYTES: [u8; 4] = [0xf9, 0xbe, 0xb4, 0xd9];

/// Timestamp bumps permitted after nonce wraparound before a mining attempt
/// is declared stale.
pub const MAX_TIMESTAMP_BUMPS: u8 = 30;

/// Whether a single output value is within the allowed range.
pub fn value_is_valid(value: u64) -> bool {
    value <= MAX_VALID_AMOUNT
}

/// Block reward created out of thin air for the block at `height`.
pub fn block_subsidy(height: u32) -> u64 {
    let halvings = height / HALVING_INTERVAL;
    INITIAL_SUBSIDY.checked_shr(halvings).unwrap_or(0)
}

/// Default directory for plr/rev block files.
pub fn default_storage_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".plairo/blocks")
}

/// Default directory for the chainstate database.
pub fn default_chainstate_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".plairo/chainstate")
}

/// Default directory for the block index database.
pub fn default_block_index_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".plairo/blocks/index")
}

/// Parameters of the hard-coded genesis block.
#[derive(Debug, Clone)]
pub struct GenesisParams {
    pub merkle_root: [u8; 32],
    pub target_bits: u32,
    pub nonce: u32,
    /// Serialized public key paid by the genesis coinbase. An empty key means
    /// no genesis recipient is configured and nothing is seeded.
    pub recipient_key: Vec<u8>,
}

impl Default for GenesisParams {
    fn default() -> Self {
        GenesisParams {
            merkle_root: [0u8; 32],
            target_bits: MAX_DIFFICULTY,
            nonce: 0,
            recipient_key: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsidy_halves_on_schedule() {
        assert_eq!(block_subsidy(0), INITIAL_SUBSIDY);
        assert_eq!(block_subsidy(HALVING_INTERVAL - 1), INITIAL_SUBSIDY);
        assert_eq!(block_subsidy(HALVING_INTERVAL), INITIAL_SUBSIDY / 2);
        assert_eq!(block_subsidy(3 * HALVING_INTERVAL), INITIAL_SUBSIDY / 8);
    }

    #[test]
    fn subsidy_reaches_zero_without_overflow() {
        assert_eq!(block_subsidy(100 * HALVING_INTERVAL), 0);
        assert_eq!(block_subsidy(u32::MAX), 0);
    }
}
