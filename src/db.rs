//! Key-value wrapper shared by the chainstate and block index databases.
//!
//! Values are obfuscated at rest by XOR with an 8-byte per-database key,
//! minted on first open and persisted under a reserved key. Keys stay in the
//! clear so ordered seeks keep working. Obfuscation makes raw dumps
//! uninteresting; it is not a security boundary.

use std::path::Path;

use sled::{Batch, Db};

use crate::error::Result;

/// Chainstate records: `'c' ‖ txid`.
pub const TX_KEY: u8 = b'c';
/// Block index records: `'b' ‖ block hash`.
pub const BLOCK_INDEX_KEY: u8 = b'b';
/// File info records: `'f' ‖ file index`.
pub const FILE_INFO_KEY: u8 = b'f';
/// Transaction locator records: `'t' ‖ txid`.
pub const TX_INDEX_KEY: u8 = b't';
/// Singleton: index of the last plr file.
pub const LAST_PLR_FILE_KEY: [u8; 1] = [b'I'];
/// Singleton: index of the last undo file.
pub const LAST_UNDO_FILE_KEY: [u8; 1] = [b'U'];

/// Prefix a payload key with its record type byte.
pub fn build_key(key_type: u8, data: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + data.len());
    key.push(key_type);
    key.extend_from_slice(data);
    key
}

fn obfuscation_key_key() -> Vec<u8> {
    let mut key = vec![0x0e, 0x00];
    key.extend_from_slice(b"obfuscate_key");
    key
}

/// XOR a value with the repeating obfuscation key. Applying it twice restores
/// the original bytes.
fn xor_obfuscate(value: &[u8], key: &[u8]) -> Vec<u8> {
    value
        .iter()
        .enumerate()
        .map(|(i, byte)| byte ^ key[i % key.len()])
        .collect()
}

pub struct DbWrapper {
    db: Db,
    obfuscation_key: Option<Vec<u8>>,
    current_batch: Option<Batch>,
}

impl DbWrapper {
    /// Open or create the database, loading the obfuscation key or minting a
    /// fresh 8-byte one on first open. The key itself is stored in the clear.
    pub fn open(path: &Path, obfuscated: bool) -> Result<Self> {
        let db = sled::open(path)?;
        let obfuscation_key = if obfuscated {
            match db.get(obfuscation_key_key())? {
                Some(key) => Some(key.to_vec()),
                None => {
                    let key = rand::random::<u64>().to_be_bytes().to_vec();
                    db.insert(obfuscation_key_key(), key.clone())?;
                    Some(key)
                }
            }
        } else {
            None
        };
        Ok(DbWrapper {
            db,
            obfuscation_key,
            current_batch: None,
        })
    }

    fn obfuscate(&self, value: &[u8]) -> Vec<u8> {
        match &self.obfuscation_key {
            Some(key) => xor_obfuscate(value, key),
            None => value.to_vec(),
        }
    }

    pub fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.insert(key, self.obfuscate(value))?;
        Ok(())
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?.map(|value| self.obfuscate(&value)))
    }

    /// Delete a key, reporting whether it was present.
    pub fn remove(&self, key: &[u8]) -> Result<bool> {
        Ok(self.db.remove(key)?.is_some())
    }

    /// Queue a write on the pending batch.
    pub fn put_in_batch(&mut self, key: &[u8], value: &[u8]) {
        let value = self.obfuscate(value);
        let batch = self.current_batch.get_or_insert_with(Batch::default);
        batch.insert(key, value);
    }

    /// Atomically apply and clear the pending batch. A no-op when nothing was
    /// queued.
    pub fn write_batch(&mut self) -> Result<()> {
        if let Some(batch) = self.current_batch.take() {
            self.db.apply_batch(batch)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    #[test]
    fn values_round_trip_through_obfuscation() {
        let dir = TempDir::new().unwrap();
        let db = DbWrapper::open(dir.path(), true).unwrap();
        let value = b"some chainstate metadata".to_vec();
        db.insert(b"ckey", &value).unwrap();
        assert_eq!(db.get(b"ckey").unwrap(), Some(value));
        assert_eq!(db.get(b"missing").unwrap(), None);
    }

    #[test]
    fn obfuscation_key_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let db = DbWrapper::open(dir.path(), true).unwrap();
            db.insert(b"k", b"v").unwrap();
        }
        let db = DbWrapper::open(dir.path(), true).unwrap();
        assert_eq!(db.get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn batched_writes_land_only_on_commit() {
        let dir = TempDir::new().unwrap();
        let mut db = DbWrapper::open(dir.path(), true).unwrap();
        db.put_in_batch(b"a", b"1");
        db.put_in_batch(b"b", b"2");
        assert_eq!(db.get(b"a").unwrap(), None);
        db.write_batch().unwrap();
        assert_eq!(db.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(db.get(b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn remove_reports_presence() {
        let dir = TempDir::new().unwrap();
        let db = DbWrapper::open(dir.path(), true).unwrap();
        db.insert(b"k", b"v").unwrap();
        assert!(db.remove(b"k").unwrap());
        assert!(!db.remove(b"k").unwrap());
    }

    #[test]
    fn build_key_prefixes_type_byte() {
        assert_eq!(build_key(TX_KEY, &[0xde, 0xad]), vec![b'c', 0xde, 0xad]);
    }

    proptest! {
        #[test]
        fn xor_obfuscation_is_an_involution(value in proptest::collection::vec(any::<u8>(), 0..256), key in proptest::collection::vec(any::<u8>(), 1..16)) {
            prop_assert_eq!(xor_obfuscate(&xor_obfuscate(&value, &key), &key), value);
        }
    }
}
