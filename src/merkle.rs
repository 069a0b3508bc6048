//! Merkle root over an ordered list of transaction ids.

use crate::crypto::{double_sha256, Hash};

/// Compute the merkle root by pairwise double-SHA256, duplicating the last
/// element when a level has an odd count. A single id is its own root; the
/// empty list yields the zero hash.
pub fn compute_merkle_root(ids: &[Hash]) -> Hash {
    if ids.is_empty() {
        return [0u8; 32];
    }
    let mut level: Vec<Hash> = ids.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            let last = level[level.len() - 1];
            level.push(last);
        }
        level = level
            .chunks_exact(2)
            .map(|pair| {
                let mut concat = [0u8; 64];
                concat[..32].copy_from_slice(&pair[0]);
                concat[32..].copy_from_slice(&pair[1]);
                double_sha256(&concat)
            })
            .collect();
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> Hash {
        [byte; 32]
    }

    #[test]
    fn single_id_is_its_own_root() {
        assert_eq!(compute_merkle_root(&[id(7)]), id(7));
    }

    #[test]
    fn pair_root_is_double_hash_of_concatenation() {
        let mut concat = [0u8; 64];
        concat[..32].copy_from_slice(&id(1));
        concat[32..].copy_from_slice(&id(2));
        assert_eq!(compute_merkle_root(&[id(1), id(2)]), double_sha256(&concat));
    }

    #[test]
    fn odd_count_duplicates_the_last_id() {
        let odd = compute_merkle_root(&[id(1), id(2), id(3)]);
        let padded = compute_merkle_root(&[id(1), id(2), id(3), id(3)]);
        assert_eq!(odd, padded);
    }

    #[test]
    fn any_single_mutation_changes_the_root() {
        let ids = vec![id(1), id(2), id(3), id(4), id(5)];
        let root = compute_merkle_root(&ids);
        for i in 0..ids.len() {
            let mut mutated = ids.clone();
            mutated[i][0] ^= 0xff;
            assert_ne!(compute_merkle_root(&mutated), root, "mutation at {i}");
        }
    }

    #[test]
    fn empty_list_yields_zero_hash() {
        assert_eq!(compute_merkle_root(&[]), [0u8; 32]);
    }
}
