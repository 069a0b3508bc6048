//! Mempool: validated unconfirmed transactions, ordered by fee for block
//! template selection, with a double-spend guard.
//!
//! Three structures back it: an AVL tree keyed by fee whose reverse in-order
//! walk yields descending fees, a txid → fee map giving O(1) membership and
//! the fee snapshot used for removal, and the set of output ids already
//! referenced by pool members. Same-fee records chain at their tree node in
//! insertion order; the chain itself is never rebalanced.

use std::collections::{HashMap, HashSet};

use crate::block::Block;
use crate::crypto::Hash;
use crate::error::{ChainError, Result};
use crate::transaction::{Transaction, UtxoProvider};

struct MemRecord {
    txid: Hash,
    tx: Transaction,
}

struct MemNode {
    fee: u64,
    /// Same-fee records in insertion order; the first entry is the node's own.
    records: Vec<MemRecord>,
    left: Option<Box<MemNode>>,
    right: Option<Box<MemNode>>,
    height: i32,
}

impl MemNode {
    fn new(fee: u64, record: MemRecord) -> Box<Self> {
        Box::new(MemNode {
            fee,
            records: vec![record],
            left: None,
            right: None,
            height: 1,
        })
    }
}

fn node_height(node: &Option<Box<MemNode>>) -> i32 {
    node.as_ref().map_or(0, |n| n.height)
}

fn update_height(node: &mut MemNode) {
    node.height = 1 + node_height(&node.left).max(node_height(&node.right));
}

fn balance_factor(node: &MemNode) -> i32 {
    node_height(&node.left) - node_height(&node.right)
}

fn rotate_right(mut node: Box<MemNode>) -> Box<MemNode> {
    match node.left.take() {
        Some(mut pivot) => {
            node.left = pivot.right.take();
            update_height(&mut node);
            pivot.right = Some(node);
            update_height(&mut pivot);
            pivot
        }
        None => node,
    }
}

fn rotate_left(mut node: Box<MemNode>) -> Box<MemNode> {
    match node.right.take() {
        Some(mut pivot) => {
            node.right = pivot.left.take();
            update_height(&mut node);
            pivot.left = Some(node);
            update_height(&mut pivot);
            pivot
        }
        None => node,
    }
}

/// Restore the AVL invariant at this node after a subtree changed.
fn rebalance(mut node: Box<MemNode>) -> Box<MemNode> {
    update_height(&mut node);
    let factor = balance_factor(&node);
    if factor > 1 {
        if node.left.as_deref().map_or(0, balance_factor) < 0 {
            if let Some(left) = node.left.take() {
                node.left = Some(rotate_left(left));
            }
        }
        rotate_right(node)
    } else if factor < -1 {
        if node.right.as_deref().map_or(0, balance_factor) > 0 {
            if let Some(right) = node.right.take() {
                node.right = Some(rotate_right(right));
            }
        }
        rotate_left(node)
    } else {
        node
    }
}

fn insert_node(node: Option<Box<MemNode>>, fee: u64, record: MemRecord) -> Box<MemNode> {
    let Some(mut node) = node else {
        return MemNode::new(fee, record);
    };
    if fee == node.fee {
        node.records.push(record);
        return node;
    }
    if fee < node.fee {
        node.left = Some(insert_node(node.left.take(), fee, record));
    } else {
        node.right = Some(insert_node(node.right.take(), fee, record));
    }
    rebalance(node)
}

/// Detach the minimum node of a subtree, returning (rest, minimum). The
/// minimum keeps its own record chain.
fn take_min(mut node: Box<MemNode>) -> (Option<Box<MemNode>>, Box<MemNode>) {
    match node.left.take() {
        None => {
            let rest = node.right.take();
            (rest, node)
        }
        Some(left) => {
            let (rest, minimum) = take_min(left);
            node.left = rest;
            (Some(rebalance(node)), minimum)
        }
    }
}

/// Remove the record (fee, txid), rebalancing on the way back up. Removing
/// from a chain with survivors touches no tree structure.
fn remove_node(node: Option<Box<MemNode>>, fee: u64, txid: &Hash) -> (Option<Box<MemNode>>, bool) {
    let Some(mut node) = node else {
        return (None, false);
    };
    let removed;
    if fee < node.fee {
        let (child, hit) = remove_node(node.left.take(), fee, txid);
        node.left = child;
        removed = hit;
    } else if fee > node.fee {
        let (child, hit) = remove_node(node.right.take(), fee, txid);
        node.right = child;
        removed = hit;
    } else {
        match node.records.iter().position(|record| record.txid == *txid) {
            Some(position) => {
                node.records.remove(position);
                removed = true;
                if node.records.is_empty() {
                    let replacement = match (node.left.take(), node.right.take()) {
                        (None, None) => None,
                        (Some(child), None) | (None, Some(child)) => Some(child),
                        (Some(left), Some(right)) => {
                            let (rest, mut successor) = take_min(right);
                            successor.left = Some(left);
                            successor.right = rest;
                            Some(rebalance(successor))
                        }
                    };
                    return (replacement, true);
                }
            }
            None => removed = false,
        }
    }
    (Some(rebalance(node)), removed)
}

/// Reverse in-order walk emitting at most `remaining` transactions, flushing
/// each node's chain in insertion order before descending left.
fn collect_descending<'a>(
    node: &'a Option<Box<MemNode>>,
    out: &mut Vec<&'a Transaction>,
    remaining: &mut usize,
) {
    let Some(node) = node else {
        return;
    };
    collect_descending(&node.right, out, remaining);
    if *remaining == 0 {
        return;
    }
    for record in &node.records {
        if *remaining == 0 {
            return;
        }
        out.push(&record.tx);
        *remaining -= 1;
    }
    collect_descending(&node.left, out, remaining);
}

#[derive(Default)]
pub struct Mempool {
    root: Option<Box<MemNode>>,
    fees: HashMap<Hash, u64>,
    outputs_referenced: HashSet<Hash>,
}

impl Mempool {
    pub fn new() -> Self {
        Mempool::default()
    }

    pub fn len(&self) -> usize {
        self.fees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fees.is_empty()
    }

    pub fn contains(&self, txid: &Hash) -> bool {
        self.fees.contains_key(txid)
    }

    /// Validate and admit a transaction. A transaction whose input references
    /// an output already claimed by a pool member is a double spend. The fee
    /// recorded is a snapshot taken now.
    pub fn add(&mut self, tx: Transaction, chainstate: &impl UtxoProvider) -> Result<()> {
        tx.validate(chainstate)?;
        // two passes so a rejection cannot leave outputs marked as seen
        for input in tx.inputs() {
            if self
                .outputs_referenced
                .contains(&input.output_referred.output_id)
            {
                return Err(ChainError::DoubleSpentOutput);
            }
        }
        for input in tx.inputs() {
            self.outputs_referenced
                .insert(input.output_referred.output_id);
        }
        let fee = tx.fees();
        self.fees.insert(tx.txid, fee);
        let record = MemRecord { txid: tx.txid, tx };
        self.root = Some(insert_node(self.root.take(), fee, record));
        Ok(())
    }

    /// Evict one transaction, releasing its referenced outputs. The tree
    /// lookup uses the fee snapshot from insertion time.
    pub fn remove(&mut self, tx: &Transaction) -> Result<()> {
        let fee = *self.fees.get(&tx.txid).ok_or(ChainError::TxNotInMempool)?;
        let (root, _) = remove_node(self.root.take(), fee, &tx.txid);
        self.root = root;
        self.fees.remove(&tx.txid);
        for input in tx.inputs() {
            self.outputs_referenced
                .remove(&input.output_referred.output_id);
        }
        Ok(())
    }

    /// Evict every confirmed transaction of a block other than the coinbase,
    /// ignoring entries the pool never held.
    pub fn remove_block(&mut self, block: &Block) {
        for tx in block.transactions() {
            if tx.is_coinbase {
                continue;
            }
            let _ = self.remove(tx);
        }
    }

    /// Snapshot of up to `k` transactions in non-increasing fee order.
    pub fn top_k(&self, k: usize) -> Vec<Transaction> {
        let mut collected = Vec::with_capacity(k.min(self.fees.len()));
        let mut remaining = k;
        collect_descending(&self.root, &mut collected, &mut remaining);
        collected.into_iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionOutput;
    use proptest::prelude::*;

    /// Tree-only fixture: a throwaway transaction whose serialized form is
    /// unique per tag.
    fn tagged_tx(tag: u64) -> Transaction {
        Transaction::new(
            Vec::new(),
            vec![TransactionOutput::new(
                [0u8; 32],
                0,
                tag,
                tag.to_be_bytes().to_vec(),
            )],
        )
    }

    fn tree_with(fees: &[u64]) -> (Option<Box<MemNode>>, Vec<Hash>) {
        let mut root = None;
        let mut ids = Vec::new();
        for (i, &fee) in fees.iter().enumerate() {
            let tx = tagged_tx(i as u64);
            ids.push(tx.txid);
            root = Some(insert_node(root, fee, MemRecord { txid: tx.txid, tx }));
        }
        (root, ids)
    }

    fn collected_fees(root: &Option<Box<MemNode>>, k: usize) -> Vec<u64> {
        let mut out = Vec::new();
        let mut remaining = k;
        collect_descending(root, &mut out, &mut remaining);
        out.iter().map(|tx| tx.outputs()[0].value).collect()
    }

    #[test]
    fn walk_yields_descending_fees() {
        let (root, _) = tree_with(&[5, 1, 9, 3, 7, 2, 8]);
        assert_eq!(collected_fees(&root, 10), vec![9, 8, 7, 5, 3, 2, 1]);
        assert_eq!(collected_fees(&root, 3), vec![9, 8, 7]);
    }

    #[test]
    fn same_fee_records_flush_in_insertion_order() {
        let (root, ids) = tree_with(&[4, 4, 4, 9]);
        let mut out = Vec::new();
        let mut remaining = 10;
        collect_descending(&root, &mut out, &mut remaining);
        let walked: Vec<Hash> = out.iter().map(|tx| tx.txid).collect();
        assert_eq!(walked, vec![ids[3], ids[0], ids[1], ids[2]]);
    }

    #[test]
    fn removal_from_a_chain_keeps_the_node() {
        let (mut root, ids) = tree_with(&[4, 4, 4]);
        let (new_root, removed) = remove_node(root.take(), 4, &ids[1]);
        assert!(removed);
        root = new_root;
        let mut out = Vec::new();
        let mut remaining = 10;
        collect_descending(&root, &mut out, &mut remaining);
        let walked: Vec<Hash> = out.iter().map(|tx| tx.txid).collect();
        assert_eq!(walked, vec![ids[0], ids[2]]);
    }

    #[test]
    fn removing_an_inner_node_promotes_its_successor() {
        let (mut root, ids) = tree_with(&[5, 2, 8, 1, 3, 7, 9]);
        let (new_root, removed) = remove_node(root.take(), 5, &ids[0]);
        assert!(removed);
        root = new_root;
        assert_eq!(collected_fees(&root, 10), vec![9, 8, 7, 3, 2, 1]);
    }

    #[test]
    fn mempool_add_and_top_k_use_fee_snapshots() {
        // Chainstate-free check of the container itself: feed the tree and
        // maps directly through the internal API.
        let mut pool = Mempool::new();
        for (i, fee) in [30u64, 10, 20].into_iter().enumerate() {
            let tx = tagged_tx(i as u64);
            pool.fees.insert(tx.txid, fee);
            pool.root = Some(insert_node(
                pool.root.take(),
                fee,
                MemRecord { txid: tx.txid, tx },
            ));
        }
        let fees: Vec<u64> = pool
            .top_k(2)
            .iter()
            .map(|tx| pool.fees[&tx.txid])
            .collect();
        assert_eq!(fees, vec![30, 20]);
    }

    #[test]
    fn remove_unknown_tx_is_reported() {
        let mut pool = Mempool::new();
        let tx = tagged_tx(1);
        assert!(matches!(
            pool.remove(&tx),
            Err(ChainError::TxNotInMempool)
        ));
    }

    proptest! {
        #[test]
        fn walk_is_sorted_and_balanced(fees in proptest::collection::vec(0u64..50, 1..120)) {
            let (root, _) = tree_with(&fees);
            let walked = collected_fees(&root, fees.len());
            let mut want = fees.clone();
            want.sort_unstable_by(|a, b| b.cmp(a));
            prop_assert_eq!(walked, want);
            // AVL bound: height <= 1.44 log2(n + 2)
            let height = node_height(&root) as f64;
            let bound = 1.45 * ((fees.len() + 2) as f64).log2() + 1.0;
            prop_assert!(height <= bound, "height {height} exceeds {bound}");
        }

        #[test]
        fn every_record_can_be_removed(fees in proptest::collection::vec(0u64..10, 1..60)) {
            let (mut root, ids) = tree_with(&fees);
            for (i, txid) in ids.iter().enumerate() {
                let (rest, removed) = remove_node(root.take(), fees[i], txid);
                prop_assert!(removed);
                root = rest;
            }
            prop_assert!(root.is_none());
        }
    }
}
