//! # Core Domain Entities
//!
//! Atomic operations as emitted by the execution layer when a block is
//! accepted.
//!
//! ## Clusters
//!
//! - **Identity**: `Hash`, `ChainId`
//! - **Atomic Operations**: `PutOperation`, `AtomicOperationBatch`, `AtomicOps`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// CLUSTER A: IDENTITY
// =============================================================================

/// A 32-byte digest (Keccak-256 for trie roots).
pub type Hash = [u8; 32];

/// The all-zero hash, reported when nothing has been committed yet.
pub const ZERO_HASH: Hash = [0u8; 32];

/// Opaque identifier of the chain an atomic operation is addressed to.
///
/// Ordered bytewise so that per-block operation maps iterate deterministically.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ChainId(pub [u8; 32]);

impl ChainId {
    pub const LEN: usize = 32;

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse from a byte slice, returning `None` unless it is exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(array))
    }
}

impl From<[u8; 32]> for ChainId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

// =============================================================================
// CLUSTER B: ATOMIC OPERATIONS
// =============================================================================

/// A keyed value to be put into another chain's shared memory.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutOperation {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Secondary index tags, in the order the execution layer produced them.
    pub traits: Vec<Vec<u8>>,
}

impl PutOperation {
    pub fn new(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            key,
            value,
            traits: Vec::new(),
        }
    }

    pub fn with_traits(mut self, traits: Vec<Vec<u8>>) -> Self {
        self.traits = traits;
        self
    }
}

/// All atomic operations one block addresses to a single chain.
///
/// Puts and removes keep the order in which they were emitted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicOperationBatch {
    puts: Vec<PutOperation>,
    removes: Vec<Vec<u8>>,
}

impl AtomicOperationBatch {
    pub fn new(puts: Vec<PutOperation>, removes: Vec<Vec<u8>>) -> Self {
        Self { puts, removes }
    }

    pub fn with_put(mut self, put: PutOperation) -> Self {
        self.puts.push(put);
        self
    }

    pub fn with_remove(mut self, key: Vec<u8>) -> Self {
        self.removes.push(key);
        self
    }

    pub fn puts(&self) -> &[PutOperation] {
        &self.puts
    }

    pub fn removes(&self) -> &[Vec<u8>] {
        &self.removes
    }

    pub fn is_empty(&self) -> bool {
        self.puts.is_empty() && self.removes.is_empty()
    }

    /// Total number of put and remove operations.
    pub fn len(&self) -> usize {
        self.puts.len() + self.removes.len()
    }

    /// Append another batch for the same chain, preserving order.
    pub fn extend(&mut self, other: AtomicOperationBatch) {
        self.puts.extend(other.puts);
        self.removes.extend(other.removes);
    }
}

/// Atomic operations of one block, keyed by destination chain.
pub type AtomicOps = BTreeMap<ChainId, AtomicOperationBatch>;

/// Merge per-transaction operation maps into a single per-block map.
///
/// Batches addressed to the same chain are concatenated in transaction order.
pub fn merge_atomic_ops<I>(transactions: I) -> AtomicOps
where
    I: IntoIterator<Item = AtomicOps>,
{
    let mut merged = AtomicOps::new();
    for ops in transactions {
        for (chain_id, batch) in ops {
            merged.entry(chain_id).or_default().extend(batch);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(byte: u8) -> ChainId {
        ChainId([byte; 32])
    }

    #[test]
    fn test_chain_id_from_slice() {
        assert_eq!(ChainId::from_slice(&[7u8; 32]), Some(chain(7)));
        assert_eq!(ChainId::from_slice(&[7u8; 31]), None);
        assert_eq!(ChainId::from_slice(&[7u8; 33]), None);
    }

    #[test]
    fn test_chain_id_display_is_hex() {
        let id = chain(0xAB);
        assert_eq!(id.to_string(), "ab".repeat(32));
    }

    #[test]
    fn test_batch_builders_preserve_order() {
        let batch = AtomicOperationBatch::default()
            .with_put(PutOperation::new(vec![1], vec![10]))
            .with_put(PutOperation::new(vec![2], vec![20]))
            .with_remove(vec![9])
            .with_remove(vec![8]);

        assert_eq!(batch.len(), 4);
        assert_eq!(batch.puts()[0].key, vec![1]);
        assert_eq!(batch.puts()[1].key, vec![2]);
        assert_eq!(batch.removes(), &[vec![9], vec![8]]);
    }

    #[test]
    fn test_merge_concatenates_same_chain() {
        let mut first = AtomicOps::new();
        first.insert(
            chain(1),
            AtomicOperationBatch::default().with_put(PutOperation::new(vec![1], vec![1])),
        );
        let mut second = AtomicOps::new();
        second.insert(
            chain(1),
            AtomicOperationBatch::default().with_remove(vec![5]),
        );
        second.insert(
            chain(2),
            AtomicOperationBatch::default().with_put(PutOperation::new(vec![2], vec![2])),
        );

        let merged = merge_atomic_ops(vec![first, second]);

        assert_eq!(merged.len(), 2);
        let batch = &merged[&chain(1)];
        assert_eq!(batch.puts().len(), 1);
        assert_eq!(batch.removes(), &[vec![5]]);
        assert_eq!(merged[&chain(2)].puts().len(), 1);
    }

    #[test]
    fn test_atomic_ops_iterate_in_chain_order() {
        let mut ops = AtomicOps::new();
        ops.insert(chain(9), AtomicOperationBatch::default());
        ops.insert(chain(1), AtomicOperationBatch::default());
        ops.insert(chain(5), AtomicOperationBatch::default());

        let order: Vec<u8> = ops.keys().map(|id| id.0[0]).collect();
        assert_eq!(order, vec![1, 5, 9]);
    }

    #[test]
    fn test_serde_roundtrip_with_bincode() {
        let put = PutOperation::new(vec![1, 2], vec![3]).with_traits(vec![vec![4], vec![]]);
        let batch = AtomicOperationBatch::new(vec![put], vec![vec![6, 7]]);

        let bytes = bincode::serialize(&batch).unwrap();
        let decoded: AtomicOperationBatch = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, batch);
    }
}
