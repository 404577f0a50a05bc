//! Persisted records and the key layout shared by the repository and indexer.

use serde::{Deserialize, Serialize};
use shared_types::{AtomicOps, ChainId, Hash, PutOperation, ZERO_HASH};

use super::errors::CodecError;

// =============================================================================
// STORE KEY LAYOUT
// =============================================================================

/// Repository records: `atx:` + height (big-endian).
pub const ATOMIC_TX_PREFIX: &[u8] = b"atx:";
/// Sentinel key of the commit marker.
pub const COMMIT_MARKER_KEY: &[u8] = b"meta:last_committed";
/// Historical roots: `root:` + height (big-endian).
pub const ROOT_INDEX_PREFIX: &[u8] = b"root:";
/// Content-addressed trie nodes: `trie:` + node hash.
pub const TRIE_NODE_PREFIX: &[u8] = b"trie:";
/// Live-key index: `live:` + chain + key length + key + height.
pub const LIVE_KEY_PREFIX: &[u8] = b"live:";

pub(crate) fn height_key(prefix: &[u8], height: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 8);
    key.extend_from_slice(prefix);
    key.extend_from_slice(&height.to_be_bytes());
    key
}

pub(crate) fn height_from_key(prefix: &[u8], key: &[u8]) -> Result<u64, CodecError> {
    let suffix = key.strip_prefix(prefix).unwrap_or(key);
    let bytes: [u8; 8] = suffix.try_into().map_err(|_| CodecError::InvalidLength {
        what: "height key",
        expected: prefix.len() + 8,
        actual: key.len(),
    })?;
    Ok(u64::from_be_bytes(bytes))
}

pub(crate) fn trie_node_key(hash: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(TRIE_NODE_PREFIX.len() + 32);
    key.extend_from_slice(TRIE_NODE_PREFIX);
    key.extend_from_slice(hash);
    key
}

/// Prefix of every live-index key for `(chain_id, op_key)`.
///
/// The key length is framed so that one operation key can never be a prefix
/// match for a longer one.
pub(crate) fn live_key_prefix(chain_id: &ChainId, op_key: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(LIVE_KEY_PREFIX.len() + 36 + op_key.len() + 8);
    key.extend_from_slice(LIVE_KEY_PREFIX);
    key.extend_from_slice(chain_id.as_bytes());
    key.extend_from_slice(&(op_key.len() as u32).to_be_bytes());
    key.extend_from_slice(op_key);
    key
}

pub(crate) fn live_key(chain_id: &ChainId, op_key: &[u8], height: u64) -> Vec<u8> {
    let mut key = live_key_prefix(chain_id, op_key);
    key.extend_from_slice(&height.to_be_bytes());
    key
}

// =============================================================================
// RECORDS
// =============================================================================

/// All atomic operations accepted at one block height.
///
/// Written exactly once to the repository and never mutated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeightRecord {
    pub height: u64,
    pub batches: AtomicOps,
}

impl HeightRecord {
    pub fn new(height: u64, batches: AtomicOps) -> Self {
        Self { height, batches }
    }
}

/// Last durably committed trie state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMarker {
    pub root: Hash,
    pub height: u64,
}

impl CommitMarker {
    pub fn new(root: Hash, height: u64) -> Self {
        Self { root, height }
    }

    /// Reported before the genesis commit.
    pub fn uncommitted() -> Self {
        Self {
            root: ZERO_HASH,
            height: 0,
        }
    }
}

// =============================================================================
// TRIE ENTRIES
// =============================================================================

/// Composite trie key: `height (BE) || chain id || operation key`.
///
/// Big-endian heights make the trie's byte order ascend by height.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TrieKey {
    pub height: u64,
    pub chain_id: ChainId,
    pub op_key: Vec<u8>,
}

impl TrieKey {
    pub const HEADER_LEN: usize = 8 + ChainId::LEN;

    pub fn new(height: u64, chain_id: ChainId, op_key: Vec<u8>) -> Self {
        Self {
            height,
            chain_id,
            op_key,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(Self::HEADER_LEN + self.op_key.len());
        key.extend_from_slice(&self.height.to_be_bytes());
        key.extend_from_slice(self.chain_id.as_bytes());
        key.extend_from_slice(&self.op_key);
        key
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < Self::HEADER_LEN {
            return Err(CodecError::InvalidLength {
                what: "trie key",
                expected: Self::HEADER_LEN,
                actual: bytes.len(),
            });
        }
        let (height_bytes, rest) = bytes.split_at(8);
        let (chain_bytes, op_key) = rest.split_at(ChainId::LEN);
        let mut height = [0u8; 8];
        height.copy_from_slice(height_bytes);
        let chain_id = ChainId::from_slice(chain_bytes).ok_or(CodecError::InvalidLength {
            what: "chain id",
            expected: ChainId::LEN,
            actual: chain_bytes.len(),
        })?;
        Ok(Self {
            height: u64::from_be_bytes(height),
            chain_id,
            op_key: op_key.to_vec(),
        })
    }
}

/// Value stored under a `TrieKey`: the put's payload without its key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrieEntryValue {
    pub value: Vec<u8>,
    pub traits: Vec<Vec<u8>>,
}

impl TrieEntryValue {
    pub fn from_put(put: &PutOperation) -> Self {
        Self {
            value: put.value.clone(),
            traits: put.traits.clone(),
        }
    }

    pub fn into_put(self, key: Vec<u8>) -> PutOperation {
        PutOperation::new(key, self.value).with_traits(self.traits)
    }
}
