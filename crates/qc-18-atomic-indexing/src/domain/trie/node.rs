use bincode::Options;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use shared_types::Hash;

use super::nibbles::Nibbles;
use crate::domain::errors::{CodecError, TrieError};

/// Root hash of the trie with no entries.
pub const EMPTY_TRIE_ROOT: Hash = [
    0x56, 0xe8, 0x1f, 0x17, 0x1b, 0xcc, 0x55, 0xa6, 0xff, 0x83, 0x45, 0xe6, 0x92, 0xc0, 0xf8, 0x6e,
    0x5b, 0x48, 0xe0, 0x1b, 0x99, 0x6c, 0xad, 0xc0, 0x01, 0x62, 0x2f, 0xb5, 0xe3, 0x63, 0xb4, 0x21,
];

/// Compute Keccak256 hash.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

// =============================================================================
// STORED NODE: content-addressed persisted form
// =============================================================================

/// Node as persisted under `trie:` + `keccak256(encoding)`.
///
/// Children are referenced by hash only. There is no stored form of the
/// empty node; an empty trie is represented by `EMPTY_TRIE_ROOT`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoredNode {
    Leaf {
        path: Nibbles,
        value: Vec<u8>,
    },
    Extension {
        path: Nibbles,
        child: Hash,
    },
    Branch {
        children: Box<[Option<Hash>; 16]>,
        value: Option<Vec<u8>>,
    },
}

fn node_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_big_endian()
        .reject_trailing_bytes()
}

impl StoredNode {
    pub fn encode(&self) -> Result<Vec<u8>, TrieError> {
        node_options()
            .serialize(self)
            .map_err(|e| TrieError::Codec(CodecError::Encode(e.to_string())))
    }

    /// Decode and structurally validate a node loaded for `hash`.
    pub fn decode(hash: &Hash, bytes: &[u8]) -> Result<Self, TrieError> {
        let corrupt = |reason: String| TrieError::CorruptNode {
            hash: *hash,
            reason,
        };
        let node: StoredNode = node_options()
            .deserialize(bytes)
            .map_err(|e| corrupt(e.to_string()))?;
        match &node {
            StoredNode::Leaf { path, .. } if !path.is_valid() => {
                Err(corrupt("leaf path holds a non-nibble".to_string()))
            }
            StoredNode::Extension { path, .. } if path.is_empty() || !path.is_valid() => {
                Err(corrupt("extension path is empty or malformed".to_string()))
            }
            _ => Ok(node),
        }
    }

    pub fn hash(&self) -> Result<Hash, TrieError> {
        Ok(keccak256(&self.encode()?))
    }
}

// =============================================================================
// WORKING NODE: mutable in-memory tree
// =============================================================================

/// Node of the mutable working tree.
///
/// Untouched subtrees stay as `Hashed` references and are loaded from the
/// store only when a mutation walks into them. `cached` memoizes the subtree
/// hash; every mutation clears it along the path it walks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Empty,
    Hashed(Hash),
    Leaf {
        path: Nibbles,
        value: Vec<u8>,
        cached: Option<Hash>,
    },
    Extension {
        path: Nibbles,
        child: Box<Node>,
        cached: Option<Hash>,
    },
    Branch {
        children: Box<[Node; 16]>,
        value: Option<Vec<u8>>,
        cached: Option<Hash>,
    },
}

impl Node {
    /// Node referenced by a root hash.
    pub fn from_root(root: Hash) -> Self {
        if root == EMPTY_TRIE_ROOT {
            Node::Empty
        } else {
            Node::Hashed(root)
        }
    }

    pub fn leaf(path: Nibbles, value: Vec<u8>) -> Self {
        Node::Leaf {
            path,
            value,
            cached: None,
        }
    }

    pub fn extension(path: Nibbles, child: Box<Node>) -> Self {
        Node::Extension {
            path,
            child,
            cached: None,
        }
    }

    pub fn branch(children: Box<[Node; 16]>, value: Option<Vec<u8>>) -> Self {
        Node::Branch {
            children,
            value,
            cached: None,
        }
    }

    pub fn empty_children() -> Box<[Node; 16]> {
        Box::new(std::array::from_fn(|_| Node::Empty))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Node::Empty)
    }

    /// Expand a stored node one level; its children stay hashed.
    pub fn from_stored(stored: StoredNode) -> Self {
        match stored {
            StoredNode::Leaf { path, value } => Node::leaf(path, value),
            StoredNode::Extension { path, child } => {
                Node::extension(path, Box::new(Node::Hashed(child)))
            }
            StoredNode::Branch { children, value } => {
                let children = Box::new(std::array::from_fn(|i| match children[i] {
                    Some(hash) => Node::Hashed(hash),
                    None => Node::Empty,
                }));
                Node::branch(children, value)
            }
        }
    }

    /// Forget the memoized hash of this node.
    pub fn clear_cached(&mut self) {
        if let Node::Leaf { cached, .. } | Node::Extension { cached, .. } | Node::Branch { cached, .. } =
            self
        {
            *cached = None;
        }
    }

    /// Whether this node's subtree hash is known without encoding anything.
    pub fn is_hash_known(&self) -> bool {
        match self {
            Node::Empty | Node::Hashed(_) => true,
            Node::Leaf { cached, .. } | Node::Extension { cached, .. } | Node::Branch { cached, .. } => {
                cached.is_some()
            }
        }
    }

    /// Hash this subtree, encoding only nodes whose hash is not memoized.
    /// Returns `None` for the empty node.
    pub fn hash(&mut self) -> Result<Option<Hash>, TrieError> {
        let stored = match self {
            Node::Empty => return Ok(None),
            Node::Hashed(hash) => return Ok(Some(*hash)),
            Node::Leaf {
                cached: Some(hash), ..
            }
            | Node::Extension {
                cached: Some(hash), ..
            }
            | Node::Branch {
                cached: Some(hash), ..
            } => return Ok(Some(*hash)),
            Node::Leaf { path, value, .. } => StoredNode::Leaf {
                path: path.clone(),
                value: value.clone(),
            },
            Node::Extension { path, child, .. } => StoredNode::Extension {
                path: path.clone(),
                child: extension_child(child.hash()?)?,
            },
            Node::Branch {
                children, value, ..
            } => {
                let mut hashes: Box<[Option<Hash>; 16]> = Box::new([None; 16]);
                for (slot, child) in hashes.iter_mut().zip(children.iter_mut()) {
                    *slot = child.hash()?;
                }
                StoredNode::Branch {
                    children: hashes,
                    value: value.clone(),
                }
            }
        };
        let hash = stored.hash()?;
        if let Node::Leaf { cached, .. } | Node::Extension { cached, .. } | Node::Branch { cached, .. } =
            self
        {
            *cached = Some(hash);
        }
        Ok(Some(hash))
    }

    /// Hash this subtree, pushing the encoding of every node that is not yet
    /// persisted onto `sealed`. Returns `None` for the empty node.
    pub fn seal(&self, sealed: &mut Vec<(Hash, Vec<u8>)>) -> Result<Option<Hash>, TrieError> {
        let stored = match self {
            Node::Empty => return Ok(None),
            Node::Hashed(hash) => return Ok(Some(*hash)),
            Node::Leaf { path, value, .. } => StoredNode::Leaf {
                path: path.clone(),
                value: value.clone(),
            },
            Node::Extension { path, child, .. } => StoredNode::Extension {
                path: path.clone(),
                child: extension_child(child.seal(sealed)?)?,
            },
            Node::Branch {
                children, value, ..
            } => {
                let mut hashes: Box<[Option<Hash>; 16]> = Box::new([None; 16]);
                for (slot, child) in hashes.iter_mut().zip(children.iter()) {
                    *slot = child.seal(sealed)?;
                }
                StoredNode::Branch {
                    children: hashes,
                    value: value.clone(),
                }
            }
        };
        let encoded = stored.encode()?;
        let hash = keccak256(&encoded);
        sealed.push((hash, encoded));
        Ok(Some(hash))
    }
}

fn extension_child(child: Option<Hash>) -> Result<Hash, TrieError> {
    child.ok_or_else(|| TrieError::CorruptNode {
        hash: EMPTY_TRIE_ROOT,
        reason: "extension without child".to_string(),
    })
}
