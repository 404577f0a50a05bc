//! # Merkle-Patricia Trie
//!
//! Hexary trie over nibble paths with Keccak-256 node hashing.
//!
//! - `MerkleTrie`: mutable working state; commits hand back dirty nodes
//! - `TrieSnapshot`: read-only view of a persisted root
//! - `TrieIter`: ordered `(key, value)` walk of a snapshot
//!
//! The shape is canonical after every mutation, so identical key/value sets
//! always hash to identical roots.

pub mod merkle;
pub mod nibbles;
pub mod node;
pub mod snapshot;

pub use merkle::MerkleTrie;
pub use nibbles::Nibbles;
pub use node::{keccak256, EMPTY_TRIE_ROOT};
pub use snapshot::{TrieIter, TrieSnapshot};
