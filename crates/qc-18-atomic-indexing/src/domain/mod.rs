pub mod codec;
pub mod entities;
pub mod errors;
pub mod trie;
pub mod value_objects;

pub use codec::*;
pub use entities::*;
pub use errors::*;
pub use trie::{keccak256, MerkleTrie, TrieIter, TrieSnapshot, EMPTY_TRIE_ROOT};
pub use value_objects::*;
