use std::sync::Arc;

use shared_types::Hash;

use super::merkle::{load_node, lookup};
use super::nibbles::Nibbles;
use super::node::{StoredNode, EMPTY_TRIE_ROOT};
use crate::domain::entities::trie_node_key;
use crate::domain::errors::TrieError;
use crate::ports::outbound::KeyValueStore;

/// Read-only view of a committed trie root.
///
/// Committed nodes are content-addressed and never overwritten, so a snapshot
/// stays valid while the working trie keeps changing.
pub struct TrieSnapshot<S: KeyValueStore> {
    store: Arc<S>,
    root: Hash,
}

impl<S: KeyValueStore> Clone for TrieSnapshot<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            root: self.root,
        }
    }
}

impl<S: KeyValueStore> TrieSnapshot<S> {
    /// Open `root`, failing with `MissingNode` if it was never persisted.
    pub fn open(store: Arc<S>, root: Hash) -> Result<Self, TrieError> {
        if root != EMPTY_TRIE_ROOT && !store.exists(&trie_node_key(&root))? {
            return Err(TrieError::MissingNode { hash: root });
        }
        Ok(Self { store, root })
    }

    pub fn root(&self) -> Hash {
        self.root
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        let path = Nibbles::from_bytes(key);
        lookup(self.store.as_ref(), self.root, path.as_slice())
    }

    /// All entries in ascending key order.
    pub fn iter(&self) -> TrieIter<S> {
        let mut stack = Vec::new();
        if self.root != EMPTY_TRIE_ROOT {
            stack.push(Frame::Node {
                hash: self.root,
                prefix: Nibbles::default(),
            });
        }
        TrieIter {
            store: Arc::clone(&self.store),
            stack,
        }
    }
}

enum Frame {
    Node { hash: Hash, prefix: Nibbles },
    Value { path: Nibbles, value: Vec<u8> },
}

/// Depth-first, key-ordered walk over a snapshot.
///
/// A branch's own value sorts before every child, since its key is a strict
/// prefix of theirs. The first error ends the walk.
pub struct TrieIter<S: KeyValueStore> {
    store: Arc<S>,
    stack: Vec<Frame>,
}

impl<S: KeyValueStore> TrieIter<S> {
    fn entry(path: &Nibbles, value: Vec<u8>) -> Result<(Vec<u8>, Vec<u8>), TrieError> {
        Ok((path.to_bytes()?, value))
    }

    fn step(&mut self) -> Option<Result<(Vec<u8>, Vec<u8>), TrieError>> {
        while let Some(frame) = self.stack.pop() {
            let (hash, prefix) = match frame {
                Frame::Value { path, value } => return Some(Self::entry(&path, value)),
                Frame::Node { hash, prefix } => (hash, prefix),
            };
            let node = match load_node(self.store.as_ref(), &hash) {
                Ok(node) => node,
                Err(e) => return Some(Err(e)),
            };
            match node {
                StoredNode::Leaf { path, value } => {
                    return Some(Self::entry(&prefix.join(path.as_slice()), value));
                }
                StoredNode::Extension { path, child } => self.stack.push(Frame::Node {
                    hash: child,
                    prefix: prefix.join(path.as_slice()),
                }),
                StoredNode::Branch { children, value } => {
                    for (nibble, child) in children.iter().enumerate().rev() {
                        if let Some(child) = child {
                            self.stack.push(Frame::Node {
                                hash: *child,
                                prefix: prefix.push(nibble as u8),
                            });
                        }
                    }
                    if let Some(value) = value {
                        self.stack.push(Frame::Value {
                            path: prefix,
                            value,
                        });
                    }
                }
            }
        }
        None
    }
}

impl<S: KeyValueStore> Iterator for TrieIter<S> {
    type Item = Result<(Vec<u8>, Vec<u8>), TrieError>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.step();
        if matches!(item, Some(Err(_))) {
            self.stack.clear();
        }
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryKVStore;
    use crate::domain::trie::MerkleTrie;
    use crate::ports::outbound::BatchOperation;

    fn committed(entries: &[(&str, &str)]) -> (Arc<InMemoryKVStore>, Hash) {
        let store = Arc::new(InMemoryKVStore::new());
        let mut trie = MerkleTrie::new(Arc::clone(&store));
        for (key, value) in entries {
            trie.insert(key.as_bytes(), value.as_bytes().to_vec()).unwrap();
        }
        let (root, nodes) = trie.prepare_commit().unwrap();
        store
            .atomic_batch_write(
                nodes
                    .into_iter()
                    .map(|(hash, bytes)| BatchOperation::put(trie_node_key(&hash), bytes))
                    .collect(),
            )
            .unwrap();
        (store, root)
    }

    #[test]
    fn test_iter_yields_sorted_entries() {
        let (store, root) = committed(&[
            ("b", "2"),
            ("a", "1"),
            ("ab", "3"),
            ("abc", "4"),
            ("\x00", "0"),
            ("zz", "5"),
        ]);
        let snapshot = TrieSnapshot::open(store, root).unwrap();
        let keys: Vec<Vec<u8>> = snapshot.iter().map(|e| e.unwrap().0).collect();
        assert_eq!(
            keys,
            vec![
                b"\x00".to_vec(),
                b"a".to_vec(),
                b"ab".to_vec(),
                b"abc".to_vec(),
                b"b".to_vec(),
                b"zz".to_vec()
            ]
        );
    }

    #[test]
    fn test_empty_root_iterates_nothing() {
        let snapshot =
            TrieSnapshot::open(Arc::new(InMemoryKVStore::new()), EMPTY_TRIE_ROOT).unwrap();
        assert_eq!(snapshot.iter().count(), 0);
        assert_eq!(snapshot.get(b"any").unwrap(), None);
    }

    #[test]
    fn test_unknown_root_rejected() {
        let result = TrieSnapshot::open(Arc::new(InMemoryKVStore::new()), [5; 32]);
        assert!(matches!(result, Err(TrieError::MissingNode { .. })));
    }

    #[test]
    fn test_snapshot_get() {
        let (store, root) = committed(&[("key", "value"), ("kez", "other")]);
        let snapshot = TrieSnapshot::open(store, root).unwrap();
        assert_eq!(snapshot.get(b"key").unwrap(), Some(b"value".to_vec()));
        assert_eq!(snapshot.get(b"ke").unwrap(), None);
    }

    #[test]
    fn test_missing_child_ends_iteration_with_error() {
        let (store, root) = committed(&[("aa", "1"), ("ab", "2"), ("b", "3")]);
        let snapshot = TrieSnapshot::open(Arc::clone(&store), root).unwrap();

        // Drop every node except the root.
        for (key, _) in store.prefix_scan(b"trie:").unwrap() {
            if key != trie_node_key(&root) {
                store.delete(&key).unwrap();
            }
        }

        let mut iter = snapshot.iter();
        assert!(matches!(iter.next(), Some(Err(TrieError::MissingNode { .. }))));
        assert!(iter.next().is_none());
    }
}
