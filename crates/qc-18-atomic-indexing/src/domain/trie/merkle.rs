use std::sync::Arc;

use shared_types::Hash;

use super::nibbles::{common_prefix_len, Nibbles};
use super::node::{Node, StoredNode, EMPTY_TRIE_ROOT};
use crate::domain::entities::trie_node_key;
use crate::domain::errors::TrieError;
use crate::ports::outbound::KeyValueStore;

// =============================================================================
// NODE LOADING
// =============================================================================

/// Load and decode the persisted node for `hash`.
pub(crate) fn load_node<S: KeyValueStore + ?Sized>(
    store: &S,
    hash: &Hash,
) -> Result<StoredNode, TrieError> {
    let bytes = store
        .get(&trie_node_key(hash))?
        .ok_or(TrieError::MissingNode { hash: *hash })?;
    StoredNode::decode(hash, &bytes)
}

/// Look up `path` in the persisted trie rooted at `root`.
pub(crate) fn lookup<S: KeyValueStore + ?Sized>(
    store: &S,
    root: Hash,
    path: &[u8],
) -> Result<Option<Vec<u8>>, TrieError> {
    if root == EMPTY_TRIE_ROOT {
        return Ok(None);
    }
    let mut hash = root;
    let mut depth = 0;
    loop {
        let remaining = &path[depth..];
        match load_node(store, &hash)? {
            StoredNode::Leaf { path: leaf_path, value } => {
                return Ok((leaf_path.as_slice() == remaining).then_some(value));
            }
            StoredNode::Extension { path: ext, child } => {
                if !remaining.starts_with(ext.as_slice()) {
                    return Ok(None);
                }
                depth += ext.len();
                hash = child;
            }
            StoredNode::Branch { children, value } => match remaining.split_first() {
                None => return Ok(value),
                Some((nibble, _)) => match children[*nibble as usize] {
                    Some(child) => {
                        depth += 1;
                        hash = child;
                    }
                    None => return Ok(None),
                },
            },
        }
    }
}

// =============================================================================
// WORKING TRIE
// =============================================================================

/// Mutable Merkle-Patricia trie backed by a content-addressed node store.
///
/// Mutations stay in memory until `prepare_commit` hands out the dirty nodes
/// and the caller persists them. The trie itself never writes to the store.
pub struct MerkleTrie<S: KeyValueStore> {
    store: Arc<S>,
    root: Node,
}

impl<S: KeyValueStore> MerkleTrie<S> {
    /// Empty trie.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            root: Node::Empty,
        }
    }

    /// Trie positioned at a persisted root. Nodes load lazily.
    pub fn open(store: Arc<S>, root: Hash) -> Self {
        Self {
            store,
            root: Node::from_root(root),
        }
    }

    /// Drop all uncommitted changes and reposition at `root`.
    pub fn reset(&mut self, root: Hash) {
        self.root = Node::from_root(root);
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        let path = Nibbles::from_bytes(key);
        self.get_in(&self.root, path.as_slice())
    }

    pub fn insert(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), TrieError> {
        let path = Nibbles::from_bytes(key);
        let mut root = std::mem::replace(&mut self.root, Node::Empty);
        let result = self.insert_at(&mut root, path.as_slice(), value);
        self.root = root;
        result
    }

    /// Remove `key`. Returns whether it was present.
    pub fn remove(&mut self, key: &[u8]) -> Result<bool, TrieError> {
        let path = Nibbles::from_bytes(key);
        let mut root = std::mem::replace(&mut self.root, Node::Empty);
        let result = self.remove_at(&mut root, path.as_slice());
        self.root = root;
        result
    }

    /// Root hash of the working state, without persisting anything.
    ///
    /// Subtree hashes are memoized, so only paths changed since the previous
    /// call are re-encoded.
    pub fn root_hash(&mut self) -> Result<Hash, TrieError> {
        Ok(self.root.hash()?.unwrap_or(EMPTY_TRIE_ROOT))
    }

    /// Root hash plus the `(hash, encoding)` of every node not yet persisted.
    ///
    /// Nodes are ordered children first. The working state is unchanged until
    /// `mark_committed` is called.
    pub fn prepare_commit(&self) -> Result<(Hash, Vec<(Hash, Vec<u8>)>), TrieError> {
        let mut sealed = Vec::new();
        let root = self.root.seal(&mut sealed)?.unwrap_or(EMPTY_TRIE_ROOT);
        Ok((root, sealed))
    }

    /// Collapse the working tree onto a root whose nodes are now persisted.
    pub fn mark_committed(&mut self, root: Hash) {
        self.root = Node::from_root(root);
    }

    fn resolve(&self, node: &mut Node) -> Result<(), TrieError> {
        if let Node::Hashed(hash) = node {
            *node = Node::from_stored(load_node(self.store.as_ref(), hash)?);
        }
        Ok(())
    }

    fn get_in(&self, node: &Node, path: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        match node {
            Node::Empty => Ok(None),
            Node::Hashed(hash) => lookup(self.store.as_ref(), *hash, path),
            Node::Leaf {
                path: leaf_path,
                value,
                ..
            } => Ok((leaf_path.as_slice() == path).then(|| value.clone())),
            Node::Extension {
                path: ext, child, ..
            } => {
                if path.starts_with(ext.as_slice()) {
                    self.get_in(child, &path[ext.len()..])
                } else {
                    Ok(None)
                }
            }
            Node::Branch {
                children, value, ..
            } => match path.split_first() {
                None => Ok(value.clone()),
                Some((nibble, rest)) => self.get_in(&children[*nibble as usize], rest),
            },
        }
    }

    fn insert_at(&self, node: &mut Node, path: &[u8], value: Vec<u8>) -> Result<(), TrieError> {
        self.resolve(node)?;
        node.clear_cached();
        match node {
            Node::Empty => *node = leaf(path, value),
            Node::Hashed(hash) => return Err(TrieError::MissingNode { hash: *hash }),
            Node::Leaf {
                path: leaf_path,
                value: slot,
                ..
            } => {
                if leaf_path.as_slice() == path {
                    *slot = value;
                } else {
                    let leaf_path = std::mem::take(leaf_path);
                    let leaf_value = std::mem::take(slot);
                    *node = split_leaf(leaf_path, leaf_value, path, value);
                }
            }
            Node::Extension {
                path: ext, child, ..
            } => {
                if path.starts_with(ext.as_slice()) {
                    let consumed = ext.len();
                    return self.insert_at(child, &path[consumed..], value);
                }
                let ext = std::mem::take(ext);
                let child = std::mem::replace(child, Box::new(Node::Empty));
                *node = split_extension(ext, child, path, value);
            }
            Node::Branch {
                children,
                value: slot,
                ..
            } => match path.split_first() {
                None => *slot = Some(value),
                Some((nibble, rest)) => {
                    return self.insert_at(&mut children[*nibble as usize], rest, value)
                }
            },
        }
        Ok(())
    }

    fn remove_at(&self, node: &mut Node, path: &[u8]) -> Result<bool, TrieError> {
        self.resolve(node)?;
        match node {
            Node::Empty => return Ok(false),
            Node::Hashed(hash) => return Err(TrieError::MissingNode { hash: *hash }),
            Node::Leaf {
                path: leaf_path, ..
            } => {
                if leaf_path.as_slice() != path {
                    return Ok(false);
                }
                *node = Node::Empty;
                return Ok(true);
            }
            Node::Extension {
                path: ext, child, ..
            } => {
                if !path.starts_with(ext.as_slice()) {
                    return Ok(false);
                }
                let consumed = ext.len();
                if !self.remove_at(child, &path[consumed..])? {
                    return Ok(false);
                }
            }
            Node::Branch {
                children, value, ..
            } => match path.split_first() {
                None => {
                    if value.take().is_none() {
                        return Ok(false);
                    }
                }
                Some((nibble, rest)) => {
                    if !self.remove_at(&mut children[*nibble as usize], rest)? {
                        return Ok(false);
                    }
                }
            },
        }
        self.normalize(node)?;
        Ok(true)
    }

    /// Restore canonical shape after a removal below `node`.
    ///
    /// Any child that a collapse merges with is loaded first, so the
    /// infallible rewrite below never sees a hashed leaf or extension.
    fn normalize(&self, node: &mut Node) -> Result<(), TrieError> {
        match node {
            Node::Extension { child, .. } => self.resolve(child)?,
            Node::Branch {
                children,
                value: None,
                ..
            } => {
                let live = live_children(children);
                if let [index] = live.as_slice() {
                    self.resolve(&mut children[*index])?;
                }
            }
            _ => {}
        }
        let owned = std::mem::replace(node, Node::Empty);
        *node = collapse(owned);
        Ok(())
    }
}

fn leaf(path: &[u8], value: Vec<u8>) -> Node {
    Node::leaf(Nibbles::from_slice(path), value)
}

fn with_prefix(prefix: &[u8], node: Node) -> Node {
    if prefix.is_empty() {
        node
    } else {
        Node::extension(Nibbles::from_slice(prefix), Box::new(node))
    }
}

/// Place a new leaf for `rest` into a branch under construction.
fn attach(children: &mut [Node; 16], slot: &mut Option<Vec<u8>>, rest: &[u8], value: Vec<u8>) {
    match rest.split_first() {
        None => *slot = Some(value),
        Some((nibble, tail)) => children[*nibble as usize] = leaf(tail, value),
    }
}

fn split_leaf(existing: Nibbles, existing_value: Vec<u8>, path: &[u8], value: Vec<u8>) -> Node {
    let common = common_prefix_len(existing.as_slice(), path);
    let mut children = Node::empty_children();
    let mut slot = None;
    attach(&mut children, &mut slot, &existing.as_slice()[common..], existing_value);
    attach(&mut children, &mut slot, &path[common..], value);
    with_prefix(&path[..common], Node::branch(children, slot))
}

/// Split an extension whose path diverges from `path` before its end.
fn split_extension(ext: Nibbles, child: Box<Node>, path: &[u8], value: Vec<u8>) -> Node {
    let ext = ext.as_slice();
    let common = common_prefix_len(ext, path);
    let mut children = Node::empty_children();
    let mut slot = None;
    let ext_rest = &ext[common + 1..];
    children[ext[common] as usize] = if ext_rest.is_empty() {
        *child
    } else {
        Node::extension(Nibbles::from_slice(ext_rest), child)
    };
    attach(&mut children, &mut slot, &path[common..], value);
    with_prefix(&path[..common], Node::branch(children, slot))
}

fn live_children(children: &[Node; 16]) -> Vec<usize> {
    children
        .iter()
        .enumerate()
        .filter(|(_, child)| !child.is_empty())
        .map(|(index, _)| index)
        .collect()
}

fn collapse(node: Node) -> Node {
    match node {
        Node::Extension { path, child, .. } => match *child {
            Node::Empty => Node::Empty,
            Node::Leaf {
                path: tail, value, ..
            } => Node::leaf(path.join(tail.as_slice()), value),
            Node::Extension {
                path: tail, child, ..
            } => Node::extension(path.join(tail.as_slice()), child),
            other => Node::extension(path, Box::new(other)),
        },
        Node::Branch {
            mut children,
            value,
            ..
        } => {
            let live = live_children(&children);
            match (live.as_slice(), value) {
                ([], Some(value)) => leaf(&[], value),
                ([], None) => Node::Empty,
                ([index], None) => {
                    let nibble = *index as u8;
                    let prefix = Nibbles::from_slice(&[nibble]);
                    match std::mem::replace(&mut children[*index], Node::Empty) {
                        Node::Leaf { path, value, .. } => {
                            Node::leaf(prefix.join(path.as_slice()), value)
                        }
                        Node::Extension { path, child, .. } => {
                            Node::extension(prefix.join(path.as_slice()), child)
                        }
                        other => Node::extension(prefix, Box::new(other)),
                    }
                }
                (_, value) => Node::branch(children, value),
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryKVStore;
    use crate::ports::outbound::BatchOperation;

    fn new_trie() -> MerkleTrie<InMemoryKVStore> {
        MerkleTrie::new(Arc::new(InMemoryKVStore::new()))
    }

    fn persist(trie: &mut MerkleTrie<InMemoryKVStore>) -> Hash {
        let (root, nodes) = trie.prepare_commit().unwrap();
        let batch = nodes
            .into_iter()
            .map(|(hash, bytes)| BatchOperation::put(trie_node_key(&hash), bytes))
            .collect();
        trie.store.atomic_batch_write(batch).unwrap();
        trie.mark_committed(root);
        root
    }

    #[test]
    fn test_empty_trie_root() {
        let mut trie = new_trie();
        assert_eq!(trie.root_hash().unwrap(), EMPTY_TRIE_ROOT);
        assert_eq!(trie.get(b"missing").unwrap(), None);
    }

    #[test]
    fn test_insert_and_get() {
        let mut trie = new_trie();
        trie.insert(b"dog", b"puppy".to_vec()).unwrap();
        trie.insert(b"doge", b"coin".to_vec()).unwrap();
        trie.insert(b"horse", b"stallion".to_vec()).unwrap();

        assert_eq!(trie.get(b"dog").unwrap(), Some(b"puppy".to_vec()));
        assert_eq!(trie.get(b"doge").unwrap(), Some(b"coin".to_vec()));
        assert_eq!(trie.get(b"horse").unwrap(), Some(b"stallion".to_vec()));
        assert_eq!(trie.get(b"do").unwrap(), None);
        assert_ne!(trie.root_hash().unwrap(), EMPTY_TRIE_ROOT);
    }

    #[test]
    fn test_overwrite_changes_root() {
        let mut trie = new_trie();
        trie.insert(b"key", vec![1]).unwrap();
        let first = trie.root_hash().unwrap();
        trie.insert(b"key", vec![2]).unwrap();
        assert_ne!(trie.root_hash().unwrap(), first);
        assert_eq!(trie.get(b"key").unwrap(), Some(vec![2]));
    }

    #[test]
    fn test_root_independent_of_insertion_order() {
        let keys: [&[u8]; 6] = [b"a", b"ab", b"abc", b"b", b"ba", b"zzzz"];
        let mut forward = new_trie();
        let mut backward = new_trie();
        for key in &keys {
            forward.insert(key, key.to_vec()).unwrap();
        }
        for key in keys.iter().rev() {
            backward.insert(key, key.to_vec()).unwrap();
        }
        assert_eq!(forward.root_hash().unwrap(), backward.root_hash().unwrap());
    }

    #[test]
    fn test_remove_restores_previous_root() {
        let mut trie = new_trie();
        trie.insert(b"abc", vec![1]).unwrap();
        trie.insert(b"abd", vec![2]).unwrap();
        let before = trie.root_hash().unwrap();

        trie.insert(b"ab", vec![3]).unwrap();
        trie.insert(b"x", vec![4]).unwrap();
        assert!(trie.remove(b"ab").unwrap());
        assert!(trie.remove(b"x").unwrap());

        assert_eq!(trie.root_hash().unwrap(), before);
    }

    #[test]
    fn test_remove_missing_key() {
        let mut trie = new_trie();
        trie.insert(b"abc", vec![1]).unwrap();
        assert!(!trie.remove(b"abd").unwrap());
        assert!(!trie.remove(b"ab").unwrap());
        assert!(!trie.remove(b"abcd").unwrap());
        assert_eq!(trie.get(b"abc").unwrap(), Some(vec![1]));
    }

    #[test]
    fn test_remove_all_gives_empty_root() {
        let mut trie = new_trie();
        for i in 0..50u8 {
            trie.insert(&[i, i / 3, 7], vec![i]).unwrap();
        }
        for i in 0..50u8 {
            assert!(trie.remove(&[i, i / 3, 7]).unwrap());
        }
        assert_eq!(trie.root_hash().unwrap(), EMPTY_TRIE_ROOT);
    }

    #[test]
    fn test_commit_then_mutate_from_store() {
        let mut trie = new_trie();
        for i in 0..20u8 {
            trie.insert(&[1, i], vec![i]).unwrap();
        }
        let committed = persist(&mut trie);
        assert_eq!(trie.root_hash().unwrap(), committed);
        assert_eq!(trie.get(&[1, 5]).unwrap(), Some(vec![5]));

        // Mutations walk into hashed subtrees loaded from the store.
        assert!(trie.remove(&[1, 5]).unwrap());
        trie.insert(&[2, 0], vec![9]).unwrap();

        let mut rebuilt = new_trie();
        for i in (0..20u8).filter(|i| *i != 5) {
            rebuilt.insert(&[1, i], vec![i]).unwrap();
        }
        rebuilt.insert(&[2, 0], vec![9]).unwrap();
        assert_eq!(trie.root_hash().unwrap(), rebuilt.root_hash().unwrap());
    }

    #[test]
    fn test_reopen_persisted_root() {
        let mut trie = new_trie();
        trie.insert(b"persisted", vec![42]).unwrap();
        let root = persist(&mut trie);

        let mut reopened = MerkleTrie::open(trie.store.clone(), root);
        assert_eq!(reopened.get(b"persisted").unwrap(), Some(vec![42]));
        assert_eq!(reopened.root_hash().unwrap(), root);
    }

    #[test]
    fn test_missing_node_surfaces() {
        let mut trie = MerkleTrie::open(Arc::new(InMemoryKVStore::new()), [7; 32]);
        assert_eq!(
            trie.insert(b"k", vec![1]),
            Err(TrieError::MissingNode { hash: [7; 32] })
        );
        // The failed mutation leaves the reference in place.
        assert_eq!(trie.root_hash().unwrap(), [7; 32]);
    }

    fn unhashed_nodes(node: &Node) -> usize {
        let own = usize::from(!node.is_hash_known());
        own + match node {
            Node::Extension { child, .. } => unhashed_nodes(child),
            Node::Branch { children, .. } => children.iter().map(unhashed_nodes).sum(),
            _ => 0,
        }
    }

    #[test]
    fn test_root_hash_rehashes_only_changed_path() {
        let mut trie = new_trie();
        for i in 0..2000u32 {
            trie.insert(&i.to_be_bytes(), vec![1]).unwrap();
        }
        let before = trie.root_hash().unwrap();
        assert_eq!(unhashed_nodes(&trie.root), 0);

        // 4-byte keys are 8 nibbles deep.
        trie.insert(&5000u32.to_be_bytes(), vec![2]).unwrap();
        assert!(unhashed_nodes(&trie.root) <= 17);
        assert_ne!(trie.root_hash().unwrap(), before);
        assert_eq!(unhashed_nodes(&trie.root), 0);

        assert!(trie.remove(&7u32.to_be_bytes()).unwrap());
        assert!(unhashed_nodes(&trie.root) <= 17);

        let mut rebuilt = new_trie();
        for i in (0..2000u32).filter(|i| *i != 7) {
            rebuilt.insert(&i.to_be_bytes(), vec![1]).unwrap();
        }
        rebuilt.insert(&5000u32.to_be_bytes(), vec![2]).unwrap();
        assert_eq!(trie.root_hash().unwrap(), rebuilt.root_hash().unwrap());
    }

    #[test]
    fn test_reset_discards_uncommitted() {
        let mut trie = new_trie();
        trie.insert(b"a", vec![1]).unwrap();
        let root = persist(&mut trie);
        trie.insert(b"b", vec![2]).unwrap();
        trie.reset(root);
        assert_eq!(trie.get(b"b").unwrap(), None);
        assert_eq!(trie.root_hash().unwrap(), root);
    }

    mod proptests {
        use super::*;
        use proptest::collection::{btree_map, vec};
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn root_depends_only_on_contents(
                entries in btree_map(vec(any::<u8>(), 0..6), vec(any::<u8>(), 1..4), 0..40),
                removals in vec(any::<prop::sample::Index>(), 0..20),
            ) {
                let keys: Vec<Vec<u8>> = entries.keys().cloned().collect();
                let mut removed = std::collections::BTreeSet::new();
                if !keys.is_empty() {
                    for index in &removals {
                        removed.insert(keys[index.index(keys.len())].clone());
                    }
                }

                let mut mutated = new_trie();
                for (key, value) in entries.iter().rev() {
                    mutated.insert(key, value.clone()).unwrap();
                    mutated.root_hash().unwrap();
                }
                for key in &removed {
                    prop_assert!(mutated.remove(key).unwrap());
                    mutated.root_hash().unwrap();
                }

                let mut direct = new_trie();
                for (key, value) in &entries {
                    if !removed.contains(key) {
                        direct.insert(key, value.clone()).unwrap();
                    }
                }

                prop_assert_eq!(mutated.root_hash().unwrap(), direct.root_hash().unwrap());
            }
        }
    }
}
