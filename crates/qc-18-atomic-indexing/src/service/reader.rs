//! # Atomic Trie Reader
//!
//! Read-only access to committed state. Everything it touches (the marker,
//! the root index, content-addressed nodes) is only ever written by an
//! atomic commit, so readers on other threads never see a partial commit.

use shared_types::{ChainId, Hash, PutOperation};
use std::sync::Arc;

use crate::domain::codec::AtomicCodec;
use crate::domain::entities::{
    height_key, CommitMarker, TrieKey, COMMIT_MARKER_KEY, ROOT_INDEX_PREFIX,
};
use crate::domain::errors::{CodecError, IndexerError, TrieError};
use crate::domain::trie::TrieSnapshot;
use crate::domain::value_objects::is_commit_height;
use crate::iterator::HistoricalIterator;
use crate::ports::outbound::KeyValueStore;

/// Cheap, cloneable handle over the committed atomic trie.
pub struct AtomicTrieReader<S: KeyValueStore> {
    store: Arc<S>,
    codec: AtomicCodec,
    commit_interval: u64,
}

impl<S: KeyValueStore> Clone for AtomicTrieReader<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            codec: self.codec,
            commit_interval: self.commit_interval,
        }
    }
}

impl<S: KeyValueStore> AtomicTrieReader<S> {
    pub(crate) fn new(store: Arc<S>, codec: AtomicCodec, commit_interval: u64) -> Self {
        Self {
            store,
            codec,
            commit_interval,
        }
    }

    pub(crate) fn load_marker(&self) -> Result<Option<CommitMarker>, IndexerError> {
        match self.store.get(COMMIT_MARKER_KEY)? {
            Some(bytes) => Ok(Some(self.codec.decode_marker(&bytes)?)),
            None => Ok(None),
        }
    }

    fn require_ready(&self) -> Result<CommitMarker, IndexerError> {
        self.load_marker()?.ok_or(IndexerError::NotInitialized)
    }

    /// Last durable commit, or the zero marker before genesis.
    pub fn last_committed(&self) -> Result<CommitMarker, IndexerError> {
        Ok(self.load_marker()?.unwrap_or_else(CommitMarker::uncommitted))
    }

    /// Root committed at exactly `height`.
    ///
    /// ## Errors
    ///
    /// - `NotInitialized`: nothing has been committed
    /// - `NotACommitHeight`: `height` is off the interval grid or was never
    ///   committed
    pub fn root(&self, height: u64) -> Result<Hash, IndexerError> {
        self.require_ready()?;
        let not_committed = IndexerError::NotACommitHeight {
            height,
            interval: self.commit_interval,
        };
        if !is_commit_height(height, self.commit_interval) {
            return Err(not_committed);
        }

        let Some(bytes) = self.store.get(&height_key(ROOT_INDEX_PREFIX, height))? else {
            return Err(not_committed);
        };
        let root: Hash = bytes.as_slice().try_into().map_err(|_| CodecError::InvalidLength {
            what: "root hash",
            expected: 32,
            actual: bytes.len(),
        })?;
        Ok(root)
    }

    /// Ordered `(height, AtomicOps)` history of the snapshot at `root`.
    pub fn iterator(&self, root: Hash) -> Result<HistoricalIterator<S>, IndexerError> {
        self.require_ready()?;
        let snapshot = self.snapshot(root)?;
        Ok(HistoricalIterator::new(snapshot.iter(), self.codec))
    }

    /// Point lookup of the put stored at `(height, chain_id, key)` in the
    /// snapshot at `root`.
    pub fn get(
        &self,
        root: Hash,
        height: u64,
        chain_id: ChainId,
        key: &[u8],
    ) -> Result<Option<PutOperation>, IndexerError> {
        self.require_ready()?;
        let snapshot = self.snapshot(root)?;
        let trie_key = TrieKey::new(height, chain_id, key.to_vec()).encode();
        match snapshot.get(&trie_key)? {
            Some(bytes) => {
                let entry = self.codec.decode_entry_value(&bytes)?;
                Ok(Some(entry.into_put(key.to_vec())))
            }
            None => Ok(None),
        }
    }

    fn snapshot(&self, root: Hash) -> Result<TrieSnapshot<S>, IndexerError> {
        TrieSnapshot::open(Arc::clone(&self.store), root).map_err(|e| match e {
            TrieError::MissingNode { hash } if hash == root => IndexerError::UnknownRoot { root },
            other => other.into(),
        })
    }
}
