//! # Atomic Trie Indexer Service
//!
//! The single-writer service implementing `AtomicTrieApi`.
//!
//! ## Architecture
//!
//! This service:
//! 1. Applies each height's puts and removes to a working Merkle trie
//! 2. Commits the trie on every commit-interval boundary, in one atomic write
//! 3. Replays the repository on `initialize` to catch up after a restart
//! 4. Hands out `AtomicTrieReader`s that only ever see committed state
//!
//! ## State
//!
//! ```text
//! Uninitialized ──Index(0) / Initialize──→ Ready
//!      (no commit marker)                  (marker persisted)
//! ```

mod commit;
mod reader;
mod replay;

pub use reader::AtomicTrieReader;

use shared_types::{AtomicOps, ChainId, Hash};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::codec::AtomicCodec;
use crate::domain::entities::{
    live_key, live_key_prefix, CommitMarker, TrieEntryValue, TrieKey,
};
use crate::domain::errors::{CodecError, IndexerError};
use crate::domain::trie::{MerkleTrie, EMPTY_TRIE_ROOT};
use crate::domain::value_objects::{is_commit_height, CancelSignal, IndexerConfig};
use crate::iterator::HistoricalIterator;
use crate::ports::inbound::{AtomicTrieApi, AtomicTxRepositoryApi, CommitHook};
use crate::ports::outbound::KeyValueStore;
use crate::repository::AtomicTxRepository;

/// Dependencies for AtomicTrieIndexer
pub struct AtomicIndexerDependencies<S, R> {
    /// Store holding trie nodes, roots, the live-key index and the marker.
    pub store: Arc<S>,
    /// Replay source for `initialize`.
    pub repository: Arc<R>,
    pub codec: AtomicCodec,
}

/// The Atomic Trie Indexer.
///
/// Owns the trie's working state. `index` and `initialize` take `&mut self`;
/// concurrent readers go through `reader()`.
pub struct AtomicTrieIndexer<S, R>
where
    S: KeyValueStore,
    R: AtomicTxRepositoryApi,
{
    pub(crate) store: Arc<S>,
    pub(crate) repository: Arc<R>,
    pub(crate) codec: AtomicCodec,
    pub(crate) config: IndexerConfig,
    /// Working trie, positioned at the last commit plus uncommitted heights.
    pub(crate) trie: MerkleTrie<S>,
    /// Uncommitted live-index changes: `true` adds the key, `false` drops it.
    pub(crate) live: BTreeMap<Vec<u8>, bool>,
    pub(crate) last_committed: Option<CommitMarker>,
    pub(crate) reader: AtomicTrieReader<S>,
}

impl<S, R> AtomicTrieIndexer<S, R>
where
    S: KeyValueStore,
    R: AtomicTxRepositoryApi,
{
    /// Create an indexer over existing stores.
    ///
    /// A persisted commit marker puts the indexer straight into the ready
    /// state, positioned at the marker's root.
    pub fn new(
        deps: AtomicIndexerDependencies<S, R>,
        config: IndexerConfig,
    ) -> Result<Self, IndexerError> {
        config.validate()?;

        let reader = AtomicTrieReader::new(
            Arc::clone(&deps.store),
            deps.codec,
            config.commit_interval,
        );
        let last_committed = reader.load_marker()?;
        let trie = match last_committed {
            Some(marker) => MerkleTrie::open(Arc::clone(&deps.store), marker.root),
            None => MerkleTrie::new(Arc::clone(&deps.store)),
        };

        match last_committed {
            Some(marker) => tracing::info!(
                "[qc-18] Atomic trie resumed at height {} (root {})",
                marker.height,
                hex::encode(marker.root)
            ),
            None => tracing::info!("[qc-18] Atomic trie has no commits yet"),
        }

        Ok(Self {
            store: deps.store,
            repository: deps.repository,
            codec: deps.codec,
            config,
            trie,
            live: BTreeMap::new(),
            last_committed,
            reader,
        })
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Cloneable read-only handle over committed state.
    pub fn reader(&self) -> AtomicTrieReader<S> {
        self.reader.clone()
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// Discard uncommitted heights and return to the last commit.
    pub(crate) fn reset_working_state(&mut self) {
        let root = self
            .last_committed
            .map(|marker| marker.root)
            .unwrap_or(EMPTY_TRIE_ROOT);
        if !self.live.is_empty() {
            tracing::warn!(
                "[qc-18] Discarding {} uncommitted live-index changes",
                self.live.len()
            );
        }
        self.trie.reset(root);
        self.live.clear();
    }

    /// Apply one height's operations to the working trie.
    ///
    /// Chains are visited in ascending id order. Within a chain, puts land
    /// before removes, so a remove also deletes a same-height put.
    pub(crate) fn apply_height(&mut self, height: u64, batches: &AtomicOps) -> Result<(), IndexerError> {
        for (chain_id, batch) in batches {
            for put in batch.puts() {
                let key = TrieKey::new(height, *chain_id, put.key.clone()).encode();
                let value = self.codec.encode_entry_value(&TrieEntryValue::from_put(put))?;
                self.trie.insert(&key, value)?;
                self.live.insert(live_key(chain_id, &put.key, height), true);
            }
            for remove_key in batch.removes() {
                self.remove_live(height, chain_id, remove_key)?;
            }
        }
        Ok(())
    }

    /// Delete every live entry of `(chain_id, op_key)` at or below `height`.
    fn remove_live(&mut self, height: u64, chain_id: &ChainId, op_key: &[u8]) -> Result<(), IndexerError> {
        for live_height in self.live_heights(chain_id, op_key)? {
            if live_height > height {
                continue;
            }
            let key = TrieKey::new(live_height, *chain_id, op_key.to_vec()).encode();
            self.trie.remove(&key)?;
            self.live.insert(live_key(chain_id, op_key, live_height), false);
        }
        Ok(())
    }

    /// Heights holding a live entry for `(chain_id, op_key)`: the persisted
    /// index overlaid with uncommitted changes.
    fn live_heights(&self, chain_id: &ChainId, op_key: &[u8]) -> Result<Vec<u64>, IndexerError> {
        let prefix = live_key_prefix(chain_id, op_key);
        let mut present: BTreeMap<Vec<u8>, bool> = self
            .store
            .prefix_scan(&prefix)?
            .into_iter()
            .map(|(key, _)| (key, true))
            .collect();
        for (key, is_live) in self.live.range(prefix.clone()..) {
            if !key.starts_with(&prefix) {
                break;
            }
            present.insert(key.clone(), *is_live);
        }

        present
            .into_iter()
            .filter(|(_, is_live)| *is_live)
            .map(|(key, _)| live_height_suffix(&key, prefix.len()))
            .collect()
    }
}

fn live_height_suffix(key: &[u8], prefix_len: usize) -> Result<u64, IndexerError> {
    let suffix: [u8; 8] = key[prefix_len..]
        .try_into()
        .map_err(|_| CodecError::InvalidLength {
            what: "live index key",
            expected: prefix_len + 8,
            actual: key.len(),
        })?;
    Ok(u64::from_be_bytes(suffix))
}

impl<S: KeyValueStore> AtomicTrieIndexer<S, AtomicTxRepository<S>> {
    /// Indexer and repository sharing one store.
    pub fn with_store(store: Arc<S>, codec: AtomicCodec, config: IndexerConfig) -> Result<Self, IndexerError> {
        let repository = AtomicTxRepository::new(Arc::clone(&store), codec)
            .with_page_size(config.replay_page_size);
        Self::new(
            AtomicIndexerDependencies {
                store,
                repository: Arc::new(repository),
                codec,
            },
            config,
        )
    }
}

impl<S, R> AtomicTrieApi for AtomicTrieIndexer<S, R>
where
    S: KeyValueStore,
    R: AtomicTxRepositoryApi,
{
    type Iter = HistoricalIterator<S>;

    fn initialize(
        &mut self,
        last_accepted_height: u64,
        on_commit: &mut CommitHook<'_>,
    ) -> Result<(), IndexerError> {
        self.initialize_with_cancel(last_accepted_height, on_commit, &CancelSignal::new())
    }

    fn index(&mut self, height: u64, batches: &AtomicOps) -> Result<Hash, IndexerError> {
        self.check_index_height(height)?;
        if let Err(e) = self.apply_height(height, batches) {
            tracing::warn!("[qc-18] Indexing height {} failed: {}", height, e);
            self.reset_working_state();
            return Err(e);
        }

        if is_commit_height(height, self.config.commit_interval) {
            let staged = self.stage_commit(height)?;
            let marker = self.write_commit(staged)?;
            tracing::debug!(
                "[qc-18] Committed atomic trie at height {} (root {})",
                height,
                hex::encode(marker.root)
            );
            return Ok(marker.root);
        }
        Ok(self.trie.root_hash()?)
    }

    fn last_committed(&self) -> CommitMarker {
        self.last_committed.unwrap_or_else(CommitMarker::uncommitted)
    }

    fn root(&self, height: u64) -> Result<Hash, IndexerError> {
        self.require_ready()?;
        self.reader.root(height)
    }

    fn iterator(&self, root: Hash) -> Result<HistoricalIterator<S>, IndexerError> {
        self.require_ready()?;
        self.reader.iterator(root)
    }
}

impl<S, R> AtomicTrieIndexer<S, R>
where
    S: KeyValueStore,
    R: AtomicTxRepositoryApi,
{
    fn require_ready(&self) -> Result<CommitMarker, IndexerError> {
        self.last_committed.ok_or(IndexerError::NotInitialized)
    }

    fn check_index_height(&self, height: u64) -> Result<(), IndexerError> {
        let Some(marker) = self.last_committed else {
            // Only the genesis index may run before the first commit.
            return if height == 0 {
                Ok(())
            } else {
                Err(IndexerError::NotInitialized)
            };
        };
        if height <= marker.height {
            return Err(IndexerError::HeightNotAfterLastCommitted {
                height,
                last_committed: marker.height,
            });
        }
        let next_commit = marker.height.saturating_add(self.config.commit_interval);
        if height > next_commit {
            return Err(IndexerError::HeightBeyondNextCommit { height, next_commit });
        }
        Ok(())
    }
}
