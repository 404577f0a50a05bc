//! # Atomic Trie Indexer - Commits
//!
//! A commit is staged without touching the working state, then written in
//! two parts:
//!
//! ```text
//! nodes:  trie:{hash}          -> node          (every node not yet persisted)
//! batch:  live:{chain,key,h}   -> ""            (add) / delete (drop)
//!         root:{height}        -> root hash
//!         meta:last_committed  -> CommitMarker
//! ```
//!
//! Trie nodes are content-addressed and unreachable until the marker moves,
//! so they may land ahead of the batch. `index` writes both parts in one
//! atomic write. Replay writes the nodes, runs `onCommit`, then writes the
//! batch. Only after the batch succeeds does the working state collapse onto
//! the new root, so a failed write can simply be retried.

use super::*;
use crate::domain::entities::{height_key, trie_node_key, COMMIT_MARKER_KEY, ROOT_INDEX_PREFIX};
use crate::ports::outbound::BatchOperation;

/// A commit ready to be written.
pub(crate) struct StagedCommit {
    pub(crate) marker: CommitMarker,
    /// New trie nodes.
    pub(crate) nodes: Vec<BatchOperation>,
    /// Live-index changes, the root index entry and the marker.
    pub(crate) batch: Vec<BatchOperation>,
}

impl<S, R> AtomicTrieIndexer<S, R>
where
    S: KeyValueStore,
    R: AtomicTxRepositoryApi,
{
    pub(crate) fn stage_commit(&self, height: u64) -> Result<StagedCommit, IndexerError> {
        let (root, nodes) = self.trie.prepare_commit()?;
        let marker = CommitMarker::new(root, height);

        let nodes = nodes
            .into_iter()
            .map(|(hash, bytes)| BatchOperation::put(trie_node_key(&hash), bytes))
            .collect();

        let mut batch = Vec::with_capacity(self.live.len() + 2);
        batch.extend(self.live.iter().map(|(key, is_live)| {
            if *is_live {
                BatchOperation::put(key.clone(), Vec::new())
            } else {
                BatchOperation::delete(key.clone())
            }
        }));
        batch.push(BatchOperation::put(
            height_key(ROOT_INDEX_PREFIX, height),
            root.to_vec(),
        ));
        batch.push(BatchOperation::put(
            COMMIT_MARKER_KEY.to_vec(),
            self.codec.encode_marker(&marker)?,
        ));

        Ok(StagedCommit {
            marker,
            nodes,
            batch,
        })
    }

    /// Persist the staged trie nodes ahead of the rest of the commit.
    pub(crate) fn write_nodes(&self, staged: &mut StagedCommit) -> Result<(), IndexerError> {
        let nodes = std::mem::take(&mut staged.nodes);
        if !nodes.is_empty() {
            self.store.atomic_batch_write(nodes)?;
        }
        Ok(())
    }

    /// Persist whatever remains of a staged commit and advance the marker.
    pub(crate) fn write_commit(&mut self, staged: StagedCommit) -> Result<CommitMarker, IndexerError> {
        let StagedCommit {
            marker,
            mut nodes,
            batch,
        } = staged;
        nodes.extend(batch);
        self.store.atomic_batch_write(nodes)?;

        self.trie.mark_committed(marker.root);
        self.live.clear();
        self.last_committed = Some(marker);
        Ok(marker)
    }

    /// Stage and write the trie nodes, run the durability hook, then write
    /// the marker batch.
    ///
    /// On any failure the rest of the staged commit is dropped and the
    /// working state is reset to the previous marker. Nodes already written
    /// stay unreferenced.
    pub(crate) fn commit_with_hook(
        &mut self,
        height: u64,
        on_commit: &mut CommitHook<'_>,
    ) -> Result<CommitMarker, IndexerError> {
        let result = self.stage_commit(height).and_then(|mut staged| {
            self.write_nodes(&mut staged)?;
            on_commit().map_err(|e| IndexerError::CommitHook {
                height,
                source: e.into(),
            })?;
            self.write_commit(staged)
        });

        if let Err(e) = &result {
            tracing::warn!("[qc-18] Commit at height {} failed: {}", height, e);
            self.reset_working_state();
        }
        result
    }
}
