//! # Atomic Trie Indexer - Initialization
//!
//! Catches the trie up with the execution layer by replaying repository
//! records from the last commit to the commit height at or below the last
//! accepted block.

use super::*;
use crate::domain::value_objects::nearest_commit_height;

impl<S, R> AtomicTrieIndexer<S, R>
where
    S: KeyValueStore,
    R: AtomicTxRepositoryApi,
{
    /// `initialize`, checking `cancel` before every height.
    ///
    /// Any failure, cancellation included, leaves the indexer at its last
    /// successful commit. Calling again resumes from there.
    pub fn initialize_with_cancel(
        &mut self,
        last_accepted_height: u64,
        on_commit: &mut CommitHook<'_>,
        cancel: &CancelSignal,
    ) -> Result<(), IndexerError> {
        self.reset_working_state();
        tracing::info!(
            "[qc-18] Initializing atomic trie (last committed {}, last accepted {})",
            self.last_committed().height,
            last_accepted_height
        );

        let result = self.replay(last_accepted_height, on_commit, cancel);
        match &result {
            Ok(()) => tracing::info!(
                "[qc-18] Atomic trie initialized at height {}",
                self.last_committed().height
            ),
            Err(IndexerError::Cancelled { height }) => {
                tracing::warn!("[qc-18] Atomic trie initialization cancelled at height {}", height);
                self.reset_working_state();
            }
            Err(e) => {
                tracing::warn!("[qc-18] Atomic trie initialization failed: {}", e);
                self.reset_working_state();
            }
        }
        result
    }

    fn replay(
        &mut self,
        last_accepted_height: u64,
        on_commit: &mut CommitHook<'_>,
        cancel: &CancelSignal,
    ) -> Result<(), IndexerError> {
        let interval = self.config.commit_interval;

        let marker = match self.last_committed {
            Some(marker) => marker,
            None => {
                if cancel.is_cancelled() {
                    return Err(IndexerError::Cancelled { height: 0 });
                }
                // Genesis may legitimately carry no atomic operations.
                if let Some(record) = self.repository.read(0)? {
                    self.apply_height(0, &record.batches)?;
                }
                let marker = self.commit_with_hook(0, on_commit)?;
                tracing::info!(
                    "[qc-18] Committed genesis atomic trie (root {})",
                    hex::encode(marker.root)
                );
                marker
            }
        };

        let target = nearest_commit_height(last_accepted_height, interval);
        if marker.height >= target {
            return Ok(());
        }

        let mut records = self.repository.iterate_from(marker.height + 1);
        for height in marker.height + 1..=target {
            if cancel.is_cancelled() {
                return Err(IndexerError::Cancelled { height });
            }
            let record = match records.next() {
                Some(record) => record?,
                None => return Err(IndexerError::MissingReplayData { height }),
            };
            if record.height != height {
                return Err(IndexerError::MissingReplayData { height });
            }

            self.apply_height(height, &record.batches)?;
            if is_commit_height(height, interval) {
                let committed = self.commit_with_hook(height, on_commit)?;
                tracing::info!(
                    "[qc-18] Replayed atomic trie to height {}/{} (root {})",
                    height,
                    target,
                    hex::encode(committed.root)
                );
            }
        }
        Ok(())
    }
}
