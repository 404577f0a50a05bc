//! # Inbound Ports (Driving Ports)
//!
//! The public API of the Atomic Indexing subsystem.

use shared_types::{AtomicOps, Hash};

use crate::domain::entities::{CommitMarker, HeightRecord};
use crate::domain::errors::{IndexerError, RepositoryError};

/// Durability hook invoked once per commit during initialization.
pub type CommitHook<'a> = dyn FnMut() -> anyhow::Result<()> + 'a;

/// Write-once, height-keyed log of atomic operations.
pub trait AtomicTxRepositoryApi {
    type Records: Iterator<Item = Result<HeightRecord, RepositoryError>>;

    /// Persist the operations accepted at `height`.
    ///
    /// ## Errors
    ///
    /// - `DuplicateHeight`: a record already exists at `height`
    fn write(&self, height: u64, batches: AtomicOps) -> Result<(), RepositoryError>;

    /// Point lookup of the record at `height`.
    fn read(&self, height: u64) -> Result<Option<HeightRecord>, RepositoryError>;

    /// Records at heights `>= height`, ascending. Lazy and restartable.
    fn iterate_from(&self, height: u64) -> Self::Records;
}

/// Commit-interval driven indexer of atomic operations.
///
/// `index` and `initialize` must be driven by a single writer; reads only
/// ever observe committed state.
pub trait AtomicTrieApi {
    type Iter: Iterator<Item = (u64, AtomicOps)>;

    /// Replay repository records up to the commit height at or below
    /// `last_accepted_height`. At each commit the new trie nodes are written,
    /// then `on_commit` runs, then the marker moves.
    ///
    /// ## Errors
    ///
    /// - `MissingReplayData`: the repository has a gap in the replay range
    /// - `CommitHook`: `on_commit` failed; the marker is unchanged
    fn initialize(
        &mut self,
        last_accepted_height: u64,
        on_commit: &mut CommitHook<'_>,
    ) -> Result<(), IndexerError>;

    /// Index one block's operations; commits on interval boundaries.
    ///
    /// Returns the committed root on a boundary, otherwise the working root.
    ///
    /// ## Errors
    ///
    /// - `HeightNotAfterLastCommitted`: `height <= last committed`
    /// - `HeightBeyondNextCommit`: `height > last committed + interval`
    /// - `NotInitialized`: nothing committed and `height != 0`
    /// - `Trie` / `Store` while applying operations: uncommitted heights are
    ///   discarded and `initialize` must replay them
    fn index(&mut self, height: u64, batches: &AtomicOps) -> Result<Hash, IndexerError>;

    /// Last durable commit, or the zero marker before genesis.
    fn last_committed(&self) -> CommitMarker;

    /// Root committed at exactly `height`.
    fn root(&self, height: u64) -> Result<Hash, IndexerError>;

    /// Ordered history of the snapshot at `root`.
    fn iterator(&self, root: Hash) -> Result<Self::Iter, IndexerError>;
}
