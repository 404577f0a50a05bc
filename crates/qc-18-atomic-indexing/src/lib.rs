//! # Atomic Operation Indexing (qc-18)
//!
//! Indexes the cross-chain atomic operations accepted at each block into a
//! height-ordered Merkle-Patricia trie, committed every `commit_interval`
//! blocks. Each committed root summarizes every surviving operation up to its
//! height, so state-sync peers can fetch and verify the set by root.
//!
//! ## Data Flow
//!
//! ```text
//! Execution layer ──Write(h, ops)──→ AtomicTxRepository   (atx:{h})
//!        │                                  │
//!        └──────Index(h, ops)──→ ┐          │ IterateFrom (replay)
//!                                ↓          ↓
//!                         AtomicTrieIndexer [working trie]
//!                                │
//!                   h % interval == 0: atomic commit
//!                                ↓
//!              trie nodes + root index + live index + marker
//!                                │
//!        AtomicTrieReader ←──────┘──→ HistoricalIterator
//! ```
//!
//! ## Domain Invariants
//!
//! | ID | Invariant | Description |
//! |----|-----------|-------------|
//! | 1 | Write Once | A repository height is written at most once |
//! | 2 | Monotonic Commits | Committed heights strictly increase by the interval |
//! | 3 | Bounded Window | `Index` accepts only `(last committed, last committed + interval]` |
//! | 4 | Atomic Commit | Roots, live index and marker land in one batch, after the nodes |
//! | 5 | Deterministic Root | Same entries, same root, whatever the insertion order |
//! | 6 | Committed Reads | Readers never observe uncommitted state |
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - Codec, records, errors, config and the Merkle trie
//! - `ports/` - Port traits (inbound API, outbound storage SPI)
//! - `repository` - Height-keyed atomic operation log
//! - `service/` - Indexer service and read-only reader
//! - `iterator` - Historical `(height, AtomicOps)` replay of a root
//! - `adapters/` - In-memory and RocksDB stores
//!
//! ## Usage
//!
//! ```ignore
//! use qc_18_atomic_indexing::{AtomicCodec, AtomicTrieApi, AtomicTrieIndexer, IndexerConfig};
//!
//! let store = Arc::new(InMemoryKVStore::new());
//! let mut indexer = AtomicTrieIndexer::with_store(store, AtomicCodec::default(), IndexerConfig::default())?;
//!
//! indexer.initialize(last_accepted_height, &mut || Ok(()))?;
//! let root = indexer.index(height, &ops)?;
//! ```

pub mod adapters;
pub mod domain;
pub mod iterator;
pub mod ports;
pub mod repository;
pub mod service;

// Re-export key types for convenience
pub use adapters::InMemoryKVStore;
#[cfg(feature = "rocksdb")]
pub use adapters::{RocksDbConfig, RocksDbStore};
pub use domain::codec::{AtomicCodec, CODEC_VERSION};
pub use domain::entities::{CommitMarker, HeightRecord, TrieEntryValue, TrieKey};
pub use domain::errors::{CodecError, IndexerError, KVStoreError, RepositoryError, TrieError};
pub use domain::trie::EMPTY_TRIE_ROOT;
pub use domain::value_objects::{
    is_commit_height, nearest_commit_height, CancelSignal, CodecConfig, IndexerConfig,
    DEFAULT_COMMIT_INTERVAL,
};
pub use iterator::HistoricalIterator;
pub use ports::inbound::{AtomicTrieApi, AtomicTxRepositoryApi, CommitHook};
pub use ports::outbound::{BatchOperation, KeyValueStore};
pub use repository::{AtomicTxRepository, RepositoryIter};
pub use service::{AtomicIndexerDependencies, AtomicTrieIndexer, AtomicTrieReader};
