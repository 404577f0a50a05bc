//! # Atomic Trie Indexer Scenarios (qc-18)
//!
//! End-to-end behaviour of the repository and indexer over a shared store.
//!
//! ## Test Categories
//!
//! 1. **Genesis** - initialization with and without a genesis record
//! 2. **Replay** - catching up from the repository, resuming after restarts
//! 3. **Sequencing** - commit cadence, window errors, committed roots
//! 4. **Readers** - concurrent readers during indexing

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use common::*;
use qc_18_atomic_indexing::{
    AtomicTrieApi, AtomicTxRepositoryApi, CommitMarker, InMemoryKVStore, EMPTY_TRIE_ROOT,
};
use shared_types::{AtomicOps, Hash, ZERO_HASH};

// =============================================================================
// TEST HELPERS
// =============================================================================

fn write_history(indexer: &Indexer<InMemoryKVStore>, history: &[AtomicOps]) {
    for (height, ops) in history.iter().enumerate() {
        indexer
            .repository()
            .write(height as u64, ops.clone())
            .unwrap();
    }
}

fn assert_history(indexer: &Indexer<InMemoryKVStore>, root: Hash, expected: &[AtomicOps]) {
    let mut iter = indexer.iterator(root).unwrap();
    let mut count = 0;
    for (height, ops) in iter.by_ref() {
        assert_eq!(height, count as u64);
        assert_eq!(ops, surviving_puts(&expected[count]), "height {}", height);
        count += 1;
    }
    assert!(iter.error().is_none());
    assert_eq!(count, expected.len());
}

// =============================================================================
// GENESIS
// =============================================================================

#[test]
fn test_initialize_genesis() {
    init_tracing();
    let store = Arc::new(InMemoryKVStore::new());
    let mut indexer = indexer(&store, 10);
    let history = random_history(1, 0);
    write_history(&indexer, &history);

    indexer.initialize(0, &mut no_hook).unwrap();

    let marker = indexer.last_committed();
    assert_eq!(marker.height, 0);
    assert_ne!(marker.root, EMPTY_TRIE_ROOT);
    assert_eq!(indexer.root(0).unwrap(), marker.root);
    assert_history(&indexer, marker.root, &history);
}

#[test]
fn test_initialize_genesis_without_record() {
    let store = Arc::new(InMemoryKVStore::new());
    let mut indexer = indexer(&store, 10);

    indexer.initialize(0, &mut no_hook).unwrap();

    assert_eq!(
        indexer.last_committed(),
        CommitMarker::new(EMPTY_TRIE_ROOT, 0)
    );
    assert_eq!(indexer.iterator(EMPTY_TRIE_ROOT).unwrap().count(), 0);
}

#[test]
fn test_initialize_genesis_plus_one() {
    let store = Arc::new(InMemoryKVStore::new());
    let mut indexer = indexer(&store, 10);
    let history = random_history(2, 1);
    write_history(&indexer, &history);

    indexer.initialize(1, &mut no_hook).unwrap();
    let genesis = indexer.last_committed();
    assert_eq!(genesis.height, 0);
    assert_history(&indexer, genesis.root, &history[..1]);

    // Height 1 is indexed but stays uncommitted.
    let working = indexer.index(1, &history[1]).unwrap();
    assert_ne!(working, genesis.root);
    assert_eq!(indexer.last_committed(), genesis);
}

// =============================================================================
// REPLAY
// =============================================================================

#[test]
fn test_initialize_then_iterate_from_fresh_indexer() {
    init_tracing();
    let store = Arc::new(InMemoryKVStore::new());
    let history = random_history(3, 1000);
    {
        let mut indexer = indexer(&store, 10);
        write_history(&indexer, &history);
        let mut commits = 0;
        let mut counting_hook = || -> anyhow::Result<()> {
            commits += 1;
            Ok(())
        };
        indexer.initialize(1000, &mut counting_hook).unwrap();
        // Genesis plus one commit per interval.
        assert_eq!(commits, 101);
    }

    let indexer = indexer(&store, 10);
    let marker = indexer.last_committed();
    assert_eq!(marker.height, 1000);
    assert_eq!(indexer.root(1000).unwrap(), marker.root);
    assert_history(&indexer, marker.root, &history);
}

#[test]
fn test_initialize_from_indexed_state() {
    let history = random_history(4, 45);

    // Live indexing to height 25 commits 0, 10 and 20.
    let store = Arc::new(InMemoryKVStore::new());
    {
        let mut indexer = indexer(&store, 10);
        write_history(&indexer, &history);
        for (height, ops) in history.iter().enumerate().take(26) {
            indexer.index(height as u64, ops).unwrap();
        }
        assert_eq!(indexer.last_committed().height, 20);
    }

    // Restart: heights 21..=25 were never committed and are replayed.
    let mut resumed = indexer(&store, 10);
    assert_eq!(resumed.last_committed().height, 20);
    resumed.initialize(45, &mut no_hook).unwrap();
    assert_eq!(resumed.last_committed().height, 40);

    // A node that replays everything from scratch agrees on every root.
    let fresh_store = Arc::new(InMemoryKVStore::new());
    let mut fresh = indexer(&fresh_store, 10);
    write_history(&fresh, &history);
    fresh.initialize(45, &mut no_hook).unwrap();
    for height in [0, 10, 20, 30, 40] {
        assert_eq!(resumed.root(height).unwrap(), fresh.root(height).unwrap());
    }
    assert_history(&resumed, resumed.last_committed().root, &history[..41]);
}

#[test]
fn test_initialize_resumes_as_repository_grows() {
    let store = Arc::new(InMemoryKVStore::new());
    let history = random_history(5, 120);
    let mut indexer = indexer(&store, 16);

    write_history(&indexer, &history[..=50]);
    indexer.initialize(50, &mut no_hook).unwrap();
    assert_eq!(indexer.last_committed().height, 48);

    for (height, ops) in history.iter().enumerate().skip(51) {
        indexer.repository().write(height as u64, ops.clone()).unwrap();
    }
    indexer.initialize(120, &mut no_hook).unwrap();
    assert_eq!(indexer.last_committed().height, 112);

    // Initializing again at the same height is a no-op.
    let root = indexer.last_committed().root;
    indexer.initialize(120, &mut no_hook).unwrap();
    assert_eq!(indexer.last_committed(), CommitMarker::new(root, 112));
    assert_history(&indexer, root, &history[..=112]);
}

// =============================================================================
// SEQUENCING
// =============================================================================

#[test]
fn test_indexer_write_and_read() {
    let store = Arc::new(InMemoryKVStore::new());
    let mut indexer = indexer(&store, 100);
    let history = random_history(6, 205);

    let mut committed = Vec::new();
    for (height, ops) in history.iter().enumerate() {
        let root = indexer.index(height as u64, ops).unwrap();
        if height % 100 == 0 {
            committed.push((height as u64, root));
        }
    }
    assert_eq!(committed.len(), 3);
    assert_eq!(indexer.last_committed().height, 200);

    for (height, root) in &committed {
        assert_eq!(indexer.root(*height).unwrap(), *root);
        assert_history(&indexer, *root, &history[..=*height as usize]);
    }

    let err = indexer.index(10, &history[10]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "height 10 must be after last committed height 200"
    );
    let err = indexer.index(301, &history[10]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "height 301 not within the next commit height 300"
    );
}

#[test]
fn test_reset_to_last_committed_on_restart() {
    let store = Arc::new(InMemoryKVStore::new());
    let history = random_history(7, 15);
    let committed = {
        let mut indexer = indexer(&store, 10);
        for (height, ops) in history.iter().enumerate() {
            indexer.index(height as u64, ops).unwrap();
        }
        indexer.last_committed()
    };

    let mut restarted = indexer(&store, 10);
    assert_eq!(restarted.last_committed(), committed);
    // Heights 11..=15 were never committed, so 11 is accepted again.
    assert!(restarted.index(11, &history[11]).is_ok());
}

// =============================================================================
// READERS
// =============================================================================

#[test]
fn test_readers_only_observe_commits() {
    let store = Arc::new(InMemoryKVStore::new());
    let mut indexer = indexer(&store, 10);
    let history = random_history(8, 200);
    let reader = indexer.reader();
    let done = AtomicBool::new(false);

    std::thread::scope(|scope| {
        for _ in 0..3 {
            let reader = reader.clone();
            let done = &done;
            scope.spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    let marker = reader.last_committed().unwrap();
                    if marker.root == ZERO_HASH {
                        continue;
                    }
                    assert_eq!(marker.height % 10, 0);
                    assert_eq!(reader.root(marker.height).unwrap(), marker.root);
                    let heights = reader.iterator(marker.root).unwrap().count() as u64;
                    assert_eq!(heights, marker.height + 1);
                }
            });
        }

        for (height, ops) in history.iter().enumerate() {
            indexer.index(height as u64, ops).unwrap();
        }
        done.store(true, Ordering::SeqCst);
    });

    assert_eq!(reader.last_committed().unwrap().height, 200);
}
