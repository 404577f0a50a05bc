//! Shared helpers for the atomic indexing integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use qc_18_atomic_indexing::{
    AtomicCodec, AtomicTrieIndexer, AtomicTxRepository, IndexerConfig, KeyValueStore,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared_types::{AtomicOperationBatch, AtomicOps, ChainId, PutOperation};

pub type Indexer<S> = AtomicTrieIndexer<S, AtomicTxRepository<S>>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub fn random_bytes(rng: &mut StdRng, len: usize) -> Vec<u8> {
    (0..len).map(|_| rng.gen()).collect()
}

/// One to three chains, each with at least one put. Some batches also carry
/// a remove of a key that was never written.
pub fn random_ops(rng: &mut StdRng) -> AtomicOps {
    let mut ops = AtomicOps::new();
    for _ in 0..rng.gen_range(1..=3) {
        let chain_id = ChainId(rng.gen());
        let mut batch = AtomicOperationBatch::default();
        for _ in 0..rng.gen_range(1..=4) {
            let traits = (0..rng.gen_range(0..=2))
                .map(|_| random_bytes(rng, 32))
                .collect();
            let put = PutOperation::new(random_bytes(rng, 32), random_bytes(rng, 64))
                .with_traits(traits);
            batch = batch.with_put(put);
        }
        if rng.gen_bool(0.3) {
            batch = batch.with_remove(random_bytes(rng, 32));
        }
        ops.insert(chain_id, batch);
    }
    ops
}

/// Random operations for every height in `0..=last`.
pub fn random_history(seed: u64, last: u64) -> Vec<AtomicOps> {
    let mut rng = seeded_rng(seed);
    (0..=last).map(|_| random_ops(&mut rng)).collect()
}

/// What the historical iterator reports for `ops`: puts only, in key order.
pub fn surviving_puts(ops: &AtomicOps) -> AtomicOps {
    ops.iter()
        .filter(|(_, batch)| !batch.puts().is_empty())
        .map(|(chain_id, batch)| {
            let mut puts = batch.puts().to_vec();
            puts.sort_by(|a, b| a.key.cmp(&b.key));
            (*chain_id, AtomicOperationBatch::new(puts, Vec::new()))
        })
        .collect()
}

pub fn indexer<S: KeyValueStore>(store: &Arc<S>, interval: u64) -> Indexer<S> {
    AtomicTrieIndexer::with_store(
        Arc::clone(store),
        AtomicCodec::default(),
        IndexerConfig::default().with_commit_interval(interval),
    )
    .unwrap()
}

pub fn no_hook() -> anyhow::Result<()> {
    Ok(())
}
