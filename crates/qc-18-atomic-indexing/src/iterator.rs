//! # Historical Iterator
//!
//! Replays a committed snapshot as the per-height operations that built it.
//!
//! Trie keys lead with the big-endian height, so the snapshot's key order is
//! already height order. Consecutive entries sharing a height are grouped
//! into one `AtomicOps`.

use shared_types::{AtomicOperationBatch, AtomicOps};

use crate::domain::codec::AtomicCodec;
use crate::domain::entities::{TrieEntryValue, TrieKey};
use crate::domain::errors::IndexerError;
use crate::domain::trie::TrieIter;
use crate::ports::outbound::KeyValueStore;

/// Forward-only `(height, AtomicOps)` stream over a committed root.
///
/// Batches hold the surviving puts only. A fault ends the stream; check
/// `error()` once iteration stops.
pub struct HistoricalIterator<S: KeyValueStore> {
    entries: TrieIter<S>,
    codec: AtomicCodec,
    /// First entry of the next height, read while closing the current group.
    pending: Option<(TrieKey, TrieEntryValue)>,
    error: Option<IndexerError>,
}

impl<S: KeyValueStore> HistoricalIterator<S> {
    pub(crate) fn new(entries: TrieIter<S>, codec: AtomicCodec) -> Self {
        Self {
            entries,
            codec,
            pending: None,
            error: None,
        }
    }

    /// The fault that ended iteration, if any.
    pub fn error(&self) -> Option<&IndexerError> {
        self.error.as_ref()
    }

    fn decode(&self, key: &[u8], value: &[u8]) -> Result<(TrieKey, TrieEntryValue), IndexerError> {
        let key = TrieKey::decode(key)?;
        let value = self.codec.decode_entry_value(value)?;
        Ok((key, value))
    }

    fn next_entry(&mut self) -> Option<(TrieKey, TrieEntryValue)> {
        if self.error.is_some() {
            return None;
        }
        let decoded = match self.entries.next()? {
            Ok((key, value)) => self.decode(&key, &value),
            Err(e) => Err(e.into()),
        };
        match decoded {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("[qc-18] Historical iteration stopped: {}", e);
                self.error = Some(e);
                None
            }
        }
    }
}

fn push_entry(ops: &mut AtomicOps, key: TrieKey, value: TrieEntryValue) {
    let put = value.into_put(key.op_key);
    ops.entry(key.chain_id)
        .or_default()
        .extend(AtomicOperationBatch::new(vec![put], Vec::new()));
}

impl<S: KeyValueStore> Iterator for HistoricalIterator<S> {
    type Item = (u64, AtomicOps);

    fn next(&mut self) -> Option<Self::Item> {
        let (key, value) = match self.pending.take() {
            Some(entry) => entry,
            None => self.next_entry()?,
        };
        let height = key.height;
        let mut ops = AtomicOps::new();
        push_entry(&mut ops, key, value);

        while let Some((key, value)) = self.next_entry() {
            if key.height != height {
                self.pending = Some((key, value));
                break;
            }
            push_entry(&mut ops, key, value);
        }

        // A partial group is never yielded.
        if self.error.is_some() {
            return None;
        }
        Some((height, ops))
    }
}
