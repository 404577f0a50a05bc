//! # Atomic Transaction Repository
//!
//! Append-only, height-keyed log of the atomic operations accepted at each
//! block. It is the replay source when the indexer catches up after a restart.
//!
//! ## Layout
//!
//! ```text
//! atx:{height: u64 BE} -> codec(HeightRecord)
//! ```
//!
//! Big-endian heights make the store's key order the height order, so
//! `iterate_from` is a plain forward scan.

use parking_lot::Mutex;
use shared_types::AtomicOps;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::domain::codec::AtomicCodec;
use crate::domain::entities::{height_from_key, height_key, HeightRecord, ATOMIC_TX_PREFIX};
use crate::domain::errors::{CodecError, RepositoryError};
use crate::domain::value_objects::DEFAULT_REPLAY_PAGE_SIZE;
use crate::ports::inbound::AtomicTxRepositoryApi;
use crate::ports::outbound::KeyValueStore;

/// Write-once store of per-height atomic operations.
pub struct AtomicTxRepository<S: KeyValueStore> {
    store: Arc<S>,
    codec: AtomicCodec,
    page_size: usize,
    /// Serializes the duplicate check with the write that follows it.
    write_lock: Mutex<()>,
}

impl<S: KeyValueStore> AtomicTxRepository<S> {
    pub fn new(store: Arc<S>, codec: AtomicCodec) -> Self {
        Self {
            store,
            codec,
            page_size: DEFAULT_REPLAY_PAGE_SIZE,
            write_lock: Mutex::new(()),
        }
    }

    /// Records fetched per store scan by `iterate_from`.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn codec(&self) -> &AtomicCodec {
        &self.codec
    }

    /// Merge the operations of several transactions accepted at `height`
    /// and write them as one record.
    pub fn write_all<I>(&self, height: u64, transactions: I) -> Result<(), RepositoryError>
    where
        I: IntoIterator<Item = AtomicOps>,
    {
        self.write(height, shared_types::merge_atomic_ops(transactions))
    }
}

impl<S: KeyValueStore> AtomicTxRepositoryApi for AtomicTxRepository<S> {
    type Records = RepositoryIter<S>;

    fn write(&self, height: u64, batches: AtomicOps) -> Result<(), RepositoryError> {
        let key = height_key(ATOMIC_TX_PREFIX, height);
        let bytes = self.codec.encode_record(&HeightRecord::new(height, batches))?;

        let _guard = self.write_lock.lock();
        if self.store.exists(&key)? {
            return Err(RepositoryError::DuplicateHeight { height });
        }
        self.store.put(&key, &bytes)?;
        tracing::trace!("[qc-18] Wrote atomic tx record for height {}", height);
        Ok(())
    }

    fn read(&self, height: u64) -> Result<Option<HeightRecord>, RepositoryError> {
        let key = height_key(ATOMIC_TX_PREFIX, height);
        match self.store.get(&key)? {
            Some(bytes) => Ok(Some(decode_record(&self.codec, &key, &bytes)?)),
            None => Ok(None),
        }
    }

    fn iterate_from(&self, height: u64) -> RepositoryIter<S> {
        RepositoryIter {
            store: Arc::clone(&self.store),
            codec: self.codec,
            page_size: self.page_size,
            next_key: Some(height_key(ATOMIC_TX_PREFIX, height)),
            buffer: VecDeque::new(),
        }
    }
}

fn decode_record(
    codec: &AtomicCodec,
    key: &[u8],
    bytes: &[u8],
) -> Result<HeightRecord, CodecError> {
    let height = height_from_key(ATOMIC_TX_PREFIX, key)?;
    let record = codec.decode_record(bytes)?;
    if record.height != height {
        return Err(CodecError::Decode(format!(
            "record stored at height {} claims height {}",
            height, record.height
        )));
    }
    Ok(record)
}

/// Lazy, ascending scan over repository records.
///
/// Records are fetched a page at a time; no lock is held between pages.
/// The first error is yielded once and ends the scan.
pub struct RepositoryIter<S: KeyValueStore> {
    store: Arc<S>,
    codec: AtomicCodec,
    page_size: usize,
    /// Key to resume the scan from, `None` once the store is exhausted.
    next_key: Option<Vec<u8>>,
    buffer: VecDeque<(Vec<u8>, Vec<u8>)>,
}

impl<S: KeyValueStore> RepositoryIter<S> {
    fn fill(&mut self) -> Result<(), RepositoryError> {
        let Some(start) = self.next_key.take() else {
            return Ok(());
        };
        let page = self
            .store
            .scan_from(ATOMIC_TX_PREFIX, &start, self.page_size)?;
        if page.len() == self.page_size {
            if let Some((last, _)) = page.last() {
                let mut successor = last.clone();
                successor.push(0);
                self.next_key = Some(successor);
            }
        }
        self.buffer.extend(page);
        Ok(())
    }
}

impl<S: KeyValueStore> Iterator for RepositoryIter<S> {
    type Item = Result<HeightRecord, RepositoryError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() {
            if let Err(e) = self.fill() {
                self.next_key = None;
                return Some(Err(e));
            }
        }
        let (key, bytes) = self.buffer.pop_front()?;
        match decode_record(&self.codec, &key, &bytes) {
            Ok(record) => Some(Ok(record)),
            Err(e) => {
                self.next_key = None;
                self.buffer.clear();
                Some(Err(e.into()))
            }
        }
    }
}
