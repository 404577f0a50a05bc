use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::errors::IndexerError;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Heights between trie commits in production.
pub const DEFAULT_COMMIT_INTERVAL: u64 = 4096;

/// Upper bound on a single encoded record, guarding against hostile length
/// prefixes.
pub const DEFAULT_MAX_ENCODED_LEN: u64 = 64 * 1024 * 1024;

/// Records fetched per store scan while replaying the repository.
pub const DEFAULT_REPLAY_PAGE_SIZE: usize = 256;

// =============================================================================
// COMMIT HEIGHTS
// =============================================================================

/// Largest multiple of `interval` that is `<= height`.
///
/// # Panics
/// Panics if `interval` is zero. `IndexerConfig::validate` rejects a zero
/// interval for every indexer.
pub fn nearest_commit_height(height: u64, interval: u64) -> u64 {
    height - height % interval
}

/// Whether `height` is a commit boundary.
///
/// # Panics
/// Panics if `interval` is zero.
pub fn is_commit_height(height: u64, interval: u64) -> bool {
    height % interval == 0
}

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Atomic trie indexer configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Heights at multiples of this value are committed (default: 4096).
    pub commit_interval: u64,
    /// Repository records loaded per page during replay.
    pub replay_page_size: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            commit_interval: DEFAULT_COMMIT_INTERVAL,
            replay_page_size: DEFAULT_REPLAY_PAGE_SIZE,
        }
    }
}

impl IndexerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_commit_interval(mut self, commit_interval: u64) -> Self {
        self.commit_interval = commit_interval;
        self
    }

    pub fn with_replay_page_size(mut self, replay_page_size: usize) -> Self {
        self.replay_page_size = replay_page_size;
        self
    }

    pub fn validate(&self) -> Result<(), IndexerError> {
        if self.commit_interval == 0 {
            return Err(IndexerError::InvalidConfig {
                reason: "commit_interval must be greater than zero".to_string(),
            });
        }
        if self.replay_page_size == 0 {
            return Err(IndexerError::InvalidConfig {
                reason: "replay_page_size must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Codec configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Maximum size of any encoded value, in bytes.
    pub max_encoded_len: u64,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_encoded_len: DEFAULT_MAX_ENCODED_LEN,
        }
    }
}

impl CodecConfig {
    pub fn with_max_encoded_len(mut self, max_encoded_len: u64) -> Self {
        self.max_encoded_len = max_encoded_len;
        self
    }
}

// =============================================================================
// CANCELLATION
// =============================================================================

/// Cooperative cancellation flag checked between replayed heights.
///
/// Clones share the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelSignal {
    cancelled: Arc<AtomicBool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
