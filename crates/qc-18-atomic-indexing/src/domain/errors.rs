use shared_types::Hash;
use thiserror::Error;

/// Malformed or unsupported serialized data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("unsupported codec version {found}, expected {expected}")]
    UnsupportedVersion { found: u16, expected: u16 },

    #[error("invalid {what} length: expected {expected}, got {actual}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Key-value store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KVStoreError {
    #[error("KV store I/O error: {message}")]
    IOError { message: String },
}

/// Merkle trie errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrieError {
    #[error("missing trie node {}", hex::encode(.hash))]
    MissingNode { hash: Hash },

    #[error("corrupt trie node {}: {reason}", hex::encode(.hash))]
    CorruptNode { hash: Hash, reason: String },

    #[error("trie path of {nibbles} nibbles does not form a byte key")]
    OddKeyLength { nibbles: usize },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] KVStoreError),
}

/// Atomic transaction repository errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("height {height} already written to the atomic tx repository")]
    DuplicateHeight { height: u64 },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] KVStoreError),
}

/// Atomic trie indexer errors.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("height {height} must be after last committed height {last_committed}")]
    HeightNotAfterLastCommitted { height: u64, last_committed: u64 },

    #[error("height {height} not within the next commit height {next_commit}")]
    HeightBeyondNextCommit { height: u64, next_commit: u64 },

    #[error("missing atomic operations for height {height} required for replay")]
    MissingReplayData { height: u64 },

    #[error("height {height} is not a commit height (interval {interval})")]
    NotACommitHeight { height: u64, interval: u64 },

    #[error("atomic trie indexer is not initialized")]
    NotInitialized,

    #[error("unknown trie root {}", hex::encode(.root))]
    UnknownRoot { root: Hash },

    #[error("initialization cancelled before height {height}")]
    Cancelled { height: u64 },

    #[error("commit hook failed at height {height}: {source}")]
    CommitHook {
        height: u64,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("invalid indexer config: {reason}")]
    InvalidConfig { reason: String },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Trie(#[from] TrieError),

    #[error(transparent)]
    Store(#[from] KVStoreError),
}
