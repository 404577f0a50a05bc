//! # Atomic Codec
//!
//! Canonical binary encoding of atomic operations and indexer records.
//!
//! ## Format
//!
//! ```text
//! [version: u16 BE][bincode payload: fixint, big-endian, u64 length prefixes]
//! ```
//!
//! Maps are `BTreeMap`s and therefore encoded in key order, so a logical
//! value always produces the same bytes. Trailing bytes are rejected.

use bincode::Options;
use serde::{de::DeserializeOwned, Serialize};
use shared_types::{AtomicOperationBatch, AtomicOps};

use super::entities::{CommitMarker, HeightRecord, TrieEntryValue};
use super::errors::CodecError;
use super::value_objects::CodecConfig;

/// Current encoding version.
pub const CODEC_VERSION: u16 = 0;

const VERSION_LEN: usize = 2;

/// Explicit codec value handed to the repository and the indexer.
#[derive(Clone, Copy, Debug, Default)]
pub struct AtomicCodec {
    config: CodecConfig,
}

impl AtomicCodec {
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    fn options(&self) -> impl Options {
        bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .with_big_endian()
            .with_limit(self.config.max_encoded_len)
            .reject_trailing_bytes()
    }

    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        let payload = self
            .options()
            .serialize(value)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        let mut bytes = Vec::with_capacity(VERSION_LEN + payload.len());
        bytes.extend_from_slice(&CODEC_VERSION.to_be_bytes());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        if bytes.len() < VERSION_LEN {
            return Err(CodecError::InvalidLength {
                what: "codec version",
                expected: VERSION_LEN,
                actual: bytes.len(),
            });
        }
        let (version, payload) = bytes.split_at(VERSION_LEN);
        let version = u16::from_be_bytes([version[0], version[1]]);
        if version != CODEC_VERSION {
            return Err(CodecError::UnsupportedVersion {
                found: version,
                expected: CODEC_VERSION,
            });
        }
        self.options()
            .deserialize(payload)
            .map_err(|e| CodecError::Decode(e.to_string()))
    }

    pub fn encode_batch(&self, batch: &AtomicOperationBatch) -> Result<Vec<u8>, CodecError> {
        self.encode(batch)
    }

    pub fn decode_batch(&self, bytes: &[u8]) -> Result<AtomicOperationBatch, CodecError> {
        self.decode(bytes)
    }

    pub fn encode_ops(&self, ops: &AtomicOps) -> Result<Vec<u8>, CodecError> {
        self.encode(ops)
    }

    pub fn decode_ops(&self, bytes: &[u8]) -> Result<AtomicOps, CodecError> {
        self.decode(bytes)
    }

    pub fn encode_record(&self, record: &HeightRecord) -> Result<Vec<u8>, CodecError> {
        self.encode(record)
    }

    pub fn decode_record(&self, bytes: &[u8]) -> Result<HeightRecord, CodecError> {
        self.decode(bytes)
    }

    pub fn encode_entry_value(&self, value: &TrieEntryValue) -> Result<Vec<u8>, CodecError> {
        self.encode(value)
    }

    pub fn decode_entry_value(&self, bytes: &[u8]) -> Result<TrieEntryValue, CodecError> {
        self.decode(bytes)
    }

    pub fn encode_marker(&self, marker: &CommitMarker) -> Result<Vec<u8>, CodecError> {
        self.encode(marker)
    }

    pub fn decode_marker(&self, bytes: &[u8]) -> Result<CommitMarker, CodecError> {
        self.decode(bytes)
    }
}
