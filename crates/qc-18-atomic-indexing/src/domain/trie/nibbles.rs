use serde::{Deserialize, Serialize};

use crate::domain::errors::TrieError;

// =============================================================================
// NIBBLES: Half-byte path representation
// =============================================================================

/// Nibble path for trie traversal.
///
/// Keys are split into half-bytes (0-15), one per branch level. An `n`-byte
/// key becomes `2n` nibbles.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nibbles(pub Vec<u8>);

impl Nibbles {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut nibbles = Vec::with_capacity(bytes.len() * 2);
        for byte in bytes {
            nibbles.push(byte >> 4);
            nibbles.push(byte & 0x0F);
        }
        Nibbles(nibbles)
    }

    pub fn from_slice(nibbles: &[u8]) -> Self {
        Nibbles(nibbles.to_vec())
    }

    /// Pack back into bytes. Fails unless the path has an even length.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TrieError> {
        if self.0.len() % 2 == 1 {
            return Err(TrieError::OddKeyLength {
                nibbles: self.0.len(),
            });
        }
        Ok(self
            .0
            .chunks(2)
            .map(|pair| (pair[0] << 4) | pair[1])
            .collect())
    }

    /// `self` followed by `tail`.
    pub fn join(&self, tail: &[u8]) -> Self {
        let mut joined = Vec::with_capacity(self.0.len() + tail.len());
        joined.extend_from_slice(&self.0);
        joined.extend_from_slice(tail);
        Nibbles(joined)
    }

    /// `self` followed by a single nibble.
    pub fn push(&self, nibble: u8) -> Self {
        self.join(&[nibble])
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether every nibble is a valid half-byte.
    pub fn is_valid(&self) -> bool {
        self.0.iter().all(|n| *n < 16)
    }
}

/// Length of the shared prefix of two nibble paths.
pub fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}
