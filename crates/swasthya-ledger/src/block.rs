//! Blocks and hash-chain verification

use crate::transaction::Transaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// `previous_hash` of the first block in a chain
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// A sealed, ordered batch of transactions
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    /// 1-based position in the chain
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub transactions: Vec<Transaction>,
    pub proof: u64,
    pub previous_hash: String,
}

impl Block {
    /// Lowercase hex SHA-256 of the block's JSON encoding.
    ///
    /// Falls back to hashing the `Debug` rendering if JSON encoding fails.
    pub fn hash(&self) -> String {
        let encoded = serde_json::to_vec(self).unwrap_or_else(|_| format!("{:?}", self).into_bytes());
        let digest = Sha256::digest(&encoded);
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 1 && self.previous_hash == GENESIS_PREVIOUS_HASH
    }
}

/// Integrity violations found by [`verify_links`]
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("chain has no genesis block")]
    Empty,
    #[error("block {index} does not link to its predecessor: expected {expected}, found {found}")]
    BrokenLink {
        index: u64,
        expected: String,
        found: String,
    },
    #[error("block index out of sequence: expected {expected}, found {found}")]
    IndexGap { expected: u64, found: u64 },
}

/// Check index continuity and `previous_hash` linkage over a chain
pub fn verify_links(blocks: &[Block]) -> Result<(), ChainError> {
    let first = blocks.first().ok_or(ChainError::Empty)?;
    if first.index != 1 {
        return Err(ChainError::IndexGap {
            expected: 1,
            found: first.index,
        });
    }
    if first.previous_hash != GENESIS_PREVIOUS_HASH {
        return Err(ChainError::BrokenLink {
            index: first.index,
            expected: GENESIS_PREVIOUS_HASH.to_string(),
            found: first.previous_hash.clone(),
        });
    }

    for pair in blocks.windows(2) {
        let (prev, block) = (&pair[0], &pair[1]);
        if block.index != prev.index + 1 {
            return Err(ChainError::IndexGap {
                expected: prev.index + 1,
                found: block.index,
            });
        }
        let expected = prev.hash();
        if block.previous_hash != expected {
            return Err(ChainError::BrokenLink {
                index: block.index,
                expected,
                found: block.previous_hash.clone(),
            });
        }
    }

    Ok(())
}
