pub mod chain;
pub mod config;
pub mod constants;
pub mod error;
pub mod memory;
pub mod pow;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

pub use chain::{Chain, ChainIterator, ChainStore, VerifyReport};
pub use config::ChainConfig;
pub use error::{ChainError, Result};
pub use memory::MemoryStore;
pub use pow::{CancelToken, MiningLimits, ProofOfWork, Target};

pub type Hash = [u8; 32];

/// One link of the chain. `hash` and `nonce` are filled in by mining and
/// never recomputed afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub timestamp: i64,
    pub data: Vec<u8>,
    /// `None` only for the genesis block.
    pub prev_block_hash: Option<Hash>,
    pub hash: Hash,
    pub nonce: u64,
}

impl Block {
    /// An unmined block stamped with the current time.
    pub fn new(data: impl Into<Vec<u8>>, prev_block_hash: Option<Hash>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        Self::with_timestamp(data, prev_block_hash, timestamp)
    }

    pub fn with_timestamp(
        data: impl Into<Vec<u8>>,
        prev_block_hash: Option<Hash>,
        timestamp: i64,
    ) -> Self {
        Self {
            timestamp,
            data: data.into(),
            prev_block_hash,
            hash: [0u8; 32],
            nonce: 0,
        }
    }

    /// The unmined genesis block described by `config`.
    pub fn genesis(config: &ChainConfig) -> Self {
        Self::with_timestamp(
            config.genesis_data.as_bytes(),
            None,
            config.genesis_timestamp,
        )
    }

    /// Run proof-of-work and return the block with its winning nonce and hash.
    pub fn mine(mut self, target_bits: u32, limits: &MiningLimits) -> Result<Self> {
        let (nonce, hash) = ProofOfWork::new(&self, target_bits)?.run(limits)?;
        self.nonce = nonce;
        self.hash = hash;
        Ok(self)
    }

    pub fn is_genesis(&self) -> bool {
        self.prev_block_hash.is_none()
    }
}

pub fn sha256(bytes: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}
