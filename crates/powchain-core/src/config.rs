use crate::constants::{GENESIS_DATA, GENESIS_TIMESTAMP, MAX_NONCE, POW_TARGET_BITS};
use crate::error::Result;
use crate::pow::{MiningLimits, Target};
use serde::{Deserialize, Serialize};

/// Construction-time parameters shared by the proof-of-work engine and the chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Required leading zero bits; the target is `2^(256 - target_bits)`.
    pub target_bits: u32,
    /// Highest nonce tried before mining gives up.
    pub max_nonce: u64,
    pub genesis_data: String,
    /// Fixed so independently created chains agree on the genesis hash.
    pub genesis_timestamp: i64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            target_bits: POW_TARGET_BITS,
            max_nonce: MAX_NONCE,
            genesis_data: GENESIS_DATA.to_string(),
            genesis_timestamp: GENESIS_TIMESTAMP,
        }
    }
}

impl ChainConfig {
    pub fn with_target_bits(target_bits: u32) -> Self {
        Self {
            target_bits,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        Target::from_bits(self.target_bits).map(|_| ())
    }

    pub fn limits(&self) -> MiningLimits {
        MiningLimits::new(self.max_nonce)
    }
}
