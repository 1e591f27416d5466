use crate::constants::{HASH_BITS, MAX_NONCE, MINING_CHECK_INTERVAL};
use crate::error::{ChainError, Result};
use crate::{Block, Hash};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// `2^(256 - bits)` as a 33-byte big-endian integer, so zero bits (a target
/// of `2^256`) still fits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Target([u8; 33]);

impl Target {
    pub fn from_bits(bits: u32) -> Result<Self> {
        if bits > HASH_BITS {
            return Err(ChainError::InvalidDifficulty(bits));
        }
        let shift = (HASH_BITS - bits) as usize;
        let mut bytes = [0u8; 33];
        bytes[32 - shift / 8] = 1 << (shift % 8);
        Ok(Self(bytes))
    }

    /// True when `hash`, read as a big-endian unsigned integer, is strictly below the target.
    pub fn is_met_by(&self, hash: &Hash) -> bool {
        let mut widened = [0u8; 33];
        widened[1..].copy_from_slice(hash);
        widened < self.0
    }

    pub fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }
}

/// Shared flag a caller flips to abort an in-progress search.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug)]
pub struct MiningLimits {
    /// Last nonce tried, inclusive.
    pub max_nonce: u64,
    pub cancel: Option<CancelToken>,
}

impl Default for MiningLimits {
    fn default() -> Self {
        Self::new(MAX_NONCE)
    }
}

impl MiningLimits {
    pub fn new(max_nonce: u64) -> Self {
        Self {
            max_nonce,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}

/// Canonical hash input:
/// `prev ‖ data ‖ be64(timestamp) ‖ be64(target_bits) ‖ be64(nonce)`.
pub fn prepare_data(block: &Block, target_bits: u32, nonce: u64) -> Vec<u8> {
    let prev: &[u8] = match &block.prev_block_hash {
        Some(hash) => hash,
        None => &[],
    };
    let mut bytes = Vec::with_capacity(prev.len() + block.data.len() + 24);
    bytes.extend_from_slice(prev);
    bytes.extend_from_slice(&block.data);
    bytes.extend_from_slice(&block.timestamp.to_be_bytes());
    bytes.extend_from_slice(&u64::from(target_bits).to_be_bytes());
    bytes.extend_from_slice(&nonce.to_be_bytes());
    bytes
}

/// Proof-of-work bound to a single block.
pub struct ProofOfWork<'a> {
    block: &'a Block,
    target: Target,
    /// Hasher already fed with everything that precedes the nonce.
    prefix: Sha256,
}

impl<'a> ProofOfWork<'a> {
    pub fn new(block: &'a Block, target_bits: u32) -> Result<Self> {
        let target = Target::from_bits(target_bits)?;
        let mut prefix = Sha256::new();
        if let Some(prev) = &block.prev_block_hash {
            prefix.update(prev);
        }
        prefix.update(&block.data);
        prefix.update(block.timestamp.to_be_bytes());
        prefix.update(u64::from(target_bits).to_be_bytes());
        Ok(Self {
            block,
            target,
            prefix,
        })
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    fn hash_with(&self, nonce: u64) -> Hash {
        let mut hasher = self.prefix.clone();
        hasher.update(nonce.to_be_bytes());
        hasher.finalize().into()
    }

    /// Search nonces upward from zero until the hash falls below the target.
    pub fn run(&self, limits: &MiningLimits) -> Result<(u64, Hash)> {
        info!(
            data = %String::from_utf8_lossy(&self.block.data),
            "mining block"
        );
        let mut nonce = 0u64;
        loop {
            if nonce % MINING_CHECK_INTERVAL == 0 {
                if limits.is_cancelled() {
                    return Err(ChainError::MiningCancelled { nonce });
                }
                if nonce > 0 {
                    debug!(nonce, "still mining");
                }
            }
            let hash = self.hash_with(nonce);
            if self.target.is_met_by(&hash) {
                info!("Mined block with nonce {} and hash {}", nonce, hex::encode(hash));
                return Ok((nonce, hash));
            }
            if nonce >= limits.max_nonce {
                return Err(ChainError::ProofOfWorkExhausted {
                    max_nonce: limits.max_nonce,
                });
            }
            nonce += 1;
        }
    }

    /// Same result as [`ProofOfWork::run`], with each batch of nonces searched
    /// across the rayon pool. Batches go in order and each takes its lowest
    /// winner, so the smallest valid nonce is still the one returned.
    pub fn run_parallel(&self, limits: &MiningLimits) -> Result<(u64, Hash)> {
        let mut start = 0u64;
        loop {
            if limits.is_cancelled() {
                return Err(ChainError::MiningCancelled { nonce: start });
            }
            let end = limits
                .max_nonce
                .min(start.saturating_add(MINING_CHECK_INTERVAL - 1));
            let found = (start..=end)
                .into_par_iter()
                .find_first(|nonce| self.target.is_met_by(&self.hash_with(*nonce)));
            if let Some(nonce) = found {
                let hash = self.hash_with(nonce);
                info!("Mined block with nonce {} and hash {}", nonce, hex::encode(hash));
                return Ok((nonce, hash));
            }
            if end >= limits.max_nonce {
                return Err(ChainError::ProofOfWorkExhausted {
                    max_nonce: limits.max_nonce,
                });
            }
            debug!(nonce = end, "still mining");
            start = end + 1;
        }
    }

    /// Recompute the hash from the stored nonce; it must match the stored
    /// hash and fall below the target. Pure.
    pub fn validate(&self) -> bool {
        let hash = self.hash_with(self.block.nonce);
        hash == self.block.hash && self.target.is_met_by(&hash)
    }
}

pub fn count_leading_zero_bits(hash: &Hash) -> u32 {
    let mut total = 0u32;
    for b in hash {
        if *b == 0 {
            total += 8;
        } else {
            total += b.leading_zeros();
            break;
        }
    }
    total
}
