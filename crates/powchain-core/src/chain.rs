use crate::config::ChainConfig;
use crate::error::{ChainError, Result};
use crate::pow::{MiningLimits, ProofOfWork};
use crate::{Block, Hash};
use std::iter::FusedIterator;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

/// Trait the storage backends implement for the chain to operate.
/// This lives here so the storage crate can depend on core without a cycle.
pub trait ChainStore: Send + Sync {
    fn get_block(&self, hash: &Hash) -> anyhow::Result<Option<Block>>;
    fn tip_hash(&self) -> anyhow::Result<Option<Hash>>;
    /// Write `block` under its hash and point the tip at it, as one unit.
    fn append(&self, block: &Block) -> anyhow::Result<()>;
    fn block_count(&self) -> anyhow::Result<u64>;
    fn close(&self) -> anyhow::Result<()>;
}

/// Chain façade that mines blocks and delegates persistence to a `ChainStore`.
pub struct Chain<S: ChainStore> {
    store: Arc<S>,
    config: ChainConfig,
    /// Cached tip. Holding the lock serializes appends.
    tip: Arc<Mutex<Option<Hash>>>,
}

impl<S: ChainStore> Clone for Chain<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            tip: Arc::clone(&self.tip),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifyReport {
    pub blocks: u64,
    pub tip: Option<Hash>,
}

impl<S: ChainStore> Chain<S> {
    /// Attach to `store` without writing anything. An empty store stays
    /// uninitialized until [`Chain::ensure_genesis`].
    pub fn new(store: Arc<S>, config: ChainConfig) -> Result<Self> {
        config.validate()?;
        let tip = store.tip_hash().map_err(ChainError::io)?;
        Ok(Self {
            store,
            config,
            tip: Arc::new(Mutex::new(tip)),
        })
    }

    /// Attach to `store`, mining and writing the genesis block if it is empty.
    pub fn open(store: Arc<S>, config: ChainConfig) -> Result<Self> {
        let chain = Self::new(store, config)?;
        chain.ensure_genesis()?;
        Ok(chain)
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    fn lock_tip(&self) -> MutexGuard<'_, Option<Hash>> {
        // The guarded value is a plain hash, still usable after a panic elsewhere.
        self.tip.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ensure a genesis block exists. Idempotent; returns the tip hash.
    pub fn ensure_genesis(&self) -> Result<Hash> {
        let mut tip = self.lock_tip();
        if let Some(hash) = self.store.tip_hash().map_err(ChainError::io)? {
            *tip = Some(hash);
            return Ok(hash);
        }
        let genesis =
            Block::genesis(&self.config).mine(self.config.target_bits, &self.config.limits())?;
        self.store.append(&genesis).map_err(ChainError::io)?;
        *tip = Some(genesis.hash);
        info!(hash = %hex::encode(genesis.hash), "genesis block created");
        Ok(genesis.hash)
    }

    pub fn add_block(&self, data: impl Into<Vec<u8>>) -> Result<Block> {
        self.add_block_with(data, &self.config.limits())
    }

    /// Mine `data` onto the persisted tip and advance the tip to it.
    /// Nothing is written unless mining succeeds.
    pub fn add_block_with(&self, data: impl Into<Vec<u8>>, limits: &MiningLimits) -> Result<Block> {
        let mut tip = self.lock_tip();
        let prev = self
            .store
            .tip_hash()
            .map_err(ChainError::io)?
            .ok_or(ChainError::PreconditionViolation(
                "add_block called before the genesis block was written",
            ))?;
        let block = Block::new(data, Some(prev)).mine(self.config.target_bits, limits)?;
        self.store.append(&block).map_err(ChainError::io)?;
        *tip = Some(block.hash);
        info!(
            hash = %hex::encode(block.hash),
            prev = %hex::encode(prev),
            nonce = block.nonce,
            "block appended"
        );
        Ok(block)
    }

    pub fn tip(&self) -> Option<Hash> {
        *self.lock_tip()
    }

    pub fn get_block(&self, hash: &Hash) -> Result<Option<Block>> {
        self.store.get_block(hash).map_err(ChainError::io)
    }

    pub fn block_count(&self) -> Result<u64> {
        self.store.block_count().map_err(ChainError::io)
    }

    /// Newest-to-oldest walk over the chain as it stands now.
    pub fn iter(&self) -> ChainIterator<S> {
        ChainIterator {
            store: Arc::clone(&self.store),
            current: self.tip(),
        }
    }

    /// Re-check proof-of-work and linkage for every block from tip to genesis.
    pub fn verify(&self) -> Result<VerifyReport> {
        let tip = self.tip();
        let mut expected = tip;
        let mut blocks = 0u64;
        for block in self.iter() {
            let block = block?;
            let linked = expected == Some(block.hash);
            if !linked || !ProofOfWork::new(&block, self.config.target_bits)?.validate() {
                warn!(hash = %hex::encode(block.hash), linked, "block failed verification");
                return Err(ChainError::InvalidBlock { hash: block.hash });
            }
            blocks += 1;
            expected = block.prev_block_hash;
        }
        Ok(VerifyReport { blocks, tip })
    }

    /// Flush the backing store.
    pub fn close(&self) -> Result<()> {
        self.store.close().map_err(ChainError::io)
    }
}

/// Cursor over stored blocks, following `prev_block_hash` back to genesis.
/// Captures the tip at creation, so later appends are not observed.
pub struct ChainIterator<S: ChainStore> {
    store: Arc<S>,
    current: Option<Hash>,
}

impl<S: ChainStore> ChainIterator<S> {
    pub fn is_exhausted(&self) -> bool {
        self.current.is_none()
    }
}

impl<S: ChainStore> Iterator for ChainIterator<S> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.current.take()?;
        match self.store.get_block(&hash) {
            Ok(Some(block)) => {
                self.current = block.prev_block_hash;
                Some(Ok(block))
            }
            Ok(None) => Some(Err(ChainError::CorruptChainLink {
                hash: hash.to_vec(),
            })),
            Err(err) => Some(Err(ChainError::io(err))),
        }
    }
}

impl<S: ChainStore> FusedIterator for ChainIterator<S> {}
