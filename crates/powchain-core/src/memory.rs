use crate::chain::ChainStore;
use crate::{Block, Hash};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Inner {
    blocks: HashMap<Hash, Block>,
    tip: Option<Hash>,
}

/// Process-local store with no persistence. Blocks and tip share one lock,
/// so `append` is atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }
}

impl ChainStore for MemoryStore {
    fn get_block(&self, hash: &Hash) -> Result<Option<Block>> {
        Ok(self.read()?.blocks.get(hash).cloned())
    }

    fn tip_hash(&self) -> Result<Option<Hash>> {
        Ok(self.read()?.tip)
    }

    fn append(&self, block: &Block) -> Result<()> {
        let mut inner = self.write()?;
        inner.blocks.insert(block.hash, block.clone());
        inner.tip = Some(block.hash);
        Ok(())
    }

    fn block_count(&self) -> Result<u64> {
        Ok(self.read()?.blocks.len() as u64)
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
