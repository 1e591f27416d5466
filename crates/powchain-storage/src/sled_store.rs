use anyhow::{anyhow, Context, Result};
use powchain_core::constants::{HASH_SIZE, TIP_KEY};
use powchain_core::{Block, ChainError, ChainStore, Hash};
use sled::transaction::ConflictableTransactionResult;
use sled::Db;
use std::path::Path;
use tracing::{debug, info};

/// Blocks live in the default tree keyed by their raw 32-byte hash; the
/// single-byte key `l` holds the tip hash.
#[derive(Clone)]
pub struct SledStore {
  db: Db,
}

impl SledStore {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ChainError> {
    let path = path.as_ref();
    let db = sled::open(path)
      .with_context(|| format!("opening sled store at {}", path.display()))
      .map_err(ChainError::StorageUnavailable)?;
    info!(path = %path.display(), "sled store opened");
    Ok(Self { db })
  }

  /// A store that is discarded when dropped.
  pub fn temporary() -> Result<Self, ChainError> {
    let db = sled::Config::new()
      .temporary(true)
      .open()
      .context("opening temporary sled store")
      .map_err(ChainError::StorageUnavailable)?;
    Ok(Self { db })
  }

  fn decode_tip(value: &[u8]) -> Result<Hash> {
    if value.len() != HASH_SIZE {
      return Err(anyhow::Error::new(ChainError::CorruptChainLink {
        hash: value.to_vec(),
      }));
    }
    let mut arr = [0u8; HASH_SIZE];
    arr.copy_from_slice(value);
    Ok(arr)
  }
}

impl ChainStore for SledStore {
  fn get_block(&self, hash: &Hash) -> Result<Option<Block>> {
    self
      .db
      .get(hash)?
      .map(|bytes| bincode::deserialize(&bytes))
      .transpose()
      .context("decoding stored block")
  }

  fn tip_hash(&self) -> Result<Option<Hash>> {
    self
      .db
      .get(TIP_KEY)?
      .map(|value| Self::decode_tip(&value))
      .transpose()
  }

  fn append(&self, block: &Block) -> Result<()> {
    let bytes = bincode::serialize(block)?;
    self
      .db
      .transaction(|tx| -> ConflictableTransactionResult<(), sled::Error> {
        tx.insert(&block.hash[..], bytes.as_slice())?;
        tx.insert(TIP_KEY, &block.hash[..])?;
        Ok(())
      })
      .map_err(|e| anyhow!("appending block: {e}"))?;

    self.db.flush()?;
    debug!(bytes = bytes.len(), "block and tip written");
    Ok(())
  }

  fn block_count(&self) -> Result<u64> {
    let keys = self.db.len() as u64;
    let tip = u64::from(self.db.contains_key(TIP_KEY)?);
    Ok(keys - tip)
  }

  fn close(&self) -> Result<()> {
    self.db.flush()?;
    Ok(())
  }
}
