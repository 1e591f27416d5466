use crate::Hash;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("chain storage unavailable: {0:#}")]
    StorageUnavailable(#[source] anyhow::Error),

    #[error("chain storage i/o failed: {0:#}")]
    StorageIo(#[source] anyhow::Error),

    #[error("corrupt chain link: no block stored under {}", hex::encode(.hash))]
    CorruptChainLink { hash: Vec<u8> },

    #[error("proof of work exhausted the nonce space up to {max_nonce}")]
    ProofOfWorkExhausted { max_nonce: u64 },

    #[error("mining cancelled at nonce {nonce}")]
    MiningCancelled { nonce: u64 },

    #[error("difficulty of {0} bits exceeds the 256-bit hash")]
    InvalidDifficulty(u32),

    #[error("block {} failed validation", hex::encode(.hash))]
    InvalidBlock { hash: Hash },

    #[error("precondition violated: {0}")]
    PreconditionViolation(&'static str),
}

impl ChainError {
    /// Lift a backend failure, keeping any `ChainError` the backend raised itself.
    pub(crate) fn io(err: anyhow::Error) -> Self {
        match err.downcast::<ChainError>() {
            Ok(chain_err) => chain_err,
            Err(err) => ChainError::StorageIo(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;
