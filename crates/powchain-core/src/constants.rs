pub const BYTE: usize = 8;
pub const HASH_SIZE: usize = 32;
pub const HASH_BITS: u32 = (HASH_SIZE * BYTE) as u32;
pub const TIP_KEY: &[u8] = b"l";
pub const POW_TARGET_BITS: u32 = 16;
pub const MAX_NONCE: u64 = i64::MAX as u64;
/// Nonces tried between cancellation checks and progress logs.
pub const MINING_CHECK_INTERVAL: u64 = 1 << 16;
pub const GENESIS_DATA: &str = "Genesis Block";
pub const GENESIS_TIMESTAMP: i64 = 1_231_006_505;
