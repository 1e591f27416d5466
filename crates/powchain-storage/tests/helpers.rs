use std::fs;
use std::path::Path;
use std::sync::Arc;

use powchain_core::{Chain, ChainConfig};
use powchain_storage::SledStore;
use tempfile::{tempdir, TempDir};

pub const TEST_TARGET_BITS: u32 = 4;

pub fn create_temp_dir() -> (TempDir, std::path::PathBuf) {
    // Create a temporary directory for the sled database
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("chain");
    (temp_dir, db_path)
}

pub fn open_chain(db_path: &Path) -> Chain<SledStore> {
    let store = SledStore::open(db_path).expect("Failed to open SledStore");
    Chain::open(
        Arc::new(store),
        ChainConfig::with_target_bits(TEST_TARGET_BITS),
    )
    .expect("Failed to open chain")
}

pub fn remove_temp_dir(temp_dir: TempDir) {
    let db_path = temp_dir.path().to_path_buf();
    temp_dir.close().expect("Failed to delete temp dir");
    let _ = fs::remove_dir_all(&db_path);
    // Verify the directory is removed
    assert!(!db_path.exists(), "Database directory should be removed");
}
