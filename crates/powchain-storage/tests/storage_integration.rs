mod helpers;

use helpers::{create_temp_dir, open_chain, remove_temp_dir, TEST_TARGET_BITS};
use powchain_core::{
    Block, CancelToken, Chain, ChainConfig, ChainError, ChainStore, MiningLimits, ProofOfWork,
};
use powchain_storage::SledStore;
use rand::Rng;
use std::sync::Arc;

#[tokio::test]
async fn test_storage_integration() -> anyhow::Result<()> {
    let (temp_dir, db_path) = create_temp_dir();
    let chain = open_chain(&db_path);
    let mut rng = rand::thread_rng();
    let num_blocks = 20;
    let mut appended: Vec<Block> = Vec::new();
    // Append blocks with random payloads
    for _ in 0..num_blocks {
        let data: Vec<u8> = (0..rng.gen_range(1..64)).map(|_| rng.gen()).collect();
        appended.push(chain.add_block(data)?);
    }
    // Walk back and compare against what was appended
    let walked: Vec<Block> = chain.iter().collect::<Result<_, _>>()?;
    assert_eq!(walked.len(), num_blocks + 1);
    for (stored, original) in walked.iter().zip(appended.iter().rev()) {
        assert_eq!(stored, original);
    }
    assert!(walked.last().unwrap().is_genesis());
    assert_eq!(chain.tip(), Some(appended.last().unwrap().hash));
    assert_eq!(chain.block_count()?, num_blocks as u64 + 1);
    // Cleanup
    drop(walked);
    drop(chain);
    remove_temp_dir(temp_dir);
    Ok(())
}

#[tokio::test]
async fn test_storage_persistence() -> anyhow::Result<()> {
    let (temp_dir, db_path) = create_temp_dir();
    let (genesis, tip) = {
        let chain = open_chain(&db_path);
        let genesis = chain.tip().expect("genesis tip");
        let block = chain.add_block("Send 1 BTC to Free")?;
        chain.close()?;
        (genesis, block.hash)
        // `chain` dropped here -> lock released
    };
    // Re-open and verify nothing was re-mined or lost
    {
        let chain = open_chain(&db_path);
        assert_eq!(chain.tip(), Some(tip));
        assert_eq!(chain.block_count()?, 2);
        let block = chain.get_block(&tip)?.expect("block should persist");
        assert_eq!(block.data, b"Send 1 BTC to Free");
        assert_eq!(block.prev_block_hash, Some(genesis));
        let next = chain.add_block("Send 2 BTC to Free")?;
        assert_eq!(next.prev_block_hash, Some(tip));
    }
    remove_temp_dir(temp_dir);
    Ok(())
}

#[tokio::test]
async fn test_two_block_scenario() -> anyhow::Result<()> {
    let (temp_dir, db_path) = create_temp_dir();
    let chain = open_chain(&db_path);
    let genesis = chain.tip().expect("genesis tip");
    let first = chain.add_block("Send 1 BTC to Free")?;
    let second = chain.add_block("Send 2 BTC to Free")?;

    assert_eq!(chain.block_count()?, 3);
    assert_eq!(chain.tip(), Some(second.hash));
    let data: Vec<Vec<u8>> = chain
        .iter()
        .map(|b| b.map(|b| b.data))
        .collect::<Result<_, _>>()?;
    assert_eq!(
        data,
        vec![
            b"Send 2 BTC to Free".to_vec(),
            b"Send 1 BTC to Free".to_vec(),
            b"Genesis Block".to_vec(),
        ]
    );
    assert_eq!(first.prev_block_hash, Some(genesis));
    assert_eq!(second.prev_block_hash, Some(first.hash));
    assert_eq!(chain.verify()?.blocks, 3);
    drop(chain);
    remove_temp_dir(temp_dir);
    Ok(())
}

#[tokio::test]
async fn test_genesis_determinism() -> anyhow::Result<()> {
    let (dir_a, path_a) = create_temp_dir();
    let (dir_b, path_b) = create_temp_dir();
    let a = open_chain(&path_a).tip();
    let b = open_chain(&path_b).tip();
    assert!(a.is_some());
    assert_eq!(a, b);
    remove_temp_dir(dir_a);
    remove_temp_dir(dir_b);
    Ok(())
}

#[tokio::test]
async fn test_persisted_layout() -> anyhow::Result<()> {
    let (temp_dir, db_path) = create_temp_dir();
    let block = {
        let chain = open_chain(&db_path);
        let block = chain.add_block("layout")?;
        chain.close()?;
        block
    };
    // Reopen *raw* sled and read the documented keys
    {
        let db = sled::open(&db_path)?;
        let tip = db.get(b"l")?.expect("tip key should exist");
        assert_eq!(tip.as_ref(), &block.hash[..]);
        let raw = db.get(block.hash)?.expect("block keyed by raw hash");
        let decoded: Block = bincode::deserialize(&raw)?;
        assert_eq!(decoded, block);
        let genesis_hash = block.prev_block_hash.expect("non-genesis block");
        let raw = db.get(genesis_hash)?.expect("genesis keyed by raw hash");
        let genesis: Block = bincode::deserialize(&raw)?;
        assert_eq!(genesis.prev_block_hash, None);
        assert_eq!(db.len(), 3);
    }
    remove_temp_dir(temp_dir);
    Ok(())
}

#[tokio::test]
async fn test_hash_integrity_of_stored_blocks() -> anyhow::Result<()> {
    let (temp_dir, db_path) = create_temp_dir();
    let chain = open_chain(&db_path);
    for i in 0..5 {
        chain.add_block(format!("record {i}"))?;
    }
    for block in chain.iter() {
        let block = block?;
        let pow = ProofOfWork::new(&block, TEST_TARGET_BITS)?;
        assert!(pow.validate());
        assert_eq!(
            block.hash,
            powchain_core::sha256(&powchain_core::pow::prepare_data(
                &block,
                TEST_TARGET_BITS,
                block.nonce
            ))
        );
        assert!(pow.target().is_met_by(&block.hash));
    }
    drop(chain);
    remove_temp_dir(temp_dir);
    Ok(())
}

#[tokio::test]
async fn test_storage_unavailable() -> anyhow::Result<()> {
    let (temp_dir, db_path) = create_temp_dir();
    // A regular file where the database directory should go
    std::fs::write(&db_path, b"not a database")?;
    let result = SledStore::open(&db_path);
    assert!(matches!(result, Err(ChainError::StorageUnavailable(_))));
    remove_temp_dir(temp_dir);
    Ok(())
}

#[tokio::test]
async fn test_malformed_tip_is_corrupt() -> anyhow::Result<()> {
    let (temp_dir, db_path) = create_temp_dir();
    drop(open_chain(&db_path));
    {
        let db = sled::open(&db_path)?;
        db.insert(b"l", &b"short"[..])?;
        db.flush()?;
    }
    let store = SledStore::open(&db_path)?;
    let result = Chain::new(Arc::new(store), ChainConfig::with_target_bits(TEST_TARGET_BITS));
    match result {
        Err(ChainError::CorruptChainLink { hash }) => assert_eq!(hash, b"short".to_vec()),
        Err(other) => panic!("expected a corrupt link, got {other}"),
        Ok(_) => panic!("expected a corrupt link"),
    }
    remove_temp_dir(temp_dir);
    Ok(())
}

#[tokio::test]
async fn test_dangling_tip_is_corrupt() -> anyhow::Result<()> {
    let (temp_dir, db_path) = create_temp_dir();
    drop(open_chain(&db_path));
    let missing: [u8; 32] = rand::thread_rng().gen();
    {
        let db = sled::open(&db_path)?;
        db.insert(b"l", &missing[..])?;
        db.flush()?;
    }
    let chain = open_chain(&db_path);
    assert_eq!(chain.tip(), Some(missing));
    let mut iter = chain.iter();
    assert!(matches!(
        iter.next(),
        Some(Err(ChainError::CorruptChainLink { .. }))
    ));
    assert!(iter.next().is_none());
    drop(iter);
    drop(chain);
    remove_temp_dir(temp_dir);
    Ok(())
}

#[tokio::test]
async fn test_tampered_block_fails_verification() -> anyhow::Result<()> {
    let (temp_dir, db_path) = create_temp_dir();
    let block = {
        let chain = open_chain(&db_path);
        let block = chain.add_block("Send 1 BTC to Free")?;
        chain.close()?;
        block
    };
    // Rewrite the stored record with different data but the same hash
    {
        let db = sled::open(&db_path)?;
        let mut forged = block.clone();
        forged.data = b"Send 1000 BTC to Free".to_vec();
        db.insert(block.hash, bincode::serialize(&forged)?)?;
        db.flush()?;
    }
    let chain = open_chain(&db_path);
    match chain.verify() {
        Err(ChainError::InvalidBlock { hash }) => assert_eq!(hash, block.hash),
        other => panic!("expected tampering to be detected, got {other:?}"),
    }
    drop(chain);
    remove_temp_dir(temp_dir);
    Ok(())
}

#[tokio::test]
async fn test_undecodable_block_is_io_failure() -> anyhow::Result<()> {
    let (temp_dir, db_path) = create_temp_dir();
    let tip = {
        let chain = open_chain(&db_path);
        chain.close()?;
        chain.tip().expect("genesis tip")
    };
    {
        let db = sled::open(&db_path)?;
        db.insert(tip, vec![0u8; 3])?;
        db.flush()?;
    }
    let chain = open_chain(&db_path);
    assert!(matches!(
        chain.iter().next(),
        Some(Err(ChainError::StorageIo(_)))
    ));
    drop(chain);
    remove_temp_dir(temp_dir);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_append_leaves_store_untouched() -> anyhow::Result<()> {
    let (temp_dir, db_path) = create_temp_dir();
    let chain = open_chain(&db_path);
    let tip = chain.tip();
    let token = CancelToken::new();
    token.cancel();
    let limits = MiningLimits::default().with_cancel(token);
    let result = chain.add_block_with("aborted", &limits);
    assert!(matches!(result, Err(ChainError::MiningCancelled { .. })));
    assert_eq!(chain.tip(), tip);
    assert_eq!(chain.store().tip_hash()?, tip);
    assert_eq!(chain.block_count()?, 1);
    drop(chain);
    remove_temp_dir(temp_dir);
    Ok(())
}

#[tokio::test]
async fn test_storage_concurrency() -> anyhow::Result<()> {
    use tokio::task;
    let (temp_dir, db_path) = create_temp_dir();
    let chain = open_chain(&db_path);
    let num_blocks = 16;
    let mut handles = Vec::new();
    // Concurrently append blocks; the chain serializes them
    for i in 0..num_blocks {
        let chain = chain.clone();
        handles.push(task::spawn_blocking(move || {
            chain.add_block(format!("writer {i}")).unwrap()
        }));
    }
    for handle in handles {
        handle.await?;
    }
    assert_eq!(chain.block_count()?, num_blocks + 1);
    let report = chain.verify()?;
    assert_eq!(report.blocks, num_blocks + 1);
    drop(chain);
    remove_temp_dir(temp_dir);
    Ok(())
}

#[tokio::test]
async fn test_temporary_store() -> anyhow::Result<()> {
    let store = Arc::new(SledStore::temporary()?);
    let chain = Chain::open(
        Arc::clone(&store),
        ChainConfig::with_target_bits(TEST_TARGET_BITS),
    )?;
    chain.add_block("ephemeral")?;
    assert_eq!(store.block_count()?, 2);
    Ok(())
}
