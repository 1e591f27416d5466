use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use powchain_core::constants::POW_TARGET_BITS;
use powchain_core::{Block, CancelToken, Chain, ChainConfig, ProofOfWork};
use powchain_storage::SledStore;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "powchain")]
#[command(about = "Single-node proof-of-work chain backed by sled")]
struct Cli {
    /// Data directory for sled
    #[arg(long, env = "POWCHAIN_DATA_DIR", default_value = "./data", global = true)]
    data_dir: PathBuf,

    /// Leading zero bits every block hash must have
    #[arg(long, env = "POWCHAIN_TARGET_BITS", default_value_t = POW_TARGET_BITS, global = true)]
    target_bits: u32,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mine a block holding DATA and append it
    AddBlock {
        #[arg(long)]
        data: String,
    },
    /// Print every block from tip to genesis
    PrintChain {
        /// One JSON object per line
        #[arg(long)]
        json: bool,
    },
    /// Re-check proof-of-work and linkage of the whole chain
    Verify,
}

#[derive(Serialize)]
struct BlockView {
    hash: String,
    prev_block_hash: String,
    data: String,
    timestamp: i64,
    nonce: u64,
    pow_valid: bool,
}

impl BlockView {
    fn new(block: &Block, target_bits: u32) -> Result<Self> {
        Ok(Self {
            hash: hex::encode(block.hash),
            prev_block_hash: block.prev_block_hash.map(hex::encode).unwrap_or_default(),
            data: String::from_utf8_lossy(&block.data).into_owned(),
            timestamp: block.timestamp,
            nonce: block.nonce,
            pow_valid: ProofOfWork::new(block, target_bits)?.validate(),
        })
    }
}

fn print_chain(chain: &Chain<SledStore>, json: bool) -> Result<()> {
    let target_bits = chain.config().target_bits;
    for block in chain.iter() {
        let view = BlockView::new(&block?, target_bits)?;
        if json {
            println!("{}", serde_json::to_string(&view)?);
        } else {
            println!("Prev. hash: {}", view.prev_block_hash);
            println!("Data: {}", view.data);
            println!("Hash: {}", view.hash);
            println!("Nonce: {}", view.nonce);
            println!("PoW: {}", view.pow_valid);
            println!();
        }
    }
    Ok(())
}

async fn add_block(chain: Chain<SledStore>, data: String) -> Result<Block> {
    let cancel = CancelToken::new();
    let limits = chain.config().limits().with_cancel(cancel.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling mining");
            cancel.cancel();
        }
    });
    let block = tokio::task::spawn_blocking(move || chain.add_block_with(data, &limits)).await??;
    Ok(block)
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = Arc::new(SledStore::open(&cli.data_dir)?);
    let chain = Chain::open(store, ChainConfig::with_target_bits(cli.target_bits))
        .with_context(|| format!("opening chain in {}", cli.data_dir.display()))?;

    match cli.cmd {
        Command::AddBlock { data } => {
            let block = add_block(chain.clone(), data).await?;
            println!("{}", hex::encode(block.hash));
        }
        Command::PrintChain { json } => print_chain(&chain, json)?,
        Command::Verify => {
            let report = chain.verify()?;
            let tip = report.tip.map(hex::encode).unwrap_or_default();
            println!("chain ok: {} blocks, tip {}", report.blocks, tip);
        }
    }

    chain.close()?;
    Ok(())
}
