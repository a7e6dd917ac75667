//! Holder indexer binary.
//!
//! Configured through environment variables (or a `.env` file):
//! `RPC_URL` and `TOKEN_ADDRESS` are required; `WS_URL`, `DEPLOYMENT_BLOCK`,
//! `CHAIN_ID`, `DATABASE_URL`, `ACCOUNT`, `POLL_INTERVAL_SECS`,
//! `HISTORY_CHUNK_SIZE` and `HOLDER_SEARCH` are optional.

#![warn(clippy::all, clippy::pedantic)]

use erc20_holder_indexer::types::format_address;
use erc20_holder_indexer::{HolderIndexer, HolderIndexerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = HolderIndexerConfig::from_env()?;

    println!("Initializing holder indexer...");
    println!("RPC URL: {}", config.rpc_url);
    println!("Token: {}", format_address(&config.token_address));
    match &config.ws_url {
        Some(ws_url) => println!("Live source: WebSocket ({ws_url})"),
        None => println!(
            "Live source: polling every {} seconds",
            config.poll_interval_secs
        ),
    }

    let indexer = HolderIndexer::new(config).await?;
    let token = indexer.cancellation_token();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\nShutting down...");
            token.cancel();
        }
    });

    println!("Press Ctrl+C to stop");
    indexer.start().await?;

    Ok(())
}
