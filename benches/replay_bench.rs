use alloy::primitives::{Address, U256};
use erc20_holder_indexer::core::reconstructor::replay_transfers;
use erc20_holder_indexer::{LedgerStore, LogPosition, TransferDelta};
use std::time::Instant;
use tokio::runtime::Runtime;

const HOLDERS: u64 = 10_000;
const TRANSFERS: u64 = 500_000;

fn holder(i: u64) -> Address {
    let mut bytes = [0u8; 20];
    bytes[12..].copy_from_slice(&(i + 1).to_be_bytes());
    Address::from(bytes)
}

/// A mint per holder followed by a ring of small transfers between them.
fn synthetic_history() -> Vec<TransferDelta> {
    let mut deltas = Vec::with_capacity((HOLDERS + TRANSFERS) as usize);
    for i in 0..HOLDERS {
        deltas.push(TransferDelta::new(
            Address::ZERO,
            holder(i),
            U256::from(1_000_000u64),
            LogPosition::new(1, i),
        ));
    }
    for i in 0..TRANSFERS {
        deltas.push(TransferDelta::new(
            holder(i % HOLDERS),
            holder((i * 7 + 1) % HOLDERS),
            U256::from(1 + i % 5),
            LogPosition::new(2 + i / 100, i % 100),
        ));
    }
    deltas
}

fn main() {
    let history = synthetic_history();
    println!("Replaying {} transfers...", history.len());

    let start = Instant::now();
    let snapshot = replay_transfers(&history, None);
    let duration = start.elapsed();
    println!(
        "Replay: {} holders in {:?} ({:.2} transfers/s)",
        snapshot.len(),
        duration,
        history.len() as f64 / duration.as_secs_f64()
    );

    let rt = Runtime::new().unwrap();
    let store = LedgerStore::new();
    let start = Instant::now();
    rt.block_on(async {
        for batch in history.chunks(256) {
            store.apply(batch).await;
        }
    });
    let duration = start.elapsed();
    println!(
        "Incremental apply: {} holders in {:?} ({:.2} transfers/s)",
        rt.block_on(store.holder_count()),
        duration,
        history.len() as f64 / duration.as_secs_f64()
    );
}
