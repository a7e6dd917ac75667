//! # erc20-holder-indexer
//!
//! Reconstructs the holder set of an ERC-20 token and keeps it current.
//!
//! The initial ledger comes from the contract's `getAllHolders()` aggregate
//! when available, otherwise from replaying every `Transfer` event. After
//! that, live transfers from a WebSocket subscription or a log poller are
//! applied incrementally through a single ordered channel.

pub mod bindings;
pub mod common;
pub mod config;
pub mod contract;
pub mod core;
pub mod indexer;
pub mod sources;
pub mod storage;
pub mod types;

pub use bindings::IToken;
pub use common::error::{HolderIndexerError, Result};
pub use config::{HolderIndexerConfig, HolderIndexerConfigBuilder};
pub use contract::{HolderAggregate, RpcTokenContract, TokenContract, TokenInfo};
pub use core::{
    AccountSession, ApplyOutcome, HolderView, LedgerOrigin, LedgerReconstructor, LedgerSnapshot,
    LedgerStore, LiveSynchronizer, SyncExit, SyncMessage, filter_holders, shorten_address,
};
pub use indexer::HolderIndexer;
pub use sources::{LogPoller, TransferSource, WebSocketSource};
pub use storage::{MemoryStorage, Storage, StorageBackend};
pub use types::{HolderRecord, LogPosition, TransferDelta, format_units};
