//! Top-level orchestration: initial load, live sources, and restarts on chain switches.

use alloy::primitives::Address;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::common::error::{HolderIndexerError, Result};
use crate::common::logging;
use crate::config::HolderIndexerConfig;
use crate::contract::{RpcTokenContract, TokenContract, TokenInfo};
use crate::core::synchronizer::reload_ledger;
use crate::core::{
    AccountSession, HolderView, LedgerReconstructor, LedgerSnapshot, LedgerStore,
    LiveSynchronizer, SyncExit, SyncMessage, shorten_address,
};
use crate::sources::{LogPoller, TransferSource, WebSocketSource, spawn_forwarder};
use crate::storage::{Storage, StorageBackend};
use crate::types::format_address;

/// Holder indexer for one ERC-20 contract.
pub struct HolderIndexer {
    config: HolderIndexerConfig,
    store: Arc<LedgerStore>,
    storage: Option<Arc<dyn StorageBackend>>,
    cancel: CancellationToken,
    control: Mutex<Option<mpsc::Sender<SyncMessage>>>,
    session: RwLock<Option<Arc<RwLock<AccountSession>>>>,
}

impl HolderIndexer {
    /// Creates an indexer, connecting to Postgres when `database_url` is set.
    ///
    /// # Errors
    ///
    /// Returns [`HolderIndexerError::DatabaseError`] if the database is unreachable.
    pub async fn new(config: HolderIndexerConfig) -> Result<Self> {
        let storage: Option<Arc<dyn StorageBackend>> = match &config.database_url {
            Some(url) => {
                let storage = Storage::new(url).await?;
                storage.initialize().await?;
                Some(Arc::new(storage) as Arc<dyn StorageBackend>)
            }
            None => None,
        };
        Ok(Self::build(config, storage))
    }

    /// Creates an indexer with an already initialized storage backend.
    pub fn new_with_storage(config: HolderIndexerConfig, storage: Arc<dyn StorageBackend>) -> Self {
        Self::build(config, Some(storage))
    }

    fn build(config: HolderIndexerConfig, storage: Option<Arc<dyn StorageBackend>>) -> Self {
        Self {
            config,
            store: Arc::new(LedgerStore::new()),
            storage,
            cancel: CancellationToken::new(),
            control: Mutex::new(None),
            session: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The live ledger.
    #[must_use]
    pub fn store(&self) -> Arc<LedgerStore> {
        Arc::clone(&self.store)
    }

    /// State of the tracked account in the current session, if one is running.
    pub async fn account_session(&self) -> Option<AccountSession> {
        let session = self.session.read().await.clone()?;
        let snapshot = session.read().await.clone();
        Some(snapshot)
    }

    /// Asks the running session for a full reload. Returns `false` if no session is running.
    pub async fn request_reload(&self) -> bool {
        self.send_control(SyncMessage::Reload).await
    }

    /// Switches the tracked account in the running session.
    pub async fn switch_account(&self, account: Option<Address>) -> bool {
        self.send_control(SyncMessage::AccountChanged(account)).await
    }

    async fn send_control(&self, message: SyncMessage) -> bool {
        let sender = self.control.lock().await.clone();
        match sender {
            Some(sender) => sender.send(message).await.is_ok(),
            None => false,
        }
    }

    /// Runs until cancelled, restarting from scratch whenever the chain changes.
    ///
    /// A snapshot left in storage by a previous run is installed first. If the
    /// initial load then fails, indexing continues from that snapshot.
    ///
    /// # Errors
    ///
    /// Returns configuration, network-mismatch and initial-load errors.
    pub async fn start(&self) -> Result<()> {
        self.restore_persisted().await;

        loop {
            let outcome = self.run_session().await;
            *self.control.lock().await = None;
            *self.session.write().await = None;
            let exit = outcome?;

            match exit {
                SyncExit::ChainChanged(chain_id) => {
                    logging::log(
                        logging::LogLevel::Warning,
                        &format!("Rebinding contract after switch to chain {chain_id}"),
                    );
                    self.store.clear().await;
                }
                SyncExit::Cancelled => {
                    logging::log(logging::LogLevel::Info, "Indexer stopped");
                    return Ok(());
                }
                SyncExit::SourceClosed => {
                    return Err(HolderIndexerError::InternalError(
                        "transfer source closed unexpectedly".to_string(),
                    ));
                }
            }
        }
    }

    async fn restore_persisted(&self) {
        let Some(storage) = &self.storage else {
            return;
        };
        let persisted = match (storage.load_holders().await, storage.load_watermark().await) {
            (Ok(holders), Ok(watermark)) => (holders, watermark),
            (Err(e), _) | (_, Err(e)) => {
                logging::log(
                    logging::LogLevel::Warning,
                    &format!("Ignoring persisted snapshot: {e}"),
                );
                return;
            }
        };
        let (holders, Some(watermark)) = persisted else {
            return;
        };

        logging::log(
            logging::LogLevel::Info,
            &format!(
                "Restored {} persisted holders up to {watermark}",
                holders.len()
            ),
        );
        let balances = holders.into_iter().map(|h| (h.address, h.balance));
        self.store
            .restore(LedgerSnapshot::from_balances(balances, Some(watermark)))
            .await;
    }

    async fn run_session(&self) -> Result<SyncExit> {
        let contract: Arc<dyn TokenContract> = Arc::new(RpcTokenContract::connect_http(
            &self.config.rpc_url,
            self.config.token_address,
            self.config.history_chunk_size,
        )?);

        let chain_id = contract.chain_id().await?;
        if let Some(expected) = self.config.expected_chain_id {
            if expected != chain_id {
                return Err(HolderIndexerError::NetworkMismatch {
                    expected,
                    actual: chain_id,
                });
            }
        }

        let info = contract.token_info().await?;
        log_token_info(&info, chain_id);

        let reconstructor = LedgerReconstructor::new(Arc::clone(&contract), self.config.deployment_block);
        if let Err(e) = reload_ledger(&self.store, &reconstructor, self.storage.as_deref()).await {
            let Some(watermark) = self.store.watermark().await else {
                return Err(e);
            };
            logging::log(
                logging::LogLevel::Warning,
                &format!("Continuing from the persisted ledger at {watermark}"),
            );
        }
        self.log_holders(info.decimals).await;

        let resume_block = self
            .store
            .watermark()
            .await
            .map_or(self.config.deployment_block, |w| w.block_number + 1);

        let session_cancel = self.cancel.child_token();
        let (sender, receiver) = mpsc::channel(self.config.channel_capacity);

        let source: Box<dyn TransferSource> = match &self.config.ws_url {
            Some(ws_url) => Box::new(WebSocketSource::new(
                ws_url.clone(),
                self.config.token_address,
                Arc::clone(&contract),
                resume_block,
                self.config.reconnect_delay_secs,
            )),
            None => Box::new(LogPoller::new(
                Arc::clone(&contract),
                resume_block,
                self.config.poll_interval_secs,
            )),
        };
        let forwarder = spawn_forwarder(source, sender.clone(), session_cancel.clone());
        let watcher = spawn_chain_watcher(
            Arc::clone(&contract),
            chain_id,
            Duration::from_secs(self.config.poll_interval_secs),
            sender.clone(),
            session_cancel.clone(),
        );

        let mut synchronizer = LiveSynchronizer::new(Arc::clone(&self.store), contract, reconstructor);
        if let Some(storage) = &self.storage {
            synchronizer = synchronizer.with_storage(Arc::clone(storage));
        }
        if let Some(account) = self.config.account {
            if let Err(e) = synchronizer.on_account_changed(Some(account)).await {
                logging::log(
                    logging::LogLevel::Error,
                    &format!("Failed to load account {}: {e}", format_address(&account)),
                );
            }
        }

        // Control first: a visible session always accepts messages.
        *self.control.lock().await = Some(sender);
        *self.session.write().await = Some(synchronizer.session());

        let exit = synchronizer.run(receiver, session_cancel.clone()).await;
        session_cancel.cancel();
        let _ = tokio::join!(forwarder, watcher);
        Ok(exit)
    }

    async fn log_holders(&self, decimals: u8) {
        let holders = self.store.holders().await;
        let view = HolderView::new(self.config.page_size).with_search(self.config.search_term.clone());
        let page = view.apply(&holders);

        logging::log_section(&format!("Token Holders ({})", holders.len()));
        if page.rows.is_empty() {
            println!("  (no holders match)");
        }
        for (rank, holder) in page.rows.iter().enumerate() {
            println!(
                "  {:>4}  {}  {:>24}",
                rank + 1,
                shorten_address(&holder.address),
                holder.display_balance(decimals)
            );
        }
        if page.is_truncated() {
            println!("  ... {} more", page.total_matches - page.rows.len());
        }
    }
}

fn log_token_info(info: &TokenInfo, chain_id: u64) {
    logging::log_section(&format!("{} ({})", info.name, info.symbol));
    println!("  Chain:         {chain_id}");
    println!("  Decimals:      {}", info.decimals);
    println!(
        "  Total supply:  {} {}",
        info.display_total_supply(),
        info.symbol
    );
    println!("  Tax fee:       {}", info.display_tax_fee());
    if let Some(owner) = &info.owner {
        println!("  Owner:         {}", format_address(owner));
    }
    if let Some(paused) = info.paused {
        println!("  Paused:        {paused}");
    }
}

/// Polls `eth_chainId` and reports a switch as [`SyncMessage::ChainChanged`].
fn spawn_chain_watcher(
    contract: Arc<dyn TokenContract>,
    chain_id: u64,
    interval: Duration,
    sender: mpsc::Sender<SyncMessage>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }
            match contract.chain_id().await {
                Ok(current) if current != chain_id => {
                    let _ = sender.send(SyncMessage::ChainChanged(current)).await;
                    break;
                }
                Ok(_) => {}
                Err(e) => logging::log(
                    logging::LogLevel::Debug,
                    &format!("Chain id check failed: {e}"),
                ),
            }
        }
    })
}
