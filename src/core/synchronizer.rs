//! Live synchronization after the initial load.
//!
//! The synchronizer drains a single [`SyncMessage`] channel. Transfers are
//! applied to the shared [`LedgerStore`] in arrival order, which the sources
//! guarantee is emission order. Account and chain changes are handled on
//! the same channel so their ordering relative to transfers is explicit.

use alloy::primitives::{Address, U256};
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::ledger::ApplyOutcome;
use super::reconstructor::LedgerReconstructor;
use super::store::{LedgerStore, ReloadTicket};
use crate::common::error::Result;
use crate::common::logging;
use crate::contract::TokenContract;
use crate::storage::StorageBackend;
use crate::types::{TransferDelta, format_address};

/// Input to the synchronizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMessage {
    /// New transfers in emission order.
    Transfers(Vec<TransferDelta>),
    /// The tracked account switched (or was disconnected).
    AccountChanged(Option<Address>),
    /// The endpoint now serves a different chain.
    ChainChanged(u64),
    /// Manual full refresh.
    Reload,
}

/// Why [`LiveSynchronizer::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncExit {
    Cancelled,
    SourceClosed,
    /// Contract bindings are tied to a network; the caller must rebuild everything.
    ChainChanged(u64),
}

/// State derived for the tracked account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountSession {
    pub account: Option<Address>,
    pub is_owner: bool,
    /// Authoritative balance from `balanceOf`, not from delta arithmetic.
    pub balance: Option<U256>,
    /// `None` when the token has no blacklist.
    pub is_blacklisted: Option<bool>,
}

/// Applies live transfers and wallet-level changes to shared state.
pub struct LiveSynchronizer {
    store: Arc<LedgerStore>,
    contract: Arc<dyn TokenContract>,
    reconstructor: LedgerReconstructor,
    session: Arc<RwLock<AccountSession>>,
    storage: Option<Arc<dyn StorageBackend>>,
    reloads: Vec<JoinHandle<Result<bool>>>,
}

impl LiveSynchronizer {
    pub fn new(
        store: Arc<LedgerStore>,
        contract: Arc<dyn TokenContract>,
        reconstructor: LedgerReconstructor,
    ) -> Self {
        Self {
            store,
            contract,
            reconstructor,
            session: Arc::new(RwLock::new(AccountSession::default())),
            storage: None,
            reloads: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Shared handle to the tracked account's state.
    #[must_use]
    pub fn session(&self) -> Arc<RwLock<AccountSession>> {
        Arc::clone(&self.session)
    }

    /// Applies one transfer. See [`LiveSynchronizer::on_transfers`].
    pub async fn on_transfer(&self, delta: TransferDelta) -> ApplyOutcome {
        self.on_transfers(vec![delta])
            .await
            .pop()
            .unwrap_or(ApplyOutcome::Skipped)
    }

    /// Applies a batch of transfers in order.
    ///
    /// If the tracked account took part in any applied transfer, its balance
    /// is re-queried from the contract. A failed re-query leaves the previous
    /// balance in place.
    pub async fn on_transfers(&self, deltas: Vec<TransferDelta>) -> Vec<ApplyOutcome> {
        let outcomes = self.store.apply(&deltas).await;

        let mut applied = 0usize;
        let mut touches_account = false;
        let account = self.session.read().await.account;

        for (delta, outcome) in deltas.iter().zip(&outcomes) {
            match outcome {
                ApplyOutcome::Skipped => continue,
                ApplyOutcome::Applied => {}
                ApplyOutcome::Inconsistent { address, shortfall } => {
                    logging::log(
                        logging::LogLevel::Warning,
                        &format!(
                            "Transfer at {} overdraws {} by {shortfall}; holder pruned",
                            delta.position,
                            format_address(address)
                        ),
                    );
                }
            }
            applied += 1;
            if account.is_some_and(|a| delta.involves(&a)) {
                touches_account = true;
            }
        }

        if applied > 0 {
            logging::log(
                logging::LogLevel::Info,
                &format!(
                    "Applied {applied} transfer(s), {} holders",
                    self.store.holder_count().await
                ),
            );
            self.persist().await;
        }

        if touches_account {
            if let Some(account) = account {
                self.refresh_account_balance(account).await;
            }
        }

        outcomes
    }

    async fn refresh_account_balance(&self, account: Address) {
        match self.contract.balance_of(account).await {
            Ok(balance) => {
                let mut session = self.session.write().await;
                // The account may have switched while the query was in flight.
                if session.account == Some(account) {
                    session.balance = Some(balance);
                }
            }
            Err(e) => logging::log(
                logging::LogLevel::Error,
                &format!("Failed to refresh balance of {}: {e}", format_address(&account)),
            ),
        }
    }

    /// Re-derives the session for a newly selected account.
    ///
    /// # Errors
    ///
    /// Propagates contract errors; the previous session is kept in that case.
    pub async fn on_account_changed(&self, account: Option<Address>) -> Result<()> {
        let Some(account) = account else {
            *self.session.write().await = AccountSession::default();
            logging::log(logging::LogLevel::Info, "Account disconnected");
            return Ok(());
        };

        let owner = self.contract.owner().await?;
        let balance = self.contract.balance_of(account).await?;
        let is_blacklisted = self.contract.is_blacklisted(account).await.ok();

        let is_owner = owner == account;
        *self.session.write().await = AccountSession {
            account: Some(account),
            is_owner,
            balance: Some(balance),
            is_blacklisted,
        };

        logging::log(
            logging::LogLevel::Success,
            &format!(
                "Tracking account {} ({}{})",
                format_address(&account),
                if is_owner { "owner" } else { "guest" },
                if is_blacklisted == Some(true) { ", blacklisted" } else { "" }
            ),
        );
        Ok(())
    }

    /// Starts a full reconstruction in the background.
    ///
    /// The ticket is taken before returning, so every transfer handled
    /// after this call is journaled for the reload. The result is committed
    /// through the store's ticket protocol: a reload superseded by a newer
    /// one is discarded and a failed reload keeps the current ledger.
    pub async fn spawn_reload(&mut self) {
        self.reloads.retain(|handle| !handle.is_finished());
        let ticket = self.store.begin_reload().await;
        let store = Arc::clone(&self.store);
        let reconstructor = self.reconstructor.clone();
        let storage = self.storage.clone();
        self.reloads.push(tokio::spawn(async move {
            finish_reload(&store, &reconstructor, ticket, storage.as_deref()).await
        }));
    }

    /// Processes messages until cancellation, channel closure, or a chain switch.
    pub async fn run(
        &mut self,
        mut receiver: mpsc::Receiver<SyncMessage>,
        cancel: CancellationToken,
    ) -> SyncExit {
        let exit = loop {
            let message = tokio::select! {
                biased;
                () = cancel.cancelled() => break SyncExit::Cancelled,
                message = receiver.recv() => message,
            };

            match message {
                None => break SyncExit::SourceClosed,
                Some(SyncMessage::Transfers(deltas)) => {
                    self.on_transfers(deltas).await;
                }
                Some(SyncMessage::AccountChanged(account)) => {
                    if let Err(e) = self.on_account_changed(account).await {
                        logging::log(
                            logging::LogLevel::Error,
                            &format!("Failed to load account state: {e}"),
                        );
                    }
                }
                Some(SyncMessage::ChainChanged(chain_id)) => {
                    logging::log(
                        logging::LogLevel::Warning,
                        &format!("Chain changed to {chain_id}; restarting from a full load"),
                    );
                    break SyncExit::ChainChanged(chain_id);
                }
                Some(SyncMessage::Reload) => self.spawn_reload().await,
            }
        };

        for handle in self.reloads.drain(..) {
            handle.abort();
        }
        exit
    }

    async fn persist(&self) {
        if let Some(storage) = &self.storage {
            persist_snapshot(&self.store, storage.as_ref()).await;
        }
    }
}

/// Runs one full reconstruction against `store`.
///
/// Returns `Ok(true)` if the result was installed and `Ok(false)` if it was
/// discarded, either because a newer reload superseded it or because the
/// live ledger had moved past it.
///
/// # Errors
///
/// Returns the reconstruction error after aborting the reload.
pub async fn reload_ledger(
    store: &LedgerStore,
    reconstructor: &LedgerReconstructor,
    storage: Option<&dyn StorageBackend>,
) -> Result<bool> {
    let ticket = store.begin_reload().await;
    finish_reload(store, reconstructor, ticket, storage).await
}

async fn finish_reload(
    store: &LedgerStore,
    reconstructor: &LedgerReconstructor,
    ticket: ReloadTicket,
    storage: Option<&dyn StorageBackend>,
) -> Result<bool> {
    match reconstructor.build().await {
        Ok(reconstruction) => {
            let holders = reconstruction.snapshot.len();
            let installed = store.commit_reload(ticket, reconstruction.snapshot).await;
            if installed {
                logging::log(
                    logging::LogLevel::Success,
                    &format!(
                        "Loaded {holders} holders via {} at block {}",
                        reconstruction.origin, reconstruction.query_block
                    ),
                );
                if let Some(storage) = storage {
                    persist_snapshot(store, storage).await;
                }
            } else {
                logging::log(
                    logging::LogLevel::Debug,
                    &format!(
                        "Reload {} not installed; result dropped",
                        ticket.generation()
                    ),
                );
            }
            Ok(installed)
        }
        Err(e) => {
            store.abort_reload(ticket).await;
            logging::log(
                logging::LogLevel::Error,
                &format!("Holder reload failed, keeping previous ledger: {e}"),
            );
            Err(e)
        }
    }
}

async fn persist_snapshot(store: &LedgerStore, storage: &dyn StorageBackend) {
    let snapshot = store.snapshot().await;
    if let Err(e) = storage
        .save_snapshot(&snapshot.holders(), snapshot.watermark())
        .await
    {
        logging::log(
            logging::LogLevel::Error,
            &format!("Failed to persist holder snapshot: {e}"),
        );
    }
}
