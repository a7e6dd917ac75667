//! Shared, serialized access to the current [`LedgerSnapshot`].
//!
//! Full reloads and live deltas both mutate the ledger. Every mutation runs
//! under one write lock, and reloads follow a ticket protocol:
//!
//! - [`LedgerStore::begin_reload`] hands out a ticket with a fresh generation
//!   and starts journaling applied deltas.
//! - [`LedgerStore::commit_reload`] accepts only the most recently started
//!   generation, and only a snapshot reaching at least the watermark the
//!   ledger had when the ticket was issued. The new snapshot is swapped in and
//!   every journaled delta past its watermark is re-applied, so transfers seen
//!   during the reload are not lost.
//! - [`LedgerStore::abort_reload`] leaves the previous snapshot in place.

use tokio::sync::RwLock;

use super::ledger::{ApplyOutcome, LedgerSnapshot};
use crate::common::logging;
use crate::types::{HolderRecord, LogPosition, TransferDelta};

/// Proof that a reload was started; required to commit it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadTicket {
    generation: u64,
    /// Ledger watermark when the reload began.
    baseline: Option<LogPosition>,
}

impl ReloadTicket {
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Default)]
struct StoreState {
    snapshot: LedgerSnapshot,
    journal: Vec<TransferDelta>,
    started: u64,
    settled: u64,
}

impl StoreState {
    fn reload_pending(&self) -> bool {
        self.started > self.settled
    }
}

/// Owner of the process-wide ledger.
#[derive(Debug, Default)]
pub struct LedgerStore {
    state: RwLock<StoreState>,
}

impl LedgerStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_snapshot(snapshot: LedgerSnapshot) -> Self {
        Self {
            state: RwLock::new(StoreState {
                snapshot,
                ..StoreState::default()
            }),
        }
    }

    /// Applies deltas in order, journaling them while a reload is in flight.
    pub async fn apply(&self, deltas: &[TransferDelta]) -> Vec<ApplyOutcome> {
        let mut state = self.state.write().await;
        let pending = state.reload_pending();
        let mut outcomes = Vec::with_capacity(deltas.len());
        for delta in deltas {
            outcomes.push(state.snapshot.apply(delta));
            if pending {
                state.journal.push(delta.clone());
            }
        }
        outcomes
    }

    pub async fn begin_reload(&self) -> ReloadTicket {
        let mut state = self.state.write().await;
        state.started += 1;
        ReloadTicket {
            generation: state.started,
            baseline: state.snapshot.watermark(),
        }
    }

    /// Installs a reload result.
    ///
    /// Returns `false` and discards the result if a newer reload has started
    /// since `ticket` was issued, or if the result ends before deltas the
    /// ledger had already applied when the reload began. Those deltas are
    /// not journaled, so installing such a snapshot would drop them.
    pub async fn commit_reload(&self, ticket: ReloadTicket, snapshot: LedgerSnapshot) -> bool {
        let mut state = self.state.write().await;
        if ticket.generation != state.started {
            return false;
        }

        if snapshot.watermark() < ticket.baseline {
            logging::log(
                logging::LogLevel::Warning,
                &format!(
                    "Discarding reload ending at {}: live ledger already at {}",
                    snapshot
                        .watermark()
                        .map_or_else(|| "genesis".to_string(), |w| w.to_string()),
                    ticket
                        .baseline
                        .map_or_else(|| "genesis".to_string(), |w| w.to_string()),
                ),
            );
            state.journal.clear();
            state.settled = ticket.generation;
            return false;
        }

        let mut snapshot = snapshot;
        for delta in std::mem::take(&mut state.journal) {
            snapshot.apply(&delta);
        }
        state.snapshot = snapshot;
        state.settled = ticket.generation;
        true
    }

    /// Gives up on a reload, keeping the current snapshot.
    pub async fn abort_reload(&self, ticket: ReloadTicket) {
        let mut state = self.state.write().await;
        if ticket.generation == state.started {
            state.journal.clear();
            state.settled = ticket.generation;
        }
    }

    /// Replaces the ledger outright, e.g. with a previously persisted
    /// snapshot before the first reload.
    pub async fn restore(&self, snapshot: LedgerSnapshot) {
        let mut state = self.state.write().await;
        state.snapshot = snapshot;
        state.journal.clear();
    }

    /// Drops everything, e.g. after the endpoint switched networks.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.snapshot = LedgerSnapshot::new();
        state.journal.clear();
        state.settled = state.started;
    }

    pub async fn holders(&self) -> Vec<HolderRecord> {
        self.state.read().await.snapshot.holders()
    }

    pub async fn snapshot(&self) -> LedgerSnapshot {
        self.state.read().await.snapshot.clone()
    }

    pub async fn watermark(&self) -> Option<LogPosition> {
        self.state.read().await.snapshot.watermark()
    }

    pub async fn holder_count(&self) -> usize {
        self.state.read().await.snapshot.len()
    }

    pub async fn reload_in_flight(&self) -> bool {
        self.state.read().await.reload_pending()
    }
}
