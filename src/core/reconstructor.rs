//! Full holder-ledger reconstruction.
//!
//! Two strategies produce the same [`LedgerSnapshot`]:
//!
//! 1. **Aggregate** - one `getAllHolders()` call pinned to the chain head.
//! 2. **Replay** - every `Transfer` from the deployment block to the same
//!    head, folded into per-address running totals.
//!
//! The aggregate path is preferred; any failure there falls back to replay
//! without surfacing an error.

use alloy::primitives::{Address, U256};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::ledger::LedgerSnapshot;
use crate::common::error::{HolderIndexerError, Result};
use crate::common::logging;
use crate::contract::{HolderAggregate, TokenContract};
use crate::types::{LogPosition, TransferDelta};

/// Which strategy produced a reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOrigin {
    Aggregate,
    Replay,
}

impl fmt::Display for LedgerOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aggregate => write!(f, "aggregate query"),
            Self::Replay => write!(f, "event replay"),
        }
    }
}

/// A freshly built ledger and the head block it reflects.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub snapshot: LedgerSnapshot,
    pub origin: LedgerOrigin,
    pub query_block: u64,
}

/// Signed running total kept as separate credit and debit sums.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunningTotal {
    pub credited: U256,
    pub debited: U256,
}

impl RunningTotal {
    /// Strictly positive net balance, if any.
    #[must_use]
    pub fn positive(&self) -> Option<U256> {
        self.credited
            .checked_sub(self.debited)
            .filter(|net| !net.is_zero())
    }
}

/// Folds an ordered transfer history into running totals.
///
/// The zero address is credited like any receiver; it is excluded only when
/// the totals are turned into a snapshot.
#[must_use]
pub fn accumulate_transfers(deltas: &[TransferDelta]) -> HashMap<Address, RunningTotal> {
    let mut totals: HashMap<Address, RunningTotal> = HashMap::new();
    for delta in deltas {
        if !delta.from.is_zero() {
            let sender = totals.entry(delta.from).or_default();
            sender.debited = sender.debited.saturating_add(delta.value);
        }
        let receiver = totals.entry(delta.to).or_default();
        receiver.credited = receiver.credited.saturating_add(delta.value);
    }
    totals
}

/// Replays a complete, ordered transfer history into a snapshot.
#[must_use]
pub fn replay_transfers(deltas: &[TransferDelta], watermark: Option<LogPosition>) -> LedgerSnapshot {
    let totals = accumulate_transfers(deltas);
    LedgerSnapshot::from_balances(
        totals
            .into_iter()
            .filter_map(|(address, total)| total.positive().map(|balance| (address, balance))),
        watermark,
    )
}

/// Zips the aggregate's parallel sequences into a snapshot.
///
/// # Errors
///
/// Returns [`HolderIndexerError::ContractError`] if the sequences differ in length.
pub fn snapshot_from_aggregate(
    aggregate: HolderAggregate,
    watermark: Option<LogPosition>,
) -> Result<LedgerSnapshot> {
    if aggregate.addresses.len() != aggregate.balances.len() {
        return Err(HolderIndexerError::ContractError(format!(
            "getAllHolders returned {} addresses but {} balances",
            aggregate.addresses.len(),
            aggregate.balances.len()
        )));
    }
    Ok(LedgerSnapshot::from_balances(
        aggregate.addresses.into_iter().zip(aggregate.balances),
        watermark,
    ))
}

/// Builds complete ledgers against a [`TokenContract`].
#[derive(Clone)]
pub struct LedgerReconstructor {
    contract: Arc<dyn TokenContract>,
    deployment_block: u64,
}

impl LedgerReconstructor {
    pub fn new(contract: Arc<dyn TokenContract>, deployment_block: u64) -> Self {
        Self {
            contract,
            deployment_block,
        }
    }

    /// Builds the ledger as of the current chain head.
    ///
    /// # Errors
    ///
    /// Fails if the head cannot be read, or with
    /// [`HolderIndexerError::ReconstructionFailed`] when both strategies fail.
    pub async fn build(&self) -> Result<Reconstruction> {
        let head = self.contract.latest_block().await?;
        let watermark = Some(LogPosition::end_of_block(head));

        let aggregate_error = match self.build_from_aggregate(head, watermark).await {
            Ok(snapshot) => {
                return Ok(Reconstruction {
                    snapshot,
                    origin: LedgerOrigin::Aggregate,
                    query_block: head,
                });
            }
            Err(e) => e,
        };

        logging::log(
            logging::LogLevel::Debug,
            &format!("Aggregate holder query unavailable ({aggregate_error}), replaying transfers"),
        );

        match self.build_from_replay(head, watermark).await {
            Ok(snapshot) => Ok(Reconstruction {
                snapshot,
                origin: LedgerOrigin::Replay,
                query_block: head,
            }),
            Err(replay_error) => Err(HolderIndexerError::ReconstructionFailed {
                aggregate: aggregate_error.to_string(),
                replay: replay_error.to_string(),
            }),
        }
    }

    async fn build_from_aggregate(
        &self,
        head: u64,
        watermark: Option<LogPosition>,
    ) -> Result<LedgerSnapshot> {
        let aggregate = self.contract.holders_aggregate(head).await?;
        let snapshot = snapshot_from_aggregate(aggregate, watermark)?;

        if let Ok(count) = self.contract.holder_count(head).await {
            if usize::try_from(count).ok() != Some(snapshot.len()) {
                logging::log(
                    logging::LogLevel::Warning,
                    &format!(
                        "holderCount() reports {count} holders, aggregate returned {}",
                        snapshot.len()
                    ),
                );
            }
        }

        Ok(snapshot)
    }

    async fn build_from_replay(
        &self,
        head: u64,
        watermark: Option<LogPosition>,
    ) -> Result<LedgerSnapshot> {
        if head < self.deployment_block {
            return Ok(LedgerSnapshot::from_balances(Vec::new(), watermark));
        }
        let history = self
            .contract
            .transfer_history(self.deployment_block, head)
            .await?;
        logging::log(
            logging::LogLevel::Debug,
            &format!("Replaying {} transfers up to block {head}", history.len()),
        );
        Ok(replay_transfers(&history, watermark))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! In-memory [`TokenContract`] used across the core tests.

    use super::*;
    use crate::contract::TokenInfo;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::Notify;

    #[derive(Default)]
    pub struct MockContract {
        pub head: Mutex<u64>,
        pub chain_id: u64,
        pub owner: Address,
        pub aggregate: Mutex<Option<HolderAggregate>>,
        pub history: Mutex<Vec<TransferDelta>>,
        pub balances: Mutex<HashMap<Address, U256>>,
        pub blacklist: Mutex<Vec<Address>>,
        pub fail_history: bool,
        /// When set, history queries wait for one notification each.
        pub history_gate: Option<Arc<Notify>>,
        pub history_calls: AtomicUsize,
        pub balance_calls: AtomicUsize,
    }

    impl MockContract {
        pub fn with_history(head: u64, history: Vec<TransferDelta>) -> Self {
            Self {
                head: Mutex::new(head),
                history: Mutex::new(history),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl TokenContract for MockContract {
        async fn latest_block(&self) -> Result<u64> {
            Ok(*self.head.lock().unwrap())
        }

        async fn chain_id(&self) -> Result<u64> {
            Ok(self.chain_id)
        }

        async fn token_info(&self) -> Result<TokenInfo> {
            Ok(TokenInfo {
                name: "Robusta".to_string(),
                symbol: "TR".to_string(),
                decimals: 4,
                total_supply: U256::ZERO,
                tax_fee: None,
                owner: Some(self.owner),
                paused: None,
            })
        }

        async fn decimals(&self) -> Result<u8> {
            Ok(4)
        }

        async fn balance_of(&self, account: Address) -> Result<U256> {
            self.balance_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .balances
                .lock()
                .unwrap()
                .get(&account)
                .copied()
                .unwrap_or(U256::ZERO))
        }

        async fn owner(&self) -> Result<Address> {
            Ok(self.owner)
        }

        async fn is_blacklisted(&self, account: Address) -> Result<bool> {
            Ok(self.blacklist.lock().unwrap().contains(&account))
        }

        async fn holders_aggregate(&self, _at_block: u64) -> Result<HolderAggregate> {
            self.aggregate.lock().unwrap().clone().ok_or_else(|| {
                HolderIndexerError::ContractError("execution reverted".to_string())
            })
        }

        async fn holder_count(&self, _at_block: u64) -> Result<u64> {
            Err(HolderIndexerError::ContractError("execution reverted".to_string()))
        }

        async fn transfer_history(
            &self,
            from_block: u64,
            to_block: u64,
        ) -> Result<Vec<TransferDelta>> {
            self.history_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.history_gate {
                gate.notified().await;
            }
            if self.fail_history {
                return Err(HolderIndexerError::RpcError("connection refused".to_string()));
            }
            Ok(self
                .history
                .lock()
                .unwrap()
                .iter()
                .filter(|d| (from_block..=to_block).contains(&d.position.block_number))
                .cloned()
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::MockContract;
    use super::*;
    use crate::types::HolderRecord;
    use std::sync::atomic::Ordering;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn delta(from: Address, to: Address, value: u64, block: u64) -> TransferDelta {
        TransferDelta::new(from, to, U256::from(value), LogPosition::new(block, 0))
    }

    #[test]
    fn test_replay_mint_and_transfer() {
        let (a, b) = (addr(0xa), addr(0xb));
        let history = vec![delta(Address::ZERO, a, 1000, 1), delta(a, b, 300, 2)];

        let snapshot = replay_transfers(&history, None);
        let holders = snapshot.holders();

        assert_eq!(
            holders,
            vec![
                HolderRecord::new(a, U256::from(700u64)),
                HolderRecord::new(b, U256::from(300u64)),
            ]
        );
        assert_eq!(holders[0].display_balance(4), "0.07");
        assert_eq!(holders[1].display_balance(4), "0.03");
        assert!(!snapshot.contains(&Address::ZERO));
    }

    #[test]
    fn test_replay_matches_signed_sums() {
        let (a, b, c) = (addr(1), addr(2), addr(3));
        let history = vec![
            delta(Address::ZERO, a, 500, 1),
            delta(Address::ZERO, b, 200, 1),
            delta(a, c, 120, 2),
            delta(b, a, 50, 3),
            delta(c, Address::ZERO, 20, 4),
            delta(a, b, 430, 5),
        ];

        let totals = accumulate_transfers(&history);
        let snapshot = replay_transfers(&history, None);

        for address in [a, b, c] {
            let received: u64 = history
                .iter()
                .filter(|d| d.to == address)
                .map(|d| d.value.to::<u64>())
                .sum();
            let sent: u64 = history
                .iter()
                .filter(|d| d.from == address)
                .map(|d| d.value.to::<u64>())
                .sum();
            let expected = U256::from(received - sent);
            assert_eq!(snapshot.balance_of(&address), expected);
            assert_eq!(totals[&address].positive().unwrap_or(U256::ZERO), expected);
        }
        assert_eq!(snapshot.balance_of(&a), U256::ZERO);
        assert!(!snapshot.contains(&a));
        assert!(totals.contains_key(&Address::ZERO));
        assert!(!snapshot.contains(&Address::ZERO));
    }

    #[test]
    fn test_replay_is_idempotent() {
        let (a, b) = (addr(1), addr(2));
        let history = vec![
            delta(Address::ZERO, a, 1000, 1),
            delta(a, b, 400, 2),
            delta(b, a, 100, 3),
        ];
        assert_eq!(replay_transfers(&history, None), replay_transfers(&history, None));
    }

    #[test]
    fn test_aggregate_length_mismatch_rejected() {
        let aggregate = HolderAggregate {
            addresses: vec![addr(1), addr(2)],
            balances: vec![U256::from(1u64)],
        };
        assert!(snapshot_from_aggregate(aggregate, None).is_err());
    }

    #[tokio::test]
    async fn test_build_prefers_aggregate() {
        let (a, b) = (addr(0xa), addr(0xb));
        let contract = Arc::new(MockContract::with_history(10, vec![]));
        *contract.aggregate.lock().unwrap() = Some(HolderAggregate {
            addresses: vec![a, b],
            balances: vec![U256::from(500u64), U256::from(500u64)],
        });

        let reconstructor = LedgerReconstructor::new(contract.clone(), 0);
        let result = reconstructor.build().await.unwrap();

        assert_eq!(result.origin, LedgerOrigin::Aggregate);
        assert_eq!(result.query_block, 10);
        assert_eq!(
            result.snapshot.holders(),
            vec![
                HolderRecord::new(a, U256::from(500u64)),
                HolderRecord::new(b, U256::from(500u64)),
            ]
        );
        assert_eq!(contract.history_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_build_falls_back_to_replay() {
        let (a, b) = (addr(0xa), addr(0xb));
        let contract = Arc::new(MockContract::with_history(
            5,
            vec![delta(Address::ZERO, a, 1000, 1), delta(a, b, 300, 2)],
        ));

        let result = LedgerReconstructor::new(contract.clone(), 0)
            .build()
            .await
            .unwrap();

        assert_eq!(result.origin, LedgerOrigin::Replay);
        assert_eq!(result.snapshot.balance_of(&a), U256::from(700u64));
        assert_eq!(result.snapshot.balance_of(&b), U256::from(300u64));
        assert_eq!(
            result.snapshot.watermark(),
            Some(LogPosition::end_of_block(5))
        );
        assert_eq!(contract.history_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_build_reports_double_failure() {
        let contract = Arc::new(MockContract {
            fail_history: true,
            ..MockContract::default()
        });

        let err = LedgerReconstructor::new(contract, 0).build().await.unwrap_err();
        assert!(matches!(
            err,
            HolderIndexerError::ReconstructionFailed { .. }
        ));
    }
}
