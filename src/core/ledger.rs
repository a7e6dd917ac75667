//! The in-memory holder ledger.

use alloy::primitives::{Address, U256};
use std::collections::HashMap;

use crate::types::{HolderRecord, LogPosition, TransferDelta};

/// Result of applying one [`TransferDelta`] to a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The delta is at or below the snapshot's watermark and was already counted.
    Skipped,
    /// The sender held less than `value`. The delta was applied, the sender
    /// pruned, and `shortfall` raw units could not be accounted for.
    Inconsistent { address: Address, shortfall: U256 },
}

/// Address-to-balance mapping holding only strictly positive, non-zero-address entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    balances: HashMap<Address, U256>,
    watermark: Option<LogPosition>,
}

impl LedgerSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a snapshot from `(address, balance)` pairs, dropping the zero
    /// address and zero balances. Later duplicates overwrite earlier ones.
    pub fn from_balances<I>(entries: I, watermark: Option<LogPosition>) -> Self
    where
        I: IntoIterator<Item = (Address, U256)>,
    {
        let balances = entries
            .into_iter()
            .filter(|(address, balance)| !address.is_zero() && !balance.is_zero())
            .collect();
        Self {
            balances,
            watermark,
        }
    }

    /// Last log position reflected in this snapshot.
    #[must_use]
    pub fn watermark(&self) -> Option<LogPosition> {
        self.watermark
    }

    #[must_use]
    pub fn balance_of(&self, address: &Address) -> U256 {
        self.balances.get(address).copied().unwrap_or(U256::ZERO)
    }

    #[must_use]
    pub fn contains(&self, address: &Address) -> bool {
        self.balances.contains_key(address)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.balances.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    /// Applies a transfer: debit the sender unless minting, credit the
    /// receiver unless burning, then prune anything that reached zero.
    pub fn apply(&mut self, delta: &TransferDelta) -> ApplyOutcome {
        if self
            .watermark
            .is_some_and(|watermark| delta.position <= watermark)
        {
            return ApplyOutcome::Skipped;
        }

        let mut outcome = ApplyOutcome::Applied;

        if !delta.from.is_zero() {
            let current = self.balance_of(&delta.from);
            match current.checked_sub(delta.value) {
                Some(rest) if rest.is_zero() => {
                    self.balances.remove(&delta.from);
                }
                Some(rest) => {
                    self.balances.insert(delta.from, rest);
                }
                None => {
                    self.balances.remove(&delta.from);
                    outcome = ApplyOutcome::Inconsistent {
                        address: delta.from,
                        shortfall: delta.value - current,
                    };
                }
            }
        }

        if !delta.to.is_zero() && !delta.value.is_zero() {
            let entry = self.balances.entry(delta.to).or_insert(U256::ZERO);
            *entry = entry.saturating_add(delta.value);
        }

        self.watermark = Some(delta.position);
        outcome
    }

    /// Holders sorted by balance descending, ties by address ascending.
    #[must_use]
    pub fn holders(&self) -> Vec<HolderRecord> {
        let mut holders: Vec<HolderRecord> = self
            .balances
            .iter()
            .map(|(address, balance)| HolderRecord::new(*address, *balance))
            .collect();
        sort_holders(&mut holders);
        holders
    }
}

/// Display order: balance descending, then address ascending for determinism.
pub fn sort_holders(holders: &mut [HolderRecord]) {
    holders.sort_by(|a, b| {
        b.balance
            .cmp(&a.balance)
            .then_with(|| a.address.cmp(&b.address))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn delta(from: Address, to: Address, value: u64, block: u64) -> TransferDelta {
        TransferDelta::new(from, to, U256::from(value), LogPosition::new(block, 0))
    }

    #[test]
    fn test_mint_then_transfer() {
        let (a, b) = (addr(0xa), addr(0xb));
        let mut ledger = LedgerSnapshot::new();

        assert_eq!(ledger.apply(&delta(Address::ZERO, a, 1000, 1)), ApplyOutcome::Applied);
        assert_eq!(ledger.apply(&delta(a, b, 300, 2)), ApplyOutcome::Applied);

        assert_eq!(ledger.balance_of(&a), U256::from(700u64));
        assert_eq!(ledger.balance_of(&b), U256::from(300u64));
        assert!(!ledger.contains(&Address::ZERO));
        assert_eq!(ledger.watermark(), Some(LogPosition::new(2, 0)));
    }

    #[test]
    fn test_burn_prunes_holder() {
        let (a, b) = (addr(0xa), addr(0xb));
        let mut ledger = LedgerSnapshot::new();
        ledger.apply(&delta(Address::ZERO, a, 1000, 1));
        ledger.apply(&delta(a, b, 300, 2));
        ledger.apply(&delta(b, Address::ZERO, 300, 3));

        assert!(!ledger.contains(&b));
        assert_eq!(ledger.len(), 1);
        assert_eq!(
            ledger.holders(),
            vec![HolderRecord::new(a, U256::from(700u64))]
        );
    }

    #[test]
    fn test_replayed_delta_skipped() {
        let a = addr(0xa);
        let mut ledger = LedgerSnapshot::new();
        let mint = delta(Address::ZERO, a, 50, 4);
        ledger.apply(&mint);

        assert_eq!(ledger.apply(&mint), ApplyOutcome::Skipped);
        assert_eq!(ledger.balance_of(&a), U256::from(50u64));
    }

    #[test]
    fn test_overdraft_reported_and_pruned() {
        let (a, b) = (addr(0xa), addr(0xb));
        let mut ledger = LedgerSnapshot::new();
        ledger.apply(&delta(Address::ZERO, a, 10, 1));

        let outcome = ledger.apply(&delta(a, b, 25, 2));
        assert_eq!(
            outcome,
            ApplyOutcome::Inconsistent {
                address: a,
                shortfall: U256::from(15u64)
            }
        );
        assert!(!ledger.contains(&a));
        assert_eq!(ledger.balance_of(&b), U256::from(25u64));
    }

    #[test]
    fn test_from_balances_filters() {
        let ledger = LedgerSnapshot::from_balances(
            vec![
                (addr(1), U256::from(5u64)),
                (Address::ZERO, U256::from(9u64)),
                (addr(2), U256::ZERO),
            ],
            None,
        );
        assert_eq!(ledger.len(), 1);
        assert!(ledger.contains(&addr(1)));
    }

    #[test]
    fn test_holders_sorted_with_tiebreak() {
        let ledger = LedgerSnapshot::from_balances(
            vec![
                (addr(3), U256::from(500u64)),
                (addr(1), U256::from(500u64)),
                (addr(2), U256::from(900u64)),
            ],
            None,
        );
        let order: Vec<Address> = ledger.holders().iter().map(|h| h.address).collect();
        assert_eq!(order, vec![addr(2), addr(1), addr(3)]);
    }
}
