//! Search and pagination over a materialized holder list.
//!
//! Nothing here touches the ledger; the view is a pure function of the
//! holder sequence and the view state.

use alloy::primitives::Address;

use crate::types::{HolderRecord, format_address};

/// Number of hex digits kept on each side of a shortened address.
const SHORT_ADDRESS_DIGITS: usize = 8;

/// Shortened display form, e.g. `0xa8291460...faf9b505`.
#[must_use]
pub fn shorten_address(address: &Address) -> String {
    let full = format_address(address);
    let digits = &full[2..];
    format!(
        "0x{}...{}",
        &digits[..SHORT_ADDRESS_DIGITS],
        &digits[digits.len() - SHORT_ADDRESS_DIGITS..]
    )
}

/// Keeps holders whose full or shortened address contains `term`,
/// ignoring case. An empty term keeps everything; other terms are matched
/// as given, whitespace included.
#[must_use]
pub fn filter_holders(holders: &[HolderRecord], term: &str) -> Vec<HolderRecord> {
    if term.is_empty() {
        return holders.to_vec();
    }
    let needle = term.to_lowercase();

    holders
        .iter()
        .filter(|holder| {
            format_address(&holder.address).contains(&needle)
                || shorten_address(&holder.address).contains(&needle)
        })
        .cloned()
        .collect()
}

/// Ephemeral presentation state: search term, show-all flag and page size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolderView {
    pub search_term: String,
    pub show_all: bool,
    pub page_size: usize,
}

/// The rows to display plus how many holders matched in total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolderPage {
    pub rows: Vec<HolderRecord>,
    pub total_matches: usize,
}

impl HolderPage {
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.rows.len() < self.total_matches
    }
}

impl HolderView {
    #[must_use]
    pub fn new(page_size: usize) -> Self {
        Self {
            search_term: String::new(),
            show_all: false,
            page_size,
        }
    }

    #[must_use]
    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        self.search_term = term.into();
        self
    }

    #[must_use]
    pub fn showing_all(mut self, show_all: bool) -> Self {
        self.show_all = show_all;
        self
    }

    #[must_use]
    pub fn apply(&self, holders: &[HolderRecord]) -> HolderPage {
        let mut rows = filter_holders(holders, &self.search_term);
        let total_matches = rows.len();
        if !self.show_all {
            rows.truncate(self.page_size);
        }
        HolderPage {
            rows,
            total_matches,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;
    use std::str::FromStr;

    fn holder(address: &str, balance: u64) -> HolderRecord {
        HolderRecord::new(Address::from_str(address).unwrap(), U256::from(balance))
    }

    fn sample() -> Vec<HolderRecord> {
        vec![
            holder("0xA82914604e7Df80EEEBbCA9bCE5c3Bc9fAF9B505", 900),
            holder("0x1111111111111111111111111111111111111111", 500),
            holder("0x2222222222222222222222222222222222222bcd", 100),
        ]
    }

    #[test]
    fn test_shorten_address() {
        let address = Address::from_str("0xA82914604e7Df80EEEBbCA9bCE5c3Bc9fAF9B505").unwrap();
        assert_eq!(shorten_address(&address), "0xa8291460...faf9b505");
    }

    #[test]
    fn test_empty_term_is_identity() {
        let holders = sample();
        assert_eq!(filter_holders(&holders, ""), holders);
    }

    #[test]
    fn test_whitespace_term_is_matched_literally() {
        let holders = sample();
        assert!(filter_holders(&holders, " ").is_empty());
        assert!(filter_holders(&holders, " eeebbca9").is_empty());
    }

    #[test]
    fn test_case_insensitive_match() {
        let holders = sample();
        let matched = filter_holders(&holders, "EEEBBCA9");
        assert_eq!(matched, vec![holders[0].clone()]);
    }

    #[test]
    fn test_matches_shortened_form() {
        let holders = sample();
        // "...faf9" only occurs in the shortened rendering.
        let matched = filter_holders(&holders, "...FAF9");
        assert_eq!(matched, vec![holders[0].clone()]);
    }

    #[test]
    fn test_filter_is_ordered_subset() {
        let holders = sample();
        let matched = filter_holders(&holders, "B");
        assert_eq!(matched.len(), 2);
        assert_eq!(matched[0], holders[0]);
        assert_eq!(matched[1], holders[2]);
        for record in &matched {
            let full = format_address(&record.address);
            let short = shorten_address(&record.address);
            assert!(full.contains('b') || short.contains('b'));
        }
    }

    #[test]
    fn test_pagination() {
        let holders = sample();
        let page = HolderView::new(2).apply(&holders);
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.total_matches, 3);
        assert!(page.is_truncated());

        let page = HolderView::new(2).showing_all(true).apply(&holders);
        assert_eq!(page.rows, holders);
        assert!(!page.is_truncated());
    }

    #[test]
    fn test_search_then_paginate() {
        let holders = sample();
        let page = HolderView::new(1).with_search("11111").apply(&holders);
        assert_eq!(page.rows, vec![holders[1].clone()]);
        assert_eq!(page.total_matches, 1);
    }
}
