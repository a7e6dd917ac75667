//! Holder records and amount formatting.

use alloy::primitives::{Address, U256, hex, utils};
use serde::{Deserialize, Serialize};

/// One account with a strictly positive token balance.
///
/// `balance` is kept in raw units; decimal scaling is a display concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderRecord {
    pub address: Address,
    pub balance: U256,
}

impl HolderRecord {
    #[must_use]
    pub fn new(address: Address, balance: U256) -> Self {
        Self { address, balance }
    }

    /// Lower-case `0x` hex form of the address.
    #[must_use]
    pub fn address_hex(&self) -> String {
        format_address(&self.address)
    }

    /// Balance scaled by the token's decimal count.
    #[must_use]
    pub fn display_balance(&self, decimals: u8) -> String {
        format_units(self.balance, decimals)
    }
}

/// Renders an address as lower-case `0x` hex, the form used for comparison.
#[must_use]
pub fn format_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_slice()))
}

/// Formats a raw amount as an exact decimal string.
///
/// Trailing fractional zeros are trimmed but one fractional digit is always
/// kept, so `1000` with 4 decimals renders as `"0.1"` and `10000` as `"1.0"`.
/// Decimals beyond what a `U256` can scale fall back to the raw integer.
#[must_use]
pub fn format_units(value: U256, decimals: u8) -> String {
    let Ok(formatted) = utils::format_units(value, decimals) else {
        return value.to_string();
    };
    let trimmed = formatted.trim_end_matches('0');
    if trimmed.ends_with('.') {
        format!("{trimmed}0")
    } else {
        trimmed.to_string()
    }
}

/// Formats a tax rate stored with two implied decimals as a percentage.
#[must_use]
pub fn format_percent(rate: U256) -> String {
    format!("{}%", format_units(rate, 2))
}
