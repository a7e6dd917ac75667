//! Transfer notifications and their ordering.

use alloy::primitives::{Address, B256, U256};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::bindings::IToken;
use crate::common::error::{HolderIndexerError, Result};

/// Topic hash identifying `Transfer` logs.
#[must_use]
pub fn transfer_topic() -> B256 {
    IToken::Transfer::SIGNATURE_HASH
}

/// Position of a log in the chain's total emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogPosition {
    pub block_number: u64,
    pub log_index: u64,
}

impl LogPosition {
    #[must_use]
    pub fn new(block_number: u64, log_index: u64) -> Self {
        Self {
            block_number,
            log_index,
        }
    }

    /// A position after every log in `block_number`.
    #[must_use]
    pub fn end_of_block(block_number: u64) -> Self {
        Self::new(block_number, u64::MAX)
    }
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.log_index == u64::MAX {
            write!(f, "#{}:end", self.block_number)
        } else {
            write!(f, "#{}:{}", self.block_number, self.log_index)
        }
    }
}

/// One `Transfer` event: `value` raw units moved from `from` to `to`.
///
/// The zero address as `from` marks a mint, as `to` a burn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDelta {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub position: LogPosition,
}

impl TransferDelta {
    #[must_use]
    pub fn new(from: Address, to: Address, value: U256, position: LogPosition) -> Self {
        Self {
            from,
            to,
            value,
            position,
        }
    }

    #[must_use]
    pub fn is_mint(&self) -> bool {
        self.from.is_zero()
    }

    #[must_use]
    pub fn is_burn(&self) -> bool {
        self.to.is_zero()
    }

    #[must_use]
    pub fn involves(&self, account: &Address) -> bool {
        self.from == *account || self.to == *account
    }

    /// Decodes a `Transfer` log with indexed `from` and `to`.
    ///
    /// # Errors
    ///
    /// Returns [`HolderIndexerError::DecodingError`] if the log is not a
    /// `Transfer`, is pending (no position yet), or is malformed.
    pub fn from_log(log: &Log) -> Result<Self> {
        if log.topic0() != Some(&transfer_topic()) {
            return Err(HolderIndexerError::DecodingError(format!(
                "not a Transfer log: {:?}",
                log.topic0()
            )));
        }
        let transfer = IToken::Transfer::decode_log(&log.inner)
            .map_err(|e| HolderIndexerError::DecodingError(format!("bad Transfer log: {e}")))?;

        let block_number = log
            .block_number
            .ok_or_else(|| HolderIndexerError::DecodingError("log has no block number".into()))?;
        let log_index = log
            .log_index
            .ok_or_else(|| HolderIndexerError::DecodingError("log has no log index".into()))?;

        Ok(Self::new(
            transfer.data.from,
            transfer.data.to,
            transfer.data.value,
            LogPosition::new(block_number, log_index),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{LogData, hex};

    fn sample_log() -> Log {
        let inner = alloy::primitives::Log {
            address: Address::repeat_byte(0xa8),
            data: LogData::new_unchecked(
                vec![
                    transfer_topic(),
                    Address::ZERO.into_word(),
                    Address::repeat_byte(0x11).into_word(),
                ],
                U256::from(1000u64).to_be_bytes_vec().into(),
            ),
        };
        Log {
            inner,
            block_number: Some(42),
            log_index: Some(3),
            ..Default::default()
        }
    }

    #[test]
    fn test_transfer_topic_constant() {
        assert_eq!(
            format!("0x{}", hex::encode(transfer_topic().as_slice())),
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn test_decode_mint_log() {
        let delta = TransferDelta::from_log(&sample_log()).unwrap();
        assert!(delta.is_mint());
        assert!(!delta.is_burn());
        assert_eq!(delta.to, Address::repeat_byte(0x11));
        assert_eq!(delta.value, U256::from(1000u64));
        assert_eq!(delta.position, LogPosition::new(42, 3));
    }

    #[test]
    fn test_rejects_foreign_event() {
        let mut log = sample_log();
        let (mut topics, data) = log.inner.data.clone().split();
        topics[0] = B256::repeat_byte(0x11);
        log.inner.data = LogData::new_unchecked(topics, data);
        assert!(TransferDelta::from_log(&log).is_err());
    }

    #[test]
    fn test_rejects_unindexed_transfer() {
        let mut log = sample_log();
        let (mut topics, data) = log.inner.data.clone().split();
        topics.truncate(1);
        log.inner.data = LogData::new_unchecked(topics, data);
        assert!(matches!(
            TransferDelta::from_log(&log),
            Err(HolderIndexerError::DecodingError(_))
        ));
    }

    #[test]
    fn test_rejects_pending_log() {
        let mut log = sample_log();
        log.block_number = None;
        assert!(TransferDelta::from_log(&log).is_err());
    }

    #[test]
    fn test_position_ordering() {
        assert!(LogPosition::new(5, 9) < LogPosition::new(6, 0));
        assert!(LogPosition::new(6, 0) < LogPosition::new(6, 1));
        assert!(LogPosition::new(6, 1) < LogPosition::end_of_block(6));
        assert!(LogPosition::end_of_block(6) < LogPosition::new(7, 0));
        assert_eq!(LogPosition::end_of_block(6).to_string(), "#6:end");
    }
}
