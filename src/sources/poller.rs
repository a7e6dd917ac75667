//! Polling transfer source built on `eth_getLogs`.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::TransferSource;
use crate::common::error::Result;
use crate::contract::TokenContract;
use crate::types::TransferDelta;

/// Polls for transfers in blocks after the last one seen.
pub struct LogPoller {
    contract: Arc<dyn TokenContract>,
    next_block: u64,
    poll_interval: Duration,
    first_poll: bool,
}

impl LogPoller {
    /// Creates a poller that starts at `start_block`.
    pub fn new(contract: Arc<dyn TokenContract>, start_block: u64, poll_interval_secs: u64) -> Self {
        Self {
            contract,
            next_block: start_block,
            poll_interval: Duration::from_secs(poll_interval_secs),
            first_poll: true,
        }
    }

    #[must_use]
    pub fn next_block(&self) -> u64 {
        self.next_block
    }
}

#[async_trait]
impl TransferSource for LogPoller {
    async fn next_batch(&mut self) -> Result<Vec<TransferDelta>> {
        if !self.first_poll {
            tokio::time::sleep(self.poll_interval).await;
        }
        self.first_poll = false;

        let head = self.contract.latest_block().await?;
        if head < self.next_block {
            return Ok(Vec::new());
        }

        let deltas = self
            .contract
            .transfer_history(self.next_block, head)
            .await?;
        self.next_block = head + 1;
        Ok(deltas)
    }

    fn source_name(&self) -> &'static str {
        "Poller"
    }
}
