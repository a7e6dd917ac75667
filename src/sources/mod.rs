//! Live transfer sources.
//!
//! A source yields batches of [`TransferDelta`]s in emission order. The
//! forwarder pumps them into the synchronizer's bounded channel, so a slow
//! synchronizer applies backpressure to the source.

pub mod poller;
pub mod websocket;

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::common::error::Result;
use crate::common::logging;
use crate::core::SyncMessage;
use crate::types::TransferDelta;

pub use poller::LogPoller;
pub use websocket::WebSocketSource;

/// Delay before retrying after a source error.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[async_trait]
pub trait TransferSource: Send {
    /// Waits for the next batch of transfers. Batches may be empty.
    async fn next_batch(&mut self) -> Result<Vec<TransferDelta>>;

    fn source_name(&self) -> &'static str;
}

/// Spawns a task forwarding batches from `source` until cancelled or the
/// receiver is dropped.
pub fn spawn_forwarder(
    mut source: Box<dyn TransferSource>,
    sender: mpsc::Sender<SyncMessage>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        logging::log(
            logging::LogLevel::Info,
            &format!("Listening for transfers via {}", source.source_name()),
        );
        loop {
            let batch = tokio::select! {
                () = cancel.cancelled() => break,
                batch = source.next_batch() => batch,
            };

            match batch {
                Ok(deltas) if deltas.is_empty() => {}
                Ok(deltas) => {
                    if sender.send(SyncMessage::Transfers(deltas)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    logging::log(
                        logging::LogLevel::Error,
                        &format!("{} source error: {e}", source.source_name()),
                    );
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(ERROR_BACKOFF) => {}
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, U256};
    use crate::types::LogPosition;
    use std::collections::VecDeque;

    struct ScriptedSource {
        batches: VecDeque<Vec<TransferDelta>>,
    }

    #[async_trait]
    impl TransferSource for ScriptedSource {
        async fn next_batch(&mut self) -> Result<Vec<TransferDelta>> {
            match self.batches.pop_front() {
                Some(batch) => Ok(batch),
                None => std::future::pending().await,
            }
        }

        fn source_name(&self) -> &'static str {
            "Scripted"
        }
    }

    fn mint(block: u64) -> TransferDelta {
        TransferDelta::new(
            Address::ZERO,
            Address::repeat_byte(1),
            U256::from(1u64),
            LogPosition::new(block, 0),
        )
    }

    #[tokio::test]
    async fn test_forwarder_preserves_order_and_skips_empty() {
        let source = ScriptedSource {
            batches: VecDeque::from(vec![vec![mint(1)], vec![], vec![mint(2), mint(3)]]),
        };
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = spawn_forwarder(Box::new(source), tx, cancel.clone());

        assert_eq!(rx.recv().await, Some(SyncMessage::Transfers(vec![mint(1)])));
        assert_eq!(
            rx.recv().await,
            Some(SyncMessage::Transfers(vec![mint(2), mint(3)]))
        );

        cancel.cancel();
        handle.await.unwrap();
    }
}
