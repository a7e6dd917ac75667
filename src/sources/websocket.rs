//! WebSocket-based transfer source for real-time indexing
//!
//! Subscribes to `Transfer` logs of the token contract with `eth_subscribe`.
//! Each (re)connection first backfills the blocks since the last yielded
//! transfer over HTTP, so a dropped socket never leaves a gap.

use alloy::primitives::{Address, hex};
use alloy::rpc::types::Log;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, sleep};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::TransferSource;
use crate::common::error::{HolderIndexerError, Result};
use crate::common::logging;
use crate::contract::TokenContract;
use crate::types::{LogPosition, TransferDelta, transfer_topic};

/// Upper bound on transfers drained into one batch.
const MAX_BATCH: usize = 256;

/// WebSocket transfer source
///
/// Connects to an Ethereum WebSocket endpoint and subscribes to the token's
/// `Transfer` logs. Automatically handles reconnection on disconnect.
pub struct WebSocketSource {
    /// WebSocket URL (ws:// or wss://)
    ws_url: String,
    /// Token contract whose logs are subscribed to
    token: Address,
    /// Reconnection delay in seconds
    reconnect_delay_secs: u64,
    /// HTTP binding used to backfill across (re)connections
    backfill: Arc<dyn TokenContract>,
    /// Block the next backfill starts from
    resume_block: u64,
    /// Last position handed out; anything at or below it is a duplicate
    last_position: Option<LogPosition>,
    /// Internal state
    state: WebSocketState,
}

/// Internal WebSocket state
enum WebSocketState {
    Disconnected,
    Connected {
        subscription_id: String,
        receiver: mpsc::UnboundedReceiver<Result<TransferDelta>>,
        needs_backfill: bool,
    },
}

/// Log notification from `eth_subscribe`
#[derive(Debug, Deserialize)]
struct LogNotification {
    params: NotificationParams,
}

#[derive(Debug, Deserialize)]
struct NotificationParams {
    result: Log,
}

/// Decodes one socket message. `None` for anything that is not a live
/// `Transfer` notification (confirmations, removed logs).
fn decode_notification(text: &str) -> Option<Result<TransferDelta>> {
    let notification = serde_json::from_str::<LogNotification>(text).ok()?;
    let log = notification.params.result;
    if log.removed {
        return None;
    }
    Some(TransferDelta::from_log(&log))
}

/// Subscription response
#[derive(Debug, Deserialize)]
struct SubscriptionResponse {
    result: String,
}

impl WebSocketSource {
    /// Creates a new WebSocket source
    ///
    /// # Arguments
    ///
    /// * `ws_url` - WebSocket URL (e.g., "ws://127.0.0.1:8546")
    /// * `token` - Token contract to subscribe to
    /// * `backfill` - HTTP binding used to close gaps around connections
    /// * `resume_block` - First block not covered by the initial load
    /// * `reconnect_delay_secs` - Delay between reconnection attempts
    pub fn new(
        ws_url: impl Into<String>,
        token: Address,
        backfill: Arc<dyn TokenContract>,
        resume_block: u64,
        reconnect_delay_secs: u64,
    ) -> Self {
        Self {
            ws_url: ws_url.into(),
            token,
            reconnect_delay_secs,
            backfill,
            resume_block,
            last_position: None,
            state: WebSocketState::Disconnected,
        }
    }

    /// Connects to WebSocket and subscribes to the token's Transfer logs
    async fn connect(&mut self) -> Result<()> {
        logging::log(
            logging::LogLevel::Info,
            &format!("Connecting to WebSocket: {}", self.ws_url),
        );

        let (ws_stream, _) = connect_async(&self.ws_url).await.map_err(|e| {
            HolderIndexerError::RpcError(format!("WebSocket connection failed: {e}"))
        })?;

        let (mut write, mut read) = ws_stream.split();

        let subscribe_request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_subscribe",
            "params": [
                "logs",
                {
                    "address": format!("0x{}", hex::encode(self.token.as_slice())),
                    "topics": [format!("0x{}", hex::encode(transfer_topic().as_slice()))]
                }
            ]
        });

        write
            .send(Message::Text(subscribe_request.to_string()))
            .await
            .map_err(|e| {
                HolderIndexerError::RpcError(format!("Failed to send subscription: {e}"))
            })?;

        // Wait for subscription confirmation
        let subscription_id = loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(response) = serde_json::from_str::<SubscriptionResponse>(&text) {
                        break response.result;
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => {
                    return Err(HolderIndexerError::RpcError(
                        "WebSocket closed before subscription was confirmed".to_string(),
                    ));
                }
            }
        };

        logging::log(
            logging::LogLevel::Success,
            &format!("WebSocket subscribed (ID: {subscription_id})"),
        );

        let (tx, rx) = mpsc::unbounded_channel();

        // Keep the write half alive inside the reader task so the socket stays open.
        // An undecodable notification is forwarded and ends the task; the
        // next batch then reconnects and backfills over HTTP.
        tokio::spawn(async move {
            let _write = write;
            while let Some(Ok(message)) = read.next().await {
                let Message::Text(text) = message else {
                    continue;
                };
                let Some(decoded) = decode_notification(&text) else {
                    continue;
                };
                let failed = decoded.is_err();
                if tx.send(decoded).is_err() || failed {
                    break;
                }
            }
        });

        self.state = WebSocketState::Connected {
            subscription_id,
            receiver: rx,
            needs_backfill: true,
        };

        Ok(())
    }

    /// Ensures connection is established, reconnecting if necessary
    async fn ensure_connected(&mut self) -> Result<()> {
        match &self.state {
            WebSocketState::Disconnected => {
                self.connect().await?;
            }
            WebSocketState::Connected {
                receiver,
                subscription_id,
                ..
            } => {
                if receiver.is_closed() {
                    logging::log(
                        logging::LogLevel::Warning,
                        &format!("WebSocket subscription {subscription_id} dropped, reconnecting..."),
                    );
                    sleep(Duration::from_secs(self.reconnect_delay_secs)).await;
                    self.state = WebSocketState::Disconnected;
                    self.connect().await?;
                }
            }
        }
        Ok(())
    }

    /// Drops duplicates and anything already handed out, then records progress.
    fn admit(&mut self, mut deltas: Vec<TransferDelta>) -> Vec<TransferDelta> {
        deltas.sort_by_key(|delta| delta.position);
        deltas.dedup_by_key(|delta| delta.position);
        if let Some(last) = self.last_position {
            deltas.retain(|delta| delta.position > last);
        }
        if let Some(newest) = deltas.last() {
            self.last_position = Some(newest.position);
            self.resume_block = newest.position.block_number;
        }
        deltas
    }
}

#[async_trait]
impl TransferSource for WebSocketSource {
    async fn next_batch(&mut self) -> Result<Vec<TransferDelta>> {
        self.ensure_connected().await?;

        let WebSocketState::Connected {
            receiver,
            needs_backfill,
            ..
        } = &mut self.state
        else {
            return Err(HolderIndexerError::InternalError(
                "WebSocket not connected".to_string(),
            ));
        };

        let mut deltas = Vec::new();
        let mut failure = None;

        if *needs_backfill {
            let head = self.backfill.latest_block().await?;
            if head >= self.resume_block {
                deltas = self.backfill.transfer_history(self.resume_block, head).await?;
            }
            *needs_backfill = false;
        } else {
            // Wait for at least one transfer
            match receiver.recv().await {
                Some(Ok(delta)) => deltas.push(delta),
                Some(Err(e)) => failure = Some(e),
                None => {}
            }
        }

        // Collect any additional transfers that are immediately available
        while failure.is_none() && deltas.len() < MAX_BATCH {
            match receiver.try_recv() {
                Ok(Ok(delta)) => deltas.push(delta),
                Ok(Err(e)) => failure = Some(e),
                Err(_) => break,
            }
        }

        if let Some(e) = failure {
            // Nothing from this batch is admitted, so the reconnect
            // backfill starts from the last transfer actually handed out.
            self.state = WebSocketState::Disconnected;
            return Err(e);
        }

        Ok(self.admit(deltas))
    }

    fn source_name(&self) -> &'static str {
        "WebSocket"
    }
}
