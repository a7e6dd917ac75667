//! Indexer configuration and its builder.

use alloy::primitives::Address;
use std::env;
use std::str::FromStr;

use crate::common::error::{HolderIndexerError, Result};

/// Default number of blocks fetched per `eth_getLogs` request during replay.
pub const DEFAULT_HISTORY_CHUNK_SIZE: u64 = 5_000;
/// Default polling interval for the log poller.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 4;
/// Default bound of the synchronizer's message channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1_024;
/// Default number of holders shown when `show_all` is off.
pub const DEFAULT_PAGE_SIZE: usize = 10;
/// Default delay before a dropped WebSocket is reconnected.
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;

/// Validated indexer configuration.
#[derive(Debug, Clone)]
pub struct HolderIndexerConfig {
    /// HTTP JSON-RPC endpoint used for queries and log retrieval.
    pub rpc_url: String,
    /// Optional WebSocket endpoint for live log subscriptions.
    /// When absent, the log poller is used instead.
    pub ws_url: Option<String>,
    /// Address of the token contract.
    pub token_address: Address,
    /// First block replay starts from.
    pub deployment_block: u64,
    pub history_chunk_size: u64,
    pub poll_interval_secs: u64,
    pub reconnect_delay_secs: u64,
    /// Chain the endpoint must serve. Unchecked when `None`.
    pub expected_chain_id: Option<u64>,
    /// Postgres URL for snapshot persistence.
    pub database_url: Option<String>,
    /// Account whose balance and ownership are tracked.
    pub account: Option<Address>,
    pub channel_capacity: usize,
    pub page_size: usize,
    pub search_term: String,
}

impl HolderIndexerConfig {
    /// Builds a configuration from environment variables, loading `.env` first.
    ///
    /// # Errors
    ///
    /// Returns [`HolderIndexerError::ConfigError`] if a required variable is
    /// missing or a value does not parse.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = HolderIndexerConfigBuilder::new()
            .with_rpc(require_var("RPC_URL")?)
            .token_address(require_var("TOKEN_ADDRESS")?);

        if let Some(ws_url) = optional_var("WS_URL") {
            builder = builder.with_ws(ws_url);
        }
        if let Some(block) = optional_var("DEPLOYMENT_BLOCK") {
            builder = builder.with_deployment_block(parse_number("DEPLOYMENT_BLOCK", &block)?);
        }
        if let Some(chain_id) = optional_var("CHAIN_ID") {
            builder = builder.with_expected_chain_id(parse_number("CHAIN_ID", &chain_id)?);
        }
        if let Some(database_url) = optional_var("DATABASE_URL") {
            builder = builder.with_database(database_url);
        }
        if let Some(account) = optional_var("ACCOUNT") {
            builder = builder.with_account(account);
        }
        if let Some(interval) = optional_var("POLL_INTERVAL_SECS") {
            builder = builder.with_poll_interval(parse_number("POLL_INTERVAL_SECS", &interval)?);
        }
        if let Some(chunk) = optional_var("HISTORY_CHUNK_SIZE") {
            builder = builder.with_history_chunk_size(parse_number("HISTORY_CHUNK_SIZE", &chunk)?);
        }
        if let Some(term) = optional_var("HOLDER_SEARCH") {
            builder = builder.with_search_term(term);
        }

        builder.build()
    }
}

fn require_var(name: &str) -> Result<String> {
    optional_var(name)
        .ok_or_else(|| HolderIndexerError::ConfigError(format!("{name} is not set")))
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_number(name: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|e| HolderIndexerError::ConfigError(format!("{name} is not a number: {e}")))
}

/// Builder for [`HolderIndexerConfig`].
///
/// ```no_run
/// use erc20_holder_indexer::HolderIndexerConfigBuilder;
///
/// let config = HolderIndexerConfigBuilder::new()
///     .with_rpc("https://ethereum-sepolia.publicnode.com")
///     .token_address("0xA82914604e7Df80EEEBbCA9bCE5c3Bc9fAF9B505")
///     .with_expected_chain_id(11_155_111)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Default)]
pub struct HolderIndexerConfigBuilder {
    rpc_url: Option<String>,
    ws_url: Option<String>,
    token_address: Option<String>,
    deployment_block: u64,
    history_chunk_size: Option<u64>,
    poll_interval_secs: Option<u64>,
    reconnect_delay_secs: Option<u64>,
    expected_chain_id: Option<u64>,
    database_url: Option<String>,
    account: Option<String>,
    channel_capacity: Option<usize>,
    page_size: Option<usize>,
    search_term: String,
}

impl HolderIndexerConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_rpc(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_ws(mut self, url: impl Into<String>) -> Self {
        self.ws_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn token_address(mut self, address: impl Into<String>) -> Self {
        self.token_address = Some(address.into());
        self
    }

    #[must_use]
    pub fn with_deployment_block(mut self, block: u64) -> Self {
        self.deployment_block = block;
        self
    }

    #[must_use]
    pub fn with_history_chunk_size(mut self, blocks: u64) -> Self {
        self.history_chunk_size = Some(blocks);
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, secs: u64) -> Self {
        self.poll_interval_secs = Some(secs);
        self
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, secs: u64) -> Self {
        self.reconnect_delay_secs = Some(secs);
        self
    }

    #[must_use]
    pub fn with_expected_chain_id(mut self, chain_id: u64) -> Self {
        self.expected_chain_id = Some(chain_id);
        self
    }

    #[must_use]
    pub fn with_database(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = Some(capacity);
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    #[must_use]
    pub fn with_search_term(mut self, term: impl Into<String>) -> Self {
        self.search_term = term.into();
        self
    }

    /// Validates the collected values.
    ///
    /// # Errors
    ///
    /// Returns [`HolderIndexerError::ConfigError`] describing the first invalid field.
    pub fn build(self) -> Result<HolderIndexerConfig> {
        let rpc_url = self
            .rpc_url
            .ok_or_else(|| HolderIndexerError::ConfigError("RPC URL is required".to_string()))?;
        if !(rpc_url.starts_with("http://") || rpc_url.starts_with("https://")) {
            return Err(HolderIndexerError::ConfigError(format!(
                "RPC URL must use http(s): {rpc_url}"
            )));
        }

        if let Some(ws_url) = &self.ws_url {
            if !(ws_url.starts_with("ws://") || ws_url.starts_with("wss://")) {
                return Err(HolderIndexerError::ConfigError(format!(
                    "WebSocket URL must use ws(s): {ws_url}"
                )));
            }
        }

        let token_address = parse_address(
            "token address",
            self.token_address.as_deref().ok_or_else(|| {
                HolderIndexerError::ConfigError("Token address is required".to_string())
            })?,
        )?;

        let account = self
            .account
            .as_deref()
            .map(|raw| parse_address("account", raw))
            .transpose()?;

        let history_chunk_size = self.history_chunk_size.unwrap_or(DEFAULT_HISTORY_CHUNK_SIZE);
        if history_chunk_size == 0 {
            return Err(HolderIndexerError::ConfigError(
                "History chunk size must be greater than zero".to_string(),
            ));
        }

        let poll_interval_secs = self.poll_interval_secs.unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
        if poll_interval_secs == 0 {
            return Err(HolderIndexerError::ConfigError(
                "Poll interval must be greater than zero".to_string(),
            ));
        }

        let channel_capacity = self.channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY);
        if channel_capacity == 0 {
            return Err(HolderIndexerError::ConfigError(
                "Channel capacity must be greater than zero".to_string(),
            ));
        }

        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 {
            return Err(HolderIndexerError::ConfigError(
                "Page size must be greater than zero".to_string(),
            ));
        }

        Ok(HolderIndexerConfig {
            rpc_url,
            ws_url: self.ws_url,
            token_address,
            deployment_block: self.deployment_block,
            history_chunk_size,
            poll_interval_secs,
            reconnect_delay_secs: self
                .reconnect_delay_secs
                .unwrap_or(DEFAULT_RECONNECT_DELAY_SECS),
            expected_chain_id: self.expected_chain_id,
            database_url: self.database_url,
            account,
            channel_capacity,
            page_size,
            search_term: self.search_term,
        })
    }
}

fn parse_address(field: &str, raw: &str) -> Result<Address> {
    Address::from_str(raw.trim())
        .map_err(|e| HolderIndexerError::ConfigError(format!("Invalid {field} '{raw}': {e}")))
}
