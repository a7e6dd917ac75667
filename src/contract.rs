//! Read-only binding to the token contract.
//!
//! [`TokenContract`] is the seam between ledger maintenance and the chain;
//! tests substitute in-memory implementations.

use alloy::eips::BlockId;
use alloy::primitives::{Address, U256};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::Filter;
use alloy::sol_types::SolEvent;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;

use crate::bindings::IToken;
use crate::common::error::{HolderIndexerError, Result};
use crate::types::{TransferDelta, format_percent, format_units};

/// Token metadata shown alongside the holder list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: U256,
    /// Transfer tax with two implied decimals (`250` is 2.5%).
    pub tax_fee: Option<U256>,
    pub owner: Option<Address>,
    pub paused: Option<bool>,
}

impl TokenInfo {
    #[must_use]
    pub fn display_total_supply(&self) -> String {
        format_units(self.total_supply, self.decimals)
    }

    #[must_use]
    pub fn display_tax_fee(&self) -> String {
        self.tax_fee
            .map_or_else(|| "n/a".to_string(), format_percent)
    }
}

/// Parallel address and balance sequences from `getAllHolders()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HolderAggregate {
    pub addresses: Vec<Address>,
    pub balances: Vec<U256>,
}

/// Queries the indexer needs from the token contract.
#[async_trait]
pub trait TokenContract: Send + Sync {
    /// Current chain head.
    async fn latest_block(&self) -> Result<u64>;

    async fn chain_id(&self) -> Result<u64>;

    async fn token_info(&self) -> Result<TokenInfo>;

    async fn decimals(&self) -> Result<u8>;

    async fn balance_of(&self, account: Address) -> Result<U256>;

    async fn owner(&self) -> Result<Address>;

    async fn is_blacklisted(&self, account: Address) -> Result<bool>;

    /// Current holder set as computed by the contract, if it exposes one.
    async fn holders_aggregate(&self, at_block: u64) -> Result<HolderAggregate>;

    async fn holder_count(&self, at_block: u64) -> Result<u64>;

    /// Every `Transfer` in `[from_block, to_block]`, in emission order.
    async fn transfer_history(&self, from_block: u64, to_block: u64) -> Result<Vec<TransferDelta>>;
}

/// [`TokenContract`] backed by an HTTP JSON-RPC endpoint.
pub struct RpcTokenContract {
    token: IToken::ITokenInstance<RootProvider>,
    history_chunk_size: u64,
}

impl RpcTokenContract {
    pub fn new(provider: RootProvider, address: Address, history_chunk_size: u64) -> Self {
        Self {
            token: IToken::new(address, provider),
            history_chunk_size: history_chunk_size.max(1),
        }
    }

    /// Connects an HTTP provider to `rpc_url`.
    ///
    /// # Errors
    ///
    /// Returns [`HolderIndexerError::ConfigError`] if `rpc_url` is not a URL.
    pub fn connect_http(rpc_url: &str, address: Address, history_chunk_size: u64) -> Result<Self> {
        let url: Url = rpc_url.parse().map_err(|e| {
            HolderIndexerError::ConfigError(format!("invalid RPC URL {rpc_url}: {e}"))
        })?;
        Ok(Self::new(
            RootProvider::new_http(url),
            address,
            history_chunk_size,
        ))
    }
}

#[async_trait]
impl TokenContract for RpcTokenContract {
    async fn latest_block(&self) -> Result<u64> {
        Ok(self.token.provider().get_block_number().await?)
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(self.token.provider().get_chain_id().await?)
    }

    async fn token_info(&self) -> Result<TokenInfo> {
        let name = self.token.name().call().await?;
        let symbol = self.token.symbol().call().await?;
        let decimals = self.decimals().await?;
        let total_supply = self.token.totalSupply().call().await?;

        // Non-standard extensions; absent on plain ERC-20s.
        let tax_fee = self.token.taxFee().call().await.ok();
        let owner = self.owner().await.ok();
        let paused = self.token.paused().call().await.ok();

        Ok(TokenInfo {
            name,
            symbol,
            decimals,
            total_supply,
            tax_fee,
            owner,
            paused,
        })
    }

    async fn decimals(&self) -> Result<u8> {
        Ok(self.token.decimals().call().await?)
    }

    async fn balance_of(&self, account: Address) -> Result<U256> {
        Ok(self.token.balanceOf(account).call().await?)
    }

    async fn owner(&self) -> Result<Address> {
        Ok(self.token.owner().call().await?)
    }

    async fn is_blacklisted(&self, account: Address) -> Result<bool> {
        Ok(self.token.isBlacklisted(account).call().await?)
    }

    async fn holders_aggregate(&self, at_block: u64) -> Result<HolderAggregate> {
        let holders = self
            .token
            .getAllHolders()
            .block(BlockId::number(at_block))
            .call()
            .await?;
        Ok(HolderAggregate {
            addresses: holders.holders,
            balances: holders.balances,
        })
    }

    async fn holder_count(&self, at_block: u64) -> Result<u64> {
        let count = self
            .token
            .holderCount()
            .block(BlockId::number(at_block))
            .call()
            .await?;
        u64::try_from(count).map_err(|_| {
            HolderIndexerError::ContractError(format!("holderCount out of range: {count}"))
        })
    }

    /// Errors on the first log that does not decode as a `Transfer`.
    async fn transfer_history(&self, from_block: u64, to_block: u64) -> Result<Vec<TransferDelta>> {
        let mut deltas = Vec::new();
        let mut start = from_block;

        while start <= to_block {
            let end = start
                .saturating_add(self.history_chunk_size - 1)
                .min(to_block);
            let filter = Filter::new()
                .address(*self.token.address())
                .event_signature(IToken::Transfer::SIGNATURE_HASH)
                .from_block(start)
                .to_block(end);
            let logs = self.token.provider().get_logs(&filter).await?;

            let mut chunk = logs
                .iter()
                .filter(|log| !log.removed)
                .map(TransferDelta::from_log)
                .collect::<Result<Vec<_>>>()?;
            chunk.sort_by_key(|delta| delta.position);
            deltas.extend(chunk);

            if end == u64::MAX {
                break;
            }
            start = end + 1;
        }

        Ok(deltas)
    }
}
