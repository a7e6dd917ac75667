//! Postgres-backed snapshot storage.

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::str::FromStr;

use super::StorageBackend;
use crate::common::error::{HolderIndexerError, Result};
use crate::types::{HolderRecord, LogPosition, format_address};

/// Holder snapshot table and single-row checkpoint in Postgres.
pub struct Storage {
    pool: PgPool,
}

impl Storage {
    /// Connects to the database.
    ///
    /// # Errors
    ///
    /// Returns [`HolderIndexerError::DatabaseError`] if the connection fails.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Creates the tables if they do not exist.
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS _erc20_holders (
                address TEXT PRIMARY KEY,
                balance TEXT NOT NULL,
                updated_at TIMESTAMPTZ DEFAULT NOW()
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS _erc20_indexer_checkpoint (
                id SMALLINT PRIMARY KEY,
                block_number BIGINT,
                log_index BIGINT
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// Positions are stored as BIGINT; `end_of_block` uses u64::MAX which maps to -1.
fn to_db(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(-1)
}

fn from_db(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

#[async_trait]
impl StorageBackend for Storage {
    async fn save_snapshot(
        &self,
        holders: &[HolderRecord],
        watermark: Option<LogPosition>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM _erc20_holders")
            .execute(&mut *tx)
            .await?;

        for holder in holders {
            sqlx::query("INSERT INTO _erc20_holders (address, balance) VALUES ($1, $2)")
                .bind(format_address(&holder.address))
                .bind(holder.balance.to_string())
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            "INSERT INTO _erc20_indexer_checkpoint (id, block_number, log_index)
             VALUES (1, $1, $2)
             ON CONFLICT (id) DO UPDATE
             SET block_number = EXCLUDED.block_number, log_index = EXCLUDED.log_index",
        )
        .bind(watermark.map(|w| to_db(w.block_number)))
        .bind(watermark.map(|w| to_db(w.log_index)))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn load_holders(&self) -> Result<Vec<HolderRecord>> {
        let rows = sqlx::query("SELECT address, balance FROM _erc20_holders")
            .fetch_all(&self.pool)
            .await?;

        let mut holders = Vec::with_capacity(rows.len());
        for row in rows {
            let address: String = row.try_get("address")?;
            let balance: String = row.try_get("balance")?;
            holders.push(HolderRecord::new(
                Address::from_str(&address).map_err(|e| {
                    HolderIndexerError::DecodingError(format!("stored address '{address}': {e}"))
                })?,
                U256::from_str(&balance).map_err(|e| {
                    HolderIndexerError::DecodingError(format!("stored balance '{balance}': {e}"))
                })?,
            ));
        }
        crate::core::ledger::sort_holders(&mut holders);
        Ok(holders)
    }

    async fn load_watermark(&self) -> Result<Option<LogPosition>> {
        let row = sqlx::query(
            "SELECT block_number, log_index FROM _erc20_indexer_checkpoint WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let block_number: Option<i64> = row.try_get("block_number")?;
        let log_index: Option<i64> = row.try_get("log_index")?;
        Ok(block_number
            .zip(log_index)
            .map(|(block, index)| LogPosition::new(from_db(block), from_db(index))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_round_trip_through_bigint() {
        assert_eq!(from_db(to_db(u64::MAX)), u64::MAX);
        assert_eq!(from_db(to_db(12_345)), 12_345);
    }
}
