//! Process-local storage backend.

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::StorageBackend;
use crate::common::error::Result;
use crate::types::{HolderRecord, LogPosition};

/// Keeps the last saved snapshot in memory and counts saves.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Mutex<(Vec<HolderRecord>, Option<LogPosition>, usize)>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times a snapshot has been saved.
    pub async fn save_count(&self) -> usize {
        self.inner.lock().await.2
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn save_snapshot(
        &self,
        holders: &[HolderRecord],
        watermark: Option<LogPosition>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.0 = holders.to_vec();
        inner.1 = watermark;
        inner.2 += 1;
        Ok(())
    }

    async fn load_holders(&self) -> Result<Vec<HolderRecord>> {
        Ok(self.inner.lock().await.0.clone())
    }

    async fn load_watermark(&self) -> Result<Option<LogPosition>> {
        Ok(self.inner.lock().await.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, U256};

    #[tokio::test]
    async fn test_save_replaces_previous() {
        let storage = MemoryStorage::new();
        let first = vec![HolderRecord::new(Address::repeat_byte(1), U256::from(5u64))];
        storage
            .save_snapshot(&first, Some(LogPosition::new(1, 0)))
            .await
            .unwrap();
        storage.save_snapshot(&[], None).await.unwrap();

        assert!(storage.load_holders().await.unwrap().is_empty());
        assert_eq!(storage.load_watermark().await.unwrap(), None);
        assert_eq!(storage.save_count().await, 2);
    }
}
