//! Snapshot persistence.
//!
//! The in-memory [`LedgerStore`](crate::core::LedgerStore) stays authoritative;
//! backends only receive copies after each committed change.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::common::error::Result;
use crate::types::{HolderRecord, LogPosition};

pub use memory::MemoryStorage;
pub use postgres::Storage;

/// Destination for holder snapshots and the position they reflect.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Replaces the stored holder set and checkpoint.
    async fn save_snapshot(
        &self,
        holders: &[HolderRecord],
        watermark: Option<LogPosition>,
    ) -> Result<()>;

    async fn load_holders(&self) -> Result<Vec<HolderRecord>>;

    async fn load_watermark(&self) -> Result<Option<LogPosition>>;
}
