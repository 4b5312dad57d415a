pub mod sqlite;

use async_trait::async_trait;

use crate::models::{ListingRecord, MemoryUpdate, SeenMemory};
use crate::utils::error::Result;

pub use sqlite::{SnapshotRow, SqliteStore};

/// Durable memory of what has already been notified, plus the latest listing table.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Latest row per identity key wins.
    async fn load_memory(&self) -> Result<SeenMemory>;

    /// Appends memory rows and replaces the snapshot atomically.
    async fn record_run(&self, updates: &[MemoryUpdate], snapshot: &[ListingRecord]) -> Result<()>;

    async fn write_snapshot(&self, snapshot: &[ListingRecord]) -> Result<()>;
}
