//! Storage contract for liveness records and notification targets.
//!
//! Every backend keeps two timestamp partitions keyed by callsign ("live" and
//! "dead") plus a callsign to address table. A callsign is in at most one
//! partition at a time, and all listings come back ordered by callsign.

mod memory;
mod redb_store;

pub use memory::MemoryStore;
pub use redb_store::RedbStore;

use crate::types::{CallsignEmail, CallsignTime};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Shared handle to the active store.
pub type SharedStore = Arc<dyn Store>;

/// Errors raised by store backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Timed out opening store after {0:?}")]
    OpenTimeout(Duration),

    #[error("Timestamp out of range: {0}")]
    Timestamp(DateTime<Utc>),
}

/// Liveness store contract
#[async_trait]
pub trait Store: Send + Sync {
    /// Backend name, used in logs
    fn name(&self) -> &str;

    /// Mark a callsign live as of now and drop any dead record for it.
    async fn add_live(&self, callsign: &str) -> Result<(), StoreError>;

    /// Record a callsign as dead, last heard at `last_seen`.
    async fn add_dead(&self, callsign: &str, last_seen: DateTime<Utc>) -> Result<(), StoreError>;

    async fn get_live(&self, callsign: &str) -> Result<Option<DateTime<Utc>>, StoreError>;

    async fn get_dead(&self, callsign: &str) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Delete the live record only if it was last seen at or before `cutoff`.
    ///
    /// Returns whether a record was deleted.
    async fn remove_live(&self, callsign: &str, cutoff: DateTime<Utc>) -> Result<bool, StoreError>;

    async fn remove_dead(&self, callsign: &str) -> Result<(), StoreError>;

    /// Live records last seen at or before `cutoff`, ordered by callsign.
    async fn list_live(&self, cutoff: DateTime<Utc>) -> Result<Vec<CallsignTime>, StoreError>;

    /// All dead records, ordered by callsign.
    async fn list_dead(&self) -> Result<Vec<CallsignTime>, StoreError>;

    async fn count_live(&self) -> Result<usize, StoreError>;

    async fn count_dead(&self) -> Result<usize, StoreError>;

    /// Move a stale live record to the dead partition, keeping its last-seen time.
    ///
    /// Returns the preserved timestamp, or `None` when the record is gone or
    /// newer than `cutoff`. Backends override this to make the move atomic.
    async fn demote(
        &self,
        callsign: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let Some(last_seen) = self.get_live(callsign).await? else {
            return Ok(None);
        };
        if last_seen > cutoff || !self.remove_live(callsign, cutoff).await? {
            return Ok(None);
        }
        self.add_dead(callsign, last_seen).await?;
        Ok(Some(last_seen))
    }

    async fn add_email(&self, callsign: &str, email: &str) -> Result<(), StoreError>;

    async fn get_email(&self, callsign: &str) -> Result<Option<String>, StoreError>;

    async fn remove_email(&self, callsign: &str) -> Result<(), StoreError>;

    /// All notification targets, ordered by callsign.
    async fn list_email(&self) -> Result<Vec<CallsignEmail>, StoreError>;
}
