//! Embedded store on top of redb.
//!
//! Tables:
//! - live: callsign → last seen (i64 nanoseconds since the epoch, UTC)
//! - dead: callsign → last seen before demotion
//! - emails: callsign → notification address

use super::{Store, StoreError};
use crate::types::{CallsignEmail, CallsignTime};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const LIVE_TABLE: TableDefinition<&str, i64> = TableDefinition::new("live");
const DEAD_TABLE: TableDefinition<&str, i64> = TableDefinition::new("dead");
const EMAIL_TABLE: TableDefinition<&str, &str> = TableDefinition::new("emails");

/// Persistent store in a single redb file
pub struct RedbStore {
    db: Arc<Database>,
    path: PathBuf,
}

fn to_nanos(ts: DateTime<Utc>) -> Result<i64, StoreError> {
    ts.timestamp_nanos_opt().ok_or(StoreError::Timestamp(ts))
}

fn from_nanos(nanos: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(nanos)
}

impl RedbStore {
    /// Open or create a store at `path`, giving up after `open_timeout`.
    pub async fn open(path: impl AsRef<Path>, open_timeout: Duration) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let open_path = path.clone();
        let opening = tokio::task::spawn_blocking(move || Self::open_blocking(&open_path));

        let db = match tokio::time::timeout(open_timeout, opening).await {
            Ok(joined) => joined??,
            Err(_) => return Err(StoreError::OpenTimeout(open_timeout)),
        };

        info!(path = %path.display(), "Opened redb store");
        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    fn open_blocking(path: &Path) -> Result<Database, StoreError> {
        let db = Database::create(path)?;

        // Ensure tables exist so read transactions never hit a missing table
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(LIVE_TABLE)?;
            let _ = write_txn.open_table(DEAD_TABLE)?;
            let _ = write_txn.open_table(EMAIL_TABLE)?;
        }
        write_txn.commit()?;

        Ok(db)
    }

    /// Location of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a blocking database operation off the async executor
    async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db)).await?
    }

    fn get_time(
        db: &Database,
        table: TableDefinition<'static, &'static str, i64>,
        callsign: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(table)?;
        let found = table.get(callsign)?.map(|v| from_nanos(v.value()));
        Ok(found)
    }

    fn list_times(
        db: &Database,
        table: TableDefinition<'static, &'static str, i64>,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<CallsignTime>, StoreError> {
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(table)?;

        let mut result = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            let last_seen = from_nanos(value.value());
            if cutoff.is_none_or(|c| last_seen <= c) {
                result.push(CallsignTime::new(key.value(), last_seen));
            }
        }
        Ok(result)
    }

    fn count(
        db: &Database,
        table: TableDefinition<'static, &'static str, i64>,
    ) -> Result<usize, StoreError> {
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(table)?;
        Ok(table.len()? as usize)
    }
}

#[async_trait]
impl Store for RedbStore {
    fn name(&self) -> &str {
        "redb"
    }

    async fn add_live(&self, callsign: &str) -> Result<(), StoreError> {
        let callsign = callsign.to_owned();
        self.run(move |db| {
            let now = to_nanos(Utc::now())?;
            let write_txn = db.begin_write()?;
            {
                let mut live = write_txn.open_table(LIVE_TABLE)?;
                let stored = live.get(callsign.as_str())?.map(|v| v.value());
                live.insert(callsign.as_str(), stored.map_or(now, |s| s.max(now)))?;

                let mut dead = write_txn.open_table(DEAD_TABLE)?;
                dead.remove(callsign.as_str())?;
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn add_dead(&self, callsign: &str, last_seen: DateTime<Utc>) -> Result<(), StoreError> {
        let callsign = callsign.to_owned();
        self.run(move |db| {
            let nanos = to_nanos(last_seen)?;
            let write_txn = db.begin_write()?;
            {
                let mut dead = write_txn.open_table(DEAD_TABLE)?;
                dead.insert(callsign.as_str(), nanos)?;
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_live(&self, callsign: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let callsign = callsign.to_owned();
        self.run(move |db| Self::get_time(db, LIVE_TABLE, &callsign))
            .await
    }

    async fn get_dead(&self, callsign: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let callsign = callsign.to_owned();
        self.run(move |db| Self::get_time(db, DEAD_TABLE, &callsign))
            .await
    }

    async fn remove_live(&self, callsign: &str, cutoff: DateTime<Utc>) -> Result<bool, StoreError> {
        let callsign = callsign.to_owned();
        self.run(move |db| {
            let cutoff = to_nanos(cutoff)?;
            let write_txn = db.begin_write()?;
            let removed = {
                let mut live = write_txn.open_table(LIVE_TABLE)?;
                let stored = live.get(callsign.as_str())?.map(|v| v.value());
                match stored {
                    Some(ts) if ts <= cutoff => {
                        live.remove(callsign.as_str())?;
                        true
                    }
                    _ => false,
                }
            };
            write_txn.commit()?;
            Ok(removed)
        })
        .await
    }

    async fn remove_dead(&self, callsign: &str) -> Result<(), StoreError> {
        let callsign = callsign.to_owned();
        self.run(move |db| {
            let write_txn = db.begin_write()?;
            {
                let mut dead = write_txn.open_table(DEAD_TABLE)?;
                dead.remove(callsign.as_str())?;
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn list_live(&self, cutoff: DateTime<Utc>) -> Result<Vec<CallsignTime>, StoreError> {
        self.run(move |db| Self::list_times(db, LIVE_TABLE, Some(cutoff)))
            .await
    }

    async fn list_dead(&self) -> Result<Vec<CallsignTime>, StoreError> {
        self.run(|db| Self::list_times(db, DEAD_TABLE, None)).await
    }

    async fn count_live(&self) -> Result<usize, StoreError> {
        self.run(|db| Self::count(db, LIVE_TABLE)).await
    }

    async fn count_dead(&self) -> Result<usize, StoreError> {
        self.run(|db| Self::count(db, DEAD_TABLE)).await
    }

    async fn demote(
        &self,
        callsign: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let callsign = callsign.to_owned();
        self.run(move |db| {
            let cutoff = to_nanos(cutoff)?;
            let write_txn = db.begin_write()?;
            let demoted = {
                let mut live = write_txn.open_table(LIVE_TABLE)?;
                let stored = live.get(callsign.as_str())?.map(|v| v.value());
                match stored {
                    Some(ts) if ts <= cutoff => {
                        live.remove(callsign.as_str())?;
                        let mut dead = write_txn.open_table(DEAD_TABLE)?;
                        dead.insert(callsign.as_str(), ts)?;
                        Some(from_nanos(ts))
                    }
                    _ => None,
                }
            };
            write_txn.commit()?;
            Ok(demoted)
        })
        .await
    }

    async fn add_email(&self, callsign: &str, email: &str) -> Result<(), StoreError> {
        let callsign = callsign.to_owned();
        let email = email.to_owned();
        self.run(move |db| {
            let write_txn = db.begin_write()?;
            {
                let mut emails = write_txn.open_table(EMAIL_TABLE)?;
                emails.insert(callsign.as_str(), email.as_str())?;
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_email(&self, callsign: &str) -> Result<Option<String>, StoreError> {
        let callsign = callsign.to_owned();
        self.run(move |db| {
            let read_txn = db.begin_read()?;
            let emails = read_txn.open_table(EMAIL_TABLE)?;
            let found = emails
                .get(callsign.as_str())?
                .map(|v| v.value().to_string());
            Ok(found)
        })
        .await
    }

    async fn remove_email(&self, callsign: &str) -> Result<(), StoreError> {
        let callsign = callsign.to_owned();
        self.run(move |db| {
            let write_txn = db.begin_write()?;
            {
                let mut emails = write_txn.open_table(EMAIL_TABLE)?;
                emails.remove(callsign.as_str())?;
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn list_email(&self) -> Result<Vec<CallsignEmail>, StoreError> {
        self.run(|db| {
            let read_txn = db.begin_read()?;
            let emails = read_txn.open_table(EMAIL_TABLE)?;

            let mut result = Vec::new();
            for entry in emails.iter()? {
                let (key, value) = entry?;
                result.push(CallsignEmail::new(key.value(), value.value()));
            }
            Ok(result)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sentry.redb");

        {
            let store = RedbStore::open(&path, Duration::from_secs(1)).await.unwrap();
            store.add_live("KF7ABC").await.unwrap();
            store.add_email("KF7ABC", "op@example.com").await.unwrap();
        }

        let store = RedbStore::open(&path, Duration::from_secs(1)).await.unwrap();
        assert!(store.get_live("KF7ABC").await.unwrap().is_some());
        assert_eq!(
            store.get_email("KF7ABC").await.unwrap().as_deref(),
            Some("op@example.com")
        );
        assert_eq!(store.path(), path.as_path());
    }

    #[test]
    fn test_nanos_round_trip_preserves_precision() {
        let ts = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        assert_eq!(from_nanos(to_nanos(ts).unwrap()), ts);
    }

    #[test]
    fn test_out_of_range_timestamp_is_rejected() {
        assert!(matches!(
            to_nanos(DateTime::<Utc>::MAX_UTC),
            Err(StoreError::Timestamp(_))
        ));
    }
}
