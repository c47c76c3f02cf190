//! In-memory reference store.

use super::{Store, StoreError};
use crate::types::{CallsignEmail, CallsignTime};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    live: BTreeMap<String, DateTime<Utc>>,
    dead: BTreeMap<String, DateTime<Utc>>,
    emails: BTreeMap<String, String>,
}

/// Store backed by ordered maps behind a single lock.
///
/// Nothing survives a restart. All three tables share one lock, so every
/// operation (including `add_live` and `demote`, which touch both partitions)
/// is atomic with respect to every reader.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn collect(map: &BTreeMap<String, DateTime<Utc>>, cutoff: Option<DateTime<Utc>>) -> Vec<CallsignTime> {
    map.iter()
        .filter(|(_, ts)| cutoff.is_none_or(|c| **ts <= c))
        .map(|(callsign, ts)| CallsignTime::new(callsign.clone(), *ts))
        .collect()
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn add_live(&self, callsign: &str) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut tables = self.tables.write().await;
        let entry = tables.live.entry(callsign.to_string()).or_insert(now);
        if *entry < now {
            *entry = now;
        }
        tables.dead.remove(callsign);
        Ok(())
    }

    async fn add_dead(&self, callsign: &str, last_seen: DateTime<Utc>) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .dead
            .insert(callsign.to_string(), last_seen);
        Ok(())
    }

    async fn get_live(&self, callsign: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.tables.read().await.live.get(callsign).copied())
    }

    async fn get_dead(&self, callsign: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.tables.read().await.dead.get(callsign).copied())
    }

    async fn remove_live(&self, callsign: &str, cutoff: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.live.get(callsign) {
            Some(ts) if *ts <= cutoff => {
                tables.live.remove(callsign);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove_dead(&self, callsign: &str) -> Result<(), StoreError> {
        self.tables.write().await.dead.remove(callsign);
        Ok(())
    }

    async fn list_live(&self, cutoff: DateTime<Utc>) -> Result<Vec<CallsignTime>, StoreError> {
        Ok(collect(&self.tables.read().await.live, Some(cutoff)))
    }

    async fn list_dead(&self) -> Result<Vec<CallsignTime>, StoreError> {
        Ok(collect(&self.tables.read().await.dead, None))
    }

    async fn count_live(&self) -> Result<usize, StoreError> {
        Ok(self.tables.read().await.live.len())
    }

    async fn count_dead(&self) -> Result<usize, StoreError> {
        Ok(self.tables.read().await.dead.len())
    }

    async fn demote(
        &self,
        callsign: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let mut tables = self.tables.write().await;
        let last_seen = match tables.live.get(callsign) {
            Some(ts) if *ts <= cutoff => *ts,
            _ => return Ok(None),
        };
        tables.live.remove(callsign);
        tables.dead.insert(callsign.to_string(), last_seen);
        Ok(Some(last_seen))
    }

    async fn add_email(&self, callsign: &str, email: &str) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .emails
            .insert(callsign.to_string(), email.to_string());
        Ok(())
    }

    async fn get_email(&self, callsign: &str) -> Result<Option<String>, StoreError> {
        Ok(self.tables.read().await.emails.get(callsign).cloned())
    }

    async fn remove_email(&self, callsign: &str) -> Result<(), StoreError> {
        self.tables.write().await.emails.remove(callsign);
        Ok(())
    }

    async fn list_email(&self) -> Result<Vec<CallsignEmail>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .emails
            .iter()
            .map(|(callsign, email)| CallsignEmail::new(callsign.clone(), email.clone()))
            .collect())
    }
}
