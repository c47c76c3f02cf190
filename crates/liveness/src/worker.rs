//! Applies observations to the liveness store.

use crate::store::{SharedStore, StoreError};
use crate::types::Observation;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::info;

/// Reasons an observation was not applied
#[derive(Debug, Error)]
pub enum ObservationError {
    #[error("Frame not valid")]
    InvalidFrame,

    #[error("No callsign")]
    EmptyCallsign,

    #[error("No position found")]
    NoPosition,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ObservationError {
    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ObservationError::InvalidFrame => "invalid_frame",
            ObservationError::EmptyCallsign => "empty_callsign",
            ObservationError::NoPosition => "no_position",
            ObservationError::Store(_) => "store_error",
        }
    }
}

/// Outcome of applying one observation
#[derive(Debug, Clone, PartialEq)]
pub struct Sighting {
    pub callsign: String,

    /// Presence glyph for the reported symbol, blank when unknown
    pub glyph: &'static str,

    /// Order in which this callsign was first heard since the process started
    pub session_index: u64,

    /// True the first time this callsign is heard in this process
    pub first_this_session: bool,

    /// Previous live timestamp, if the node was already live
    pub previous: Option<DateTime<Utc>>,

    /// Live timestamp as stored for this observation
    pub seen_at: DateTime<Utc>,
}

impl Sighting {
    /// Time since the prior observation of an already-live node
    pub fn since_previous(&self) -> Option<TimeDelta> {
        self.previous.map(|prev| self.seen_at - prev)
    }
}

impl fmt::Display for Sighting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}\t{}", self.session_index, self.glyph, self.callsign)?;
        if let Some(elapsed) = self.since_previous() {
            if self.callsign.len() < 8 {
                f.write_str("\t")?;
            }
            match elapsed.to_std() {
                Ok(d) => write!(f, "\t{:?}", d)?,
                Err(_) => write!(f, "\t-{:?}", (-elapsed).to_std().unwrap_or_default())?,
            }
        }
        Ok(())
    }
}

/// Default number of callsigns whose session index is remembered
pub const DEFAULT_SESSION_CAPACITY: usize = 200_000;

/// Reactive worker: one call per observation, no timers of its own.
///
/// Session indices are kept for at most `capacity` distinct callsigns. Once
/// full, a callsign not yet remembered still gets a fresh index on every
/// sighting and is reported as first seen each time.
pub struct LivenessWorker {
    store: SharedStore,
    sightings: DashMap<String, u64>,
    next_index: AtomicU64,
    capacity: usize,
}

impl LivenessWorker {
    pub fn new(store: SharedStore) -> Self {
        Self::with_capacity(store, DEFAULT_SESSION_CAPACITY)
    }

    pub fn with_capacity(store: SharedStore, capacity: usize) -> Self {
        Self {
            store,
            sightings: DashMap::new(),
            next_index: AtomicU64::new(1),
            capacity,
        }
    }

    /// Number of distinct callsigns heard since the process started
    pub fn session_callsigns(&self) -> usize {
        self.sightings.len()
    }

    /// Apply one observation to the store.
    ///
    /// Rejected observations never touch the store.
    pub async fn handle_observation(
        &self,
        observation: &Observation,
    ) -> Result<Sighting, ObservationError> {
        if !observation.frame_valid {
            return Err(ObservationError::InvalidFrame);
        }

        let callsign = observation.source.trim();
        if callsign.is_empty() {
            return Err(ObservationError::EmptyCallsign);
        }

        let position = observation.position.ok_or(ObservationError::NoPosition)?;

        let previous = self.store.get_live(callsign).await?;
        self.store.remove_dead(callsign).await?;
        self.store.add_live(callsign).await?;
        // Report the timestamp the store kept; a concurrent sweep may already have moved it
        let seen_at = self.store.get_live(callsign).await?.unwrap_or_else(Utc::now);
        let live = self.store.count_live().await?;

        let (session_index, first_this_session) = self.record_sighting(callsign);

        let glyph = match position.symbol.glyph() {
            "" => " ",
            g => g,
        };

        let sighting = Sighting {
            callsign: callsign.to_string(),
            glyph,
            session_index,
            first_this_session,
            previous,
            seen_at,
        };

        info!(
            callsign = %sighting.callsign,
            first_this_session,
            live,
            session_callsigns = self.session_callsigns(),
            "{}",
            sighting
        );

        Ok(sighting)
    }

    fn record_sighting(&self, callsign: &str) -> (u64, bool) {
        if let Some(index) = self.sightings.get(callsign) {
            return (*index, false);
        }
        if self.sightings.len() >= self.capacity {
            return (self.next_index.fetch_add(1, Ordering::Relaxed), true);
        }
        let mut first = false;
        let index = *self
            .sightings
            .entry(callsign.to_string())
            .or_insert_with(|| {
                first = true;
                self.next_index.fetch_add(1, Ordering::Relaxed)
            });
        (index, first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Store};
    use crate::types::{Position, Symbol};
    use std::sync::Arc;

    fn position() -> Position {
        Position {
            latitude: 47.6,
            longitude: -122.3,
            symbol: Symbol::new('/', '>'),
        }
    }

    fn worker() -> (Arc<MemoryStore>, LivenessWorker) {
        let store = Arc::new(MemoryStore::new());
        let worker = LivenessWorker::new(store.clone());
        (store, worker)
    }

    #[tokio::test]
    async fn test_first_sighting_is_new() {
        let (store, worker) = worker();

        let sighting = worker
            .handle_observation(&Observation::with_position("KF7ABC", position()))
            .await
            .unwrap();

        assert!(sighting.first_this_session);
        assert_eq!(sighting.session_index, 1);
        assert_eq!(sighting.previous, None);
        assert_eq!(sighting.glyph, "🚗");
        assert!(store.get_live("KF7ABC").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_repeat_sighting_reports_elapsed() {
        let (_store, worker) = worker();
        let obs = Observation::with_position("KF7ABC", position());

        worker.handle_observation(&obs).await.unwrap();
        let second = worker.handle_observation(&obs).await.unwrap();

        assert!(!second.first_this_session);
        assert_eq!(second.session_index, 1);
        assert!(second.previous.is_some());
        assert!(second.since_previous().unwrap() >= TimeDelta::zero());
        assert!(second.to_string().starts_with("1: 🚗\tKF7ABC\t\t"));
    }

    #[tokio::test]
    async fn test_seen_at_matches_stored_timestamp() {
        let (store, worker) = worker();
        let obs = Observation::with_position("KF7ABC", position());

        let first = worker.handle_observation(&obs).await.unwrap();
        assert_eq!(store.get_live("KF7ABC").await.unwrap(), Some(first.seen_at));

        let second = worker.handle_observation(&obs).await.unwrap();
        assert_eq!(store.get_live("KF7ABC").await.unwrap(), Some(second.seen_at));
        assert_eq!(second.previous, Some(first.seen_at));
    }

    #[tokio::test]
    async fn test_session_index_is_monotonic() {
        let (_store, worker) = worker();

        for (i, call) in ["N0AAA", "N0BBB", "N0CCC"].iter().enumerate() {
            let s = worker
                .handle_observation(&Observation::with_position(*call, position()))
                .await
                .unwrap();
            assert_eq!(s.session_index, i as u64 + 1);
        }
        let again = worker
            .handle_observation(&Observation::with_position("N0AAA", position()))
            .await
            .unwrap();
        assert_eq!(again.session_index, 1);
        assert_eq!(worker.session_callsigns(), 3);
    }

    #[tokio::test]
    async fn test_session_tracking_is_capped() {
        let store = Arc::new(MemoryStore::new());
        let worker = LivenessWorker::with_capacity(store.clone(), 2);

        for call in ["N0AAA", "N0BBB", "N0CCC", "N0CCC"] {
            worker
                .handle_observation(&Observation::with_position(call, position()))
                .await
                .unwrap();
        }

        assert_eq!(worker.session_callsigns(), 2);
        // Past the cap nodes are still recorded in the store
        assert_eq!(store.count_live().await.unwrap(), 3);

        let remembered = worker
            .handle_observation(&Observation::with_position("N0AAA", position()))
            .await
            .unwrap();
        assert!(!remembered.first_this_session);
        assert_eq!(remembered.session_index, 1);
    }

    #[tokio::test]
    async fn test_unknown_symbol_renders_blank() {
        let (_store, worker) = worker();
        let mut pos = position();
        pos.symbol = Symbol::new('/', '~');

        let s = worker
            .handle_observation(&Observation::with_position("N0CALL", pos))
            .await
            .unwrap();

        assert_eq!(s.glyph, " ");
    }

    #[tokio::test]
    async fn test_rejections_leave_store_untouched() {
        let (store, worker) = worker();

        let cases = [
            (Observation::invalid("garbage"), "invalid_frame"),
            (Observation::with_position("  ", position()), "empty_callsign"),
            (Observation::without_position("KF7ABC"), "no_position"),
        ];
        for (obs, kind) in cases {
            let err = worker.handle_observation(&obs).await.unwrap_err();
            assert_eq!(err.kind(), kind);
        }

        assert_eq!(store.count_live().await.unwrap(), 0);
        assert_eq!(store.count_dead().await.unwrap(), 0);
        assert_eq!(worker.session_callsigns(), 0);
    }

    #[tokio::test]
    async fn test_observation_revives_dead_node() {
        let (store, worker) = worker();
        store.add_dead("KF7ABC", Utc::now()).await.unwrap();

        worker
            .handle_observation(&Observation::with_position("KF7ABC", position()))
            .await
            .unwrap();

        assert_eq!(store.get_dead("KF7ABC").await.unwrap(), None);
        assert_eq!(store.count_live().await.unwrap(), 1);
    }
}
