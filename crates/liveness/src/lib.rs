//! Liveness tracking for APRS nodes.
//!
//! Nodes are identified by callsign and partitioned into "live" and "dead"
//! sets according to when they were last heard:
//! - [`LivenessWorker`] applies each incoming observation to the store
//! - [`Reaper`] periodically demotes nodes that have been silent longer than
//!   the liveness window and emits a [`Demotion`] for each
//! - [`Store`] is the storage contract, implemented by [`MemoryStore`] and
//!   the embedded [`RedbStore`]
//!
//! # Example
//!
//! ```no_run
//! use liveness::{LivenessWorker, MemoryStore, Observation, Position, Reaper, ReaperConfig, Symbol};
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::new());
//! let worker = LivenessWorker::new(store.clone());
//!
//! let position = Position { latitude: 47.6, longitude: -122.3, symbol: Symbol::new('/', '>') };
//! worker.handle_observation(&Observation::with_position("KF7ABC", position)).await?;
//!
//! let (tx, _rx) = mpsc::unbounded_channel();
//! let reaper = Reaper::new(store, ReaperConfig::default(), tx);
//! for demotion in reaper.sweep().await? {
//!     println!("{} went quiet at {}", demotion.callsign, demotion.last_seen);
//! }
//! # Ok(())
//! # }
//! ```

pub mod reaper;
pub mod store;
pub mod types;
pub mod worker;

pub use reaper::{Demotion, Reaper, ReaperConfig};
pub use store::{MemoryStore, RedbStore, SharedStore, Store, StoreError};
pub use types::{CallsignEmail, CallsignTime, Observation, Partition, Position, Symbol};
pub use worker::{DEFAULT_SESSION_CAPACITY, LivenessWorker, ObservationError, Sighting};
