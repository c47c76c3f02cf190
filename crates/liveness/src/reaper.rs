//! Time-driven demotion of nodes that stopped reporting.

use crate::store::{SharedStore, StoreError};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A node moved from live to dead
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demotion {
    pub callsign: String,

    /// Last time the node was heard, preserved across demotion
    pub last_seen: DateTime<Utc>,
}

/// Reaper configuration
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// How long a node may stay silent before it is demoted
    pub window: Duration,

    /// Pause between sweeps
    pub interval: Duration,

    /// Start sweeping immediately instead of waiting one window after startup
    pub skip_cooldown: bool,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(25 * 60 * 60),
            interval: Duration::from_secs(1),
            skip_cooldown: false,
        }
    }
}

impl ReaperConfig {
    /// Staleness threshold relative to `now`; `None` when the window is out of range
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let window = TimeDelta::from_std(self.window).ok()?;
        now.checked_sub_signed(window)
    }
}

/// Sweeps the live partition and demotes stale nodes
pub struct Reaper {
    store: SharedStore,
    config: ReaperConfig,
    demotions: mpsc::UnboundedSender<Demotion>,
}

impl Reaper {
    pub fn new(
        store: SharedStore,
        config: ReaperConfig,
        demotions: mpsc::UnboundedSender<Demotion>,
    ) -> Self {
        Self {
            store,
            config,
            demotions,
        }
    }

    /// Run until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            window = ?self.config.window,
            skip_cooldown = self.config.skip_cooldown,
            "Reaper task started"
        );

        if !self.config.skip_cooldown {
            info!(cooldown = ?self.config.window, "Reaper waiting for nodes to report in");
            tokio::select! {
                _ = tokio::time::sleep(self.config.window) => {}
                _ = shutdown.cancelled() => {
                    info!("Reaper task stopped");
                    return;
                }
            }
        }

        loop {
            if let Err(e) = self.sweep().await {
                warn!(error = %e, "Reaper sweep failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = shutdown.cancelled() => break,
            }
        }

        info!("Reaper task stopped");
    }

    /// One sweep against the current wall clock
    pub async fn sweep(&self) -> Result<Vec<Demotion>, StoreError> {
        self.sweep_at(Utc::now()).await
    }

    /// One sweep as if the time were `now`.
    ///
    /// A node that fails to demote is logged and left for the next sweep; only a
    /// failed listing is returned as an error.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<Vec<Demotion>, StoreError> {
        let Some(cutoff) = self.config.cutoff(now) else {
            return Ok(Vec::new());
        };

        let stale = self.store.list_live(cutoff).await?;
        let mut demoted = Vec::with_capacity(stale.len());

        for node in stale {
            // A fresh observation may have landed since the listing; demote re-checks the cutoff
            let last_seen = match self.store.demote(&node.callsign, cutoff).await {
                Ok(Some(last_seen)) => last_seen,
                Ok(None) => {
                    debug!(callsign = %node.callsign, "Node reported during sweep, skipping");
                    continue;
                }
                Err(e) => {
                    warn!(callsign = %node.callsign, error = %e, "Failed to demote node");
                    continue;
                }
            };

            info!(callsign = %node.callsign, %last_seen, "Reaping");
            let demotion = Demotion {
                callsign: node.callsign,
                last_seen,
            };
            if let Err(e) = self.demotions.send(demotion.clone()) {
                warn!(callsign = %e.0.callsign, "No notifier listening for demotion");
            }
            demoted.push(demotion);
        }

        Ok(demoted)
    }
}
