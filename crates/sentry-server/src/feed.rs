//! Feed driver: keeps a connection to the observation source alive and feeds
//! every observation to the liveness worker.

use crate::metrics::MetricsRegistry;
use async_trait::async_trait;
use liveness::{LivenessWorker, Observation, ObservationError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Errors raised by an observation source
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Failed to connect to {server}: {source}")]
    Connect {
        server: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Login to {server} failed: {source}")]
    Login {
        server: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Feed stream error: {0}")]
    Stream(#[source] std::io::Error),
}

impl FeedError {
    /// Dial-time failures are retried; stream failures are not
    pub fn is_retryable(&self) -> bool {
        matches!(self, FeedError::Connect { .. } | FeedError::Login { .. })
    }
}

/// A network collaborator producing observations
#[async_trait]
pub trait ObservationSource: Send {
    /// Establish (or re-establish) the session
    async fn dial(&mut self) -> Result<(), FeedError>;

    /// Next observation; `Ok(None)` when the remote end closed the stream
    async fn next(&mut self) -> Result<Option<Observation>, FeedError>;

    async fn close(&mut self) -> Result<(), FeedError>;
}

/// Exponential redial delay: doubles from `initial` and holds at `max`
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

/// Serially applies observations from a source to the worker
pub struct FeedDriver<S> {
    source: S,
    worker: Arc<LivenessWorker>,
    backoff: Backoff,
    metrics: Option<Arc<MetricsRegistry>>,

    handled: u64,
    total_latency: Duration,
}

impl<S: ObservationSource> FeedDriver<S> {
    pub fn new(
        source: S,
        worker: Arc<LivenessWorker>,
        backoff: Backoff,
        metrics: Option<Arc<MetricsRegistry>>,
    ) -> Self {
        Self {
            source,
            worker,
            backoff,
            metrics,
            handled: 0,
            total_latency: Duration::ZERO,
        }
    }

    /// Run until `shutdown` is cancelled or the stream fails.
    ///
    /// End of stream triggers a redial; any other stream error is returned.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), FeedError> {
        info!("Feed driver started");

        loop {
            if !self.dial(&shutdown).await? {
                info!("Feed driver stopped");
                return Ok(());
            }

            loop {
                let next = tokio::select! {
                    next = self.source.next() => Some(next),
                    _ = shutdown.cancelled() => None,
                };
                let Some(next) = next else {
                    self.close().await;
                    info!("Feed driver stopped");
                    return Ok(());
                };

                match next {
                    Ok(Some(observation)) => self.handle(&observation).await,
                    Ok(None) => {
                        warn!("Feed closed by remote, redialing");
                        self.close().await;
                        if let Some(ref m) = self.metrics {
                            m.record_redial();
                        }
                        if !pause(self.backoff.next_delay(), &shutdown).await {
                            return Ok(());
                        }
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "Feed stream failed");
                        self.close().await;
                        return Err(e);
                    }
                }
            }
        }
    }

    /// Dial until connected; false when shut down first.
    ///
    /// Errors that are not retryable end the loop.
    async fn dial(&mut self, shutdown: &CancellationToken) -> Result<bool, FeedError> {
        loop {
            let dialed = tokio::select! {
                dialed = self.source.dial() => dialed,
                _ = shutdown.cancelled() => return Ok(false),
            };

            match dialed {
                Ok(()) => {
                    self.backoff.reset();
                    return Ok(true);
                }
                Err(e) if !e.is_retryable() => {
                    error!(error = %e, "Dial failed");
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    warn!(error = %e, retry_in = ?delay, "Dial failed");
                    if let Some(ref m) = self.metrics {
                        m.record_redial();
                    }
                    if !pause(delay, shutdown).await {
                        return Ok(false);
                    }
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.source.close().await {
            debug!(error = %e, "Error closing feed");
        }
    }

    async fn handle(&mut self, observation: &Observation) {
        let started = Instant::now();
        let result = self.worker.handle_observation(observation).await;
        let elapsed = started.elapsed();

        self.handled += 1;
        self.total_latency += elapsed;
        debug!(
            elapsed = ?elapsed,
            average = ?self.total_latency.div_f64(self.handled as f64),
            "Observation handled"
        );

        let outcome = match &result {
            Ok(_) => "accepted",
            Err(e) => e.kind(),
        };
        if let Some(ref m) = self.metrics {
            m.record_observation(outcome, elapsed);
        }

        match result {
            Ok(sighting) => {
                if sighting.first_this_session {
                    info!(
                        callsign = %sighting.callsign,
                        index = sighting.session_index,
                        symbol = sighting.glyph,
                        "New node this session"
                    );
                } else {
                    trace!(
                        callsign = %sighting.callsign,
                        index = sighting.session_index,
                        since_previous = ?sighting.since_previous(),
                        "Node heard"
                    );
                }
            }
            Err(e @ ObservationError::InvalidFrame) => {
                debug!(raw = %observation.raw, "{}", e)
            }
            Err(e @ ObservationError::EmptyCallsign) => {
                warn!(raw = %observation.raw, "{}", e)
            }
            Err(e @ ObservationError::NoPosition) => {
                trace!(callsign = %observation.source, "{}", e)
            }
            Err(ObservationError::Store(e)) => {
                error!(callsign = %observation.source, error = %e, "Failed to record observation")
            }
        }
    }
}

/// Sleep for `delay`; false when shut down first
async fn pause(delay: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = shutdown.cancelled() => false,
    }
}
