//! Notifier: turns demotions into node down mail.

use crate::mail::{MailMessage, Mailer};
use crate::metrics::MetricsRegistry;
use liveness::{Demotion, SharedStore, Store};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of one notification attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    NoTarget,
    LookupFailed,
    Failed,
}

impl Delivery {
    pub fn as_str(&self) -> &'static str {
        match self {
            Delivery::Sent => "sent",
            Delivery::NoTarget => "no_target",
            Delivery::LookupFailed => "lookup_failed",
            Delivery::Failed => "failed",
        }
    }
}

/// Notifier consumes demotions and mails each node's registered target
pub struct Notifier {
    /// Demotion receiver
    demotions: mpsc::UnboundedReceiver<Demotion>,

    store: SharedStore,
    mailer: Arc<dyn Mailer>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl Notifier {
    pub fn new(
        demotions: mpsc::UnboundedReceiver<Demotion>,
        store: SharedStore,
        mailer: Arc<dyn Mailer>,
        metrics: Option<Arc<MetricsRegistry>>,
    ) -> Self {
        Self {
            demotions,
            store,
            mailer,
            metrics,
        }
    }

    /// Run until the demotion channel closes or `shutdown` is cancelled.
    ///
    /// Every demotion gets its own delivery task so a slow mail server never
    /// delays the next one. In-flight deliveries are awaited before returning.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(mailer = self.mailer.name(), "Notifier task started");

        let mut deliveries = JoinSet::new();

        loop {
            tokio::select! {
                demotion = self.demotions.recv() => {
                    let Some(demotion) = demotion else { break };
                    debug!(callsign = %demotion.callsign, "Received demotion");

                    if let Some(ref m) = self.metrics {
                        m.record_demotions(1);
                    }

                    let store = self.store.clone();
                    let mailer = self.mailer.clone();
                    let metrics = self.metrics.clone();
                    deliveries.spawn(async move {
                        let outcome = deliver(&store, mailer.as_ref(), &demotion).await;
                        if let Some(m) = metrics {
                            m.record_notification(outcome.as_str());
                        }
                        outcome
                    });
                }

                Some(_) = deliveries.join_next() => {}

                _ = shutdown.cancelled() => break,
            }
        }

        if !deliveries.is_empty() {
            info!(pending = deliveries.len(), "Waiting for notifications in flight");
        }
        while deliveries.join_next().await.is_some() {}

        info!("Notifier task stopped");
    }
}

/// Mail the target registered for a demoted node, if any. Never retried.
pub async fn deliver(store: &SharedStore, mailer: &dyn Mailer, demotion: &Demotion) -> Delivery {
    let to = match store.get_email(&demotion.callsign).await {
        Ok(Some(to)) => to,
        Ok(None) => {
            debug!(callsign = %demotion.callsign, "No notification target registered");
            return Delivery::NoTarget;
        }
        Err(e) => {
            warn!(callsign = %demotion.callsign, error = %e, "Failed to look up notification target");
            return Delivery::LookupFailed;
        }
    };

    let message = MailMessage::node_down(to.clone(), &demotion.callsign, demotion.last_seen);
    match mailer.send(message).await {
        Ok(()) => {
            info!(callsign = %demotion.callsign, to = %to, "Sent node down notification");
            Delivery::Sent
        }
        Err(e) => {
            warn!(callsign = %demotion.callsign, to = %to, error = %e, "Failed to send notification");
            Delivery::Failed
        }
    }
}
