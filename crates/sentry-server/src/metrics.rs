//! Prometheus metrics for the sentry server.

use liveness::Partition;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::time::Duration;

/// Labels for outcome counters
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ResultLabels {
    /// Outcome (accepted, invalid_frame, no_position, sent, failed, ...)
    pub result: String,
}

/// Labels for node gauges
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PartitionLabels {
    /// live or dead
    pub partition: String,
}

/// Metrics registry with all sentry metrics
pub struct MetricsRegistry {
    /// Prometheus registry
    pub registry: Registry,

    /// Observations handled, by outcome
    observations_total: Family<ResultLabels, Counter>,
    /// Time spent applying one observation
    observation_duration_seconds: Histogram,
    /// Nodes moved from live to dead
    demotions_total: Counter,
    /// Down notifications, by outcome
    notifications_total: Family<ResultLabels, Counter>,
    /// Feed reconnects
    feed_redials_total: Counter,
    /// Nodes per partition
    nodes: Family<PartitionLabels, Gauge>,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let observations_total = Family::<ResultLabels, Counter>::default();
        registry.register(
            "sentry_observations",
            "Observations received from the feed",
            observations_total.clone(),
        );

        // Exponential buckets from 10µs to ~160ms
        let observation_duration_seconds = Histogram::new(exponential_buckets(0.00001, 2.0, 15));
        registry.register(
            "sentry_observation_duration_seconds",
            "Time spent applying one observation to the store",
            observation_duration_seconds.clone(),
        );

        let demotions_total = Counter::default();
        registry.register(
            "sentry_demotions",
            "Nodes demoted from live to dead",
            demotions_total.clone(),
        );

        let notifications_total = Family::<ResultLabels, Counter>::default();
        registry.register(
            "sentry_notifications",
            "Node down notifications",
            notifications_total.clone(),
        );

        let feed_redials_total = Counter::default();
        registry.register(
            "sentry_feed_redials",
            "Reconnects to the APRS-IS feed",
            feed_redials_total.clone(),
        );

        let nodes = Family::<PartitionLabels, Gauge>::default();
        registry.register("sentry_nodes", "Nodes per partition", nodes.clone());

        Self {
            registry,
            observations_total,
            observation_duration_seconds,
            demotions_total,
            notifications_total,
            feed_redials_total,
            nodes,
        }
    }

    /// Record one handled observation
    pub fn record_observation(&self, result: &str, duration: Duration) {
        self.observations_total
            .get_or_create(&ResultLabels {
                result: result.to_string(),
            })
            .inc();
        self.observation_duration_seconds
            .observe(duration.as_secs_f64());
    }

    pub fn record_demotions(&self, count: usize) {
        self.demotions_total.inc_by(count as u64);
    }

    /// Record a notification outcome (sent, failed, no_target, lookup_failed)
    pub fn record_notification(&self, result: &str) {
        self.notifications_total
            .get_or_create(&ResultLabels {
                result: result.to_string(),
            })
            .inc();
    }

    pub fn record_redial(&self) {
        self.feed_redials_total.inc();
    }

    /// Update the node gauge for one partition
    pub fn set_nodes(&self, partition: Partition, count: usize) {
        self.nodes
            .get_or_create(&PartitionLabels {
                partition: partition.as_str().to_string(),
            })
            .set(count as i64);
    }

    /// Encode every metric in Prometheus text format
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        prometheus_client::encoding::text::encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}
