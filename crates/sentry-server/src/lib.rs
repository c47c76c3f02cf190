//! Sentry server: watches APRS-IS for nodes that go quiet.
//!
//! # Architecture
//!
//! One process runs four cooperating tasks over a shared [`liveness::Store`]:
//! - **Feed**: reads frames from an APRS-IS server, parses positions and hands
//!   each observation to the liveness worker, redialing with capped backoff
//! - **Reaper**: demotes nodes silent for longer than the configured cutoff
//! - **Notifier**: mails the registered target of every demoted node
//! - **HTTP**: public node status and metrics, plus a loopback-only admin
//!   listener for notification targets
//!
//! Everything is wired by [`SentryServer`] from a YAML [`Config`].

pub mod aprs;
pub mod config;
pub mod feed;
pub mod frame;
pub mod http_server;
pub mod mail;
pub mod metrics;
pub mod notifier;
pub mod server;
pub mod types;

pub use aprs::{AprsIsClient, AprsIsSettings};
pub use config::{Config, ConfigError};
pub use feed::{Backoff, FeedDriver, FeedError, ObservationSource};
pub use http_server::{ApiState, HttpServer, admin_router, public_router};
pub use mail::{LogMailer, MailError, MailMessage, MailgunMailer, Mailer};
pub use metrics::MetricsRegistry;
pub use notifier::{Delivery, Notifier};
pub use server::{SentryServer, open_store};
pub use types::{MailgunOptions, ServerConfig, StorageBackend};
