//! Process orchestration: wires the store, feed, reaper, notifier and HTTP facade.

use crate::aprs::AprsIsClient;
use crate::feed::{Backoff, FeedDriver};
use crate::http_server::{ApiState, HttpServer, admin_router, public_router};
use crate::mail::{LogMailer, MailgunMailer, Mailer};
use crate::metrics::MetricsRegistry;
use crate::notifier::Notifier;
use crate::types::{ServerConfig, StorageBackend};
use common::Error;
use liveness::{LivenessWorker, MemoryStore, Reaper, RedbStore, SharedStore, Store, StoreError};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Open the configured backend
pub async fn open_store(backend: &StorageBackend) -> Result<SharedStore, StoreError> {
    match backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::Redb { file, open_timeout } => {
            Ok(Arc::new(RedbStore::open(file, *open_timeout).await?))
        }
    }
}

/// Build the mail transport; without Mailgun settings notifications are only logged
pub fn build_mailer(config: &ServerConfig) -> common::Result<Arc<dyn Mailer>> {
    match &config.mailgun {
        Some(options) => Ok(Arc::new(MailgunMailer::new(options).map_err(Error::mail)?)),
        None => {
            warn!("No mailgun section configured, notifications will only be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}

/// Sentry server: owns the shared context every task is handed
pub struct SentryServer {
    config: ServerConfig,
    store: SharedStore,
    metrics: Arc<MetricsRegistry>,
    shutdown: CancellationToken,
}

impl SentryServer {
    /// Open the configured store and create the server
    pub async fn new(config: ServerConfig) -> common::Result<Self> {
        let store = open_store(&config.storage).await.map_err(Error::store)?;
        Ok(Self::with_store(config, store))
    }

    /// Create the server around an already opened store
    pub fn with_store(config: ServerConfig, store: SharedStore) -> Self {
        Self {
            config,
            store,
            metrics: Arc::new(MetricsRegistry::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn store(&self) -> SharedStore {
        self.store.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsRegistry> {
        self.metrics.clone()
    }

    /// Token that stops every task when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until shutdown is requested, the feed fails or an HTTP listener fails
    pub async fn run(self) -> common::Result<()> {
        let mailer = build_mailer(&self.config)?;
        self.run_with_mailer(mailer).await
    }

    /// Run with a caller supplied mail transport
    pub async fn run_with_mailer(self, mailer: Arc<dyn Mailer>) -> common::Result<()> {
        info!(
            store = self.store.name(),
            mailer = mailer.name(),
            server = %self.config.aprs.server,
            "Starting sentry server"
        );

        let (demotion_tx, demotion_rx) = mpsc::unbounded_channel();
        let metrics = Some(self.metrics.clone());

        let worker = Arc::new(LivenessWorker::new(self.store.clone()));
        let reaper = Reaper::new(self.store.clone(), self.config.reaper.clone(), demotion_tx);
        let notifier = Notifier::new(
            demotion_rx,
            self.store.clone(),
            mailer,
            metrics.clone(),
        );
        let driver = FeedDriver::new(
            AprsIsClient::new(self.config.aprs.clone()),
            worker,
            Backoff::new(self.config.backoff_initial, self.config.backoff_max),
            metrics,
        );

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        let mut http_tasks: Vec<JoinHandle<common::Result<()>>> = Vec::new();

        let token = self.shutdown.clone();
        tasks.push(tokio::spawn(async move { reaper.run(token).await }));

        let token = self.shutdown.clone();
        tasks.push(tokio::spawn(async move { notifier.run(token).await }));

        if self.config.http_enabled {
            let public = HttpServer::new(
                "public",
                self.config.listen_addr.clone(),
                public_router(ApiState {
                    store: self.store.clone(),
                    metrics: self.metrics.clone(),
                }),
            );
            let admin = HttpServer::new(
                "admin",
                self.config.admin_listen_addr.clone(),
                admin_router(self.store.clone()),
            );

            for server in [public, admin] {
                let token = self.shutdown.clone();
                http_tasks.push(tokio::spawn(async move {
                    server.run(token.clone()).await.map_err(|e| {
                        error!(error = %e, "HTTP server failed, shutting down");
                        token.cancel();
                        Error::http(e)
                    })
                }));
            }
        } else {
            info!("HTTP facade disabled");
        }

        let token = self.shutdown.clone();
        let mut feed = tokio::spawn(async move { driver.run(token).await });

        info!("All tasks spawned, server running");

        let mut result = tokio::select! {
            joined = &mut feed => match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    error!(error = %e, "Feed failed");
                    Err(Error::feed(e))
                }
                Err(e) => Err(Error::other(format!("feed task panicked: {e}"))),
            },
            _ = self.shutdown.cancelled() => {
                info!("Shutdown requested");
                if let Err(e) = (&mut feed).await {
                    warn!(error = %e, "Feed task did not stop cleanly");
                }
                Ok(())
            }
        };

        self.shutdown.cancel();
        for joined in futures::future::join_all(tasks).await {
            if let Err(e) = joined {
                warn!(error = %e, "Task did not stop cleanly");
            }
        }

        for joined in futures::future::join_all(http_tasks).await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
                Err(e) => warn!(error = %e, "HTTP task did not stop cleanly"),
            }
        }

        info!("Sentry server stopped");
        result
    }
}
