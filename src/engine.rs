// src/engine.rs
//! Wires the engine together: instance lock, store, feeds, sinks, pollers,
//! and the shutdown path.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Settings;
use crate::lock::InstanceLock;
use crate::notify::{dashboard::DashboardSink, telegram::TelegramSink, Dispatcher, Sink};
use crate::poller::Poller;
use crate::sources::{
    campaigns::CampaignFeed, documents::DocumentFeed, news::NewsFeed,
    recovery::RecoveryUpdateFeed, SourceFeed,
};
use crate::store::FingerprintStore;

pub struct Engine {
    settings: Settings,
}

impl Engine {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Run until ctrl-c. Lock acquisition failure is fatal and intentionally
    /// not retried: a second engine against the same store would duplicate
    /// scheduling and fetch load.
    pub async fn run(self) -> Result<()> {
        let settings = self.settings;

        let lock = InstanceLock::acquire(&settings.lock_path)?;
        let store = Arc::new(FingerprintStore::open(&settings.store_path)?);

        let client = reqwest::Client::builder()
            .user_agent(settings.http.user_agent.clone())
            .timeout(Duration::from_secs(settings.http.timeout_secs))
            .build()
            .context("building http client")?;

        let mut sinks: Vec<Arc<dyn Sink>> = Vec::new();
        if settings.sinks.telegram {
            sinks.push(Arc::new(TelegramSink::from_env(client.clone())));
        }
        if settings.sinks.dashboard {
            sinks.push(Arc::new(DashboardSink::new(&settings.sinks.dashboard_spool)));
        }
        let dispatcher = Arc::new(Dispatcher::new(sinks));
        tracing::info!(sinks = dispatcher.sink_count(), "dispatcher ready");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut pollers: Vec<JoinHandle<()>> = Vec::new();

        let mut spawn = |feed: Arc<dyn SourceFeed>, interval_secs: u64| {
            let poller = Poller::new(
                feed,
                Arc::clone(&store),
                Arc::clone(&dispatcher),
                Duration::from_secs(interval_secs),
                settings.backoff,
                shutdown_rx.clone(),
            );
            pollers.push(poller.spawn());
        };

        if settings.recovery_updates.enabled && !settings.recovery_updates.lenders.is_empty() {
            spawn(
                Arc::new(RecoveryUpdateFeed::new(client.clone(), &settings.recovery_updates)),
                settings.recovery_updates.interval_secs,
            );
        }
        if settings.campaigns.enabled {
            spawn(
                Arc::new(CampaignFeed::new(client.clone(), &settings.campaigns)),
                settings.campaigns.interval_secs,
            );
        }
        if settings.documents.enabled && !settings.documents.pages.is_empty() {
            spawn(
                Arc::new(DocumentFeed::new(client.clone(), &settings.documents)),
                settings.documents.interval_secs,
            );
        }
        if settings.news.enabled && !settings.news.endpoint.is_empty() {
            spawn(
                Arc::new(NewsFeed::new(client.clone(), &settings.news)),
                settings.news.interval_secs,
            );
        }

        if pollers.is_empty() {
            tracing::warn!("no feeds enabled; the engine will idle until shutdown");
        }

        tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
        tracing::info!("shutdown signal received");
        let _ = shutdown_tx.send(true);

        let grace = Duration::from_secs(settings.shutdown_grace_secs);
        for handle in pollers {
            if tokio::time::timeout(grace, handle).await.is_err() {
                tracing::warn!("poller did not stop within the grace period, abandoning");
            }
        }

        lock.release();
        tracing::info!("engine stopped");
        Ok(())
    }
}
