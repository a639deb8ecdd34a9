//! The long-running clerk daemon — `gavel run`.
//!
//! Starts the single browser session worker and the change detector, then
//! runs until interrupted. Judge decisions do not pass through the daemon;
//! they are executed by the embedding surface (or `gavel decide`) against
//! their own session.

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use super::open_store;
use gavel::config::GavelConfig;
use gavel::detector::{Detector, DetectorSettings};
use gavel::notify::{NoopNotifier, Notify, WebhookNotifier};
use gavel::session::{BrowserSettings, SessionWorker};

pub async fn cmd_run(config: GavelConfig) -> Result<()> {
    let store = open_store(&config)?;

    let notifier: Arc<dyn Notify> = match &config.notify.webhook_url {
        Some(url) if !url.is_empty() => {
            info!(url = %url, "webhook notifier enabled");
            Arc::new(WebhookNotifier::new(url.clone()))
        }
        _ => {
            warn!("no webhook configured, notifications are dropped");
            Arc::new(NoopNotifier)
        }
    };

    let (session, worker_task) = SessionWorker::spawn(BrowserSettings::from_config(&config))
        .await
        .map_err(anyhow::Error::from)?;

    let detector = Detector::new(
        store,
        Arc::new(session.clone()),
        notifier,
        DetectorSettings::from_config(&config),
    );

    info!("gavel clerk running, press Ctrl-C to stop");
    tokio::select! {
        _ = detector.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
        }
    }

    session.shutdown().await;
    let _ = worker_task.await;
    Ok(())
}
