//! Startup and shutdown orchestration.
//!
//! Owns the run lifecycle: authenticate, load the ledger, start the live
//! watch, seed the queue from the startup scan, resolve the target
//! collection, then hand control to the upload worker until shutdown.
//!
//! The watch starts before the scan so a file landing between the two is
//! seen at least once; the queue deduplicates the overlap.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::ledger::UploadLedger;
use crate::remote::VideoHost;
use crate::scanner;
use crate::upload_manager::{CollectionResolver, IngestQueue, UploadWorker};
use crate::watcher::WatchFeed;

pub struct Supervisor {
    config: AppConfig,
    host: Arc<dyn VideoHost>,
}

impl Supervisor {
    pub fn new(config: AppConfig, host: Arc<dyn VideoHost>) -> Self {
        Self { config, host }
    }

    /// Run the pipeline until the shutdown token fires.
    ///
    /// Fatal errors (authentication, corrupt ledger, ledger write failures)
    /// are propagated; per-file failures are handled inside the worker.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        self.host
            .connect()
            .await
            .context("Failed to authenticate with the video host")?;
        info!("Authenticated with remote host");

        let ledger = Arc::new(UploadLedger::load(self.config.ledger_path.clone())?);
        info!(
            "Loaded upload ledger from {:?} ({} entries)",
            self.config.ledger_path,
            ledger.len()
        );

        let queue = Arc::new(IngestQueue::new(ledger.clone()));

        // Live watch first, startup scan second.
        let watch = WatchFeed::start(&self.config.watch_root, queue.clone(), shutdown.clone())?;

        let backlog = scanner::scan(&self.config.watch_root)?;
        let mut admitted = 0;
        for candidate in backlog {
            if queue.offer(candidate) {
                admitted += 1;
            }
        }
        info!("Startup scan admitted {} pending files", admitted);

        let collection = CollectionResolver::new(self.host.clone())
            .resolve(
                &self.config.collection_name,
                self.config.uploader.visibility,
            )
            .await
            .with_context(|| {
                format!(
                    "Failed to resolve collection '{}'",
                    self.config.collection_name
                )
            })?;

        let worker = UploadWorker::new(
            queue,
            ledger.clone(),
            self.host.clone(),
            collection,
            self.config.uploader.clone(),
        );
        let result = worker.run(shutdown).await;

        watch.stop().await;

        // The ledger is already written after every upload; this is only a
        // final safety net before exit.
        if let Err(e) = ledger.persist() {
            warn!("Final ledger persist failed: {}", e);
        }

        result
    }
}
