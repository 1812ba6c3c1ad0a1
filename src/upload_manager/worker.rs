//! The upload worker loop.
//!
//! Single consumer of the ingest queue: waits for a candidate to stabilize
//! on disk, uploads it, and applies the quota policy on rate-limit failures.
//! Per-file failures never crash the loop; only a failed re-authentication
//! after a suspension (and ledger write failures, which would break the
//! exactly-once guarantee) are propagated as fatal.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::UploaderSettings;
use crate::ledger::UploadLedger;
use crate::remote::{CollectionId, UploadError, VideoDetails, VideoHost};
use crate::scanner::CandidateFile;

use super::queue::IngestQueue;
use super::quota::QuotaPolicy;

pub struct UploadWorker {
    queue: Arc<IngestQueue>,
    ledger: Arc<UploadLedger>,
    host: Arc<dyn VideoHost>,
    collection: CollectionId,
    quota: QuotaPolicy,
    stabilization_wait: Duration,
    settings: UploaderSettings,
}

impl UploadWorker {
    pub fn new(
        queue: Arc<IngestQueue>,
        ledger: Arc<UploadLedger>,
        host: Arc<dyn VideoHost>,
        collection: CollectionId,
        settings: UploaderSettings,
    ) -> Self {
        Self {
            queue,
            ledger,
            host,
            collection,
            quota: QuotaPolicy::new(Duration::from_secs(settings.quota_suspension_secs)),
            stabilization_wait: Duration::from_secs(settings.stabilization_wait_secs),
            settings,
        }
    }

    /// Main processing loop - call from a spawned task or await directly.
    ///
    /// Runs until the shutdown token fires. An in-flight upload attempt is
    /// allowed to finish or fail naturally rather than being killed
    /// mid-transfer.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        info!(
            "Upload worker started (stabilization_wait={}s, quota_suspension={}s)",
            self.stabilization_wait.as_secs(),
            self.settings.quota_suspension_secs
        );

        loop {
            let candidate = tokio::select! {
                candidate = self.queue.take() => candidate,
                _ = shutdown.cancelled() => break,
            };

            // Stabilization wait: give the file time to finish being copied
            // before reading it. A heuristic, not a completion signal.
            tokio::select! {
                _ = tokio::time::sleep(self.stabilization_wait) => {}
                _ = shutdown.cancelled() => break,
            }

            let details = VideoDetails {
                title: candidate.title(),
                description: self.settings.description.clone(),
                tags: candidate.tag().into_iter().collect(),
                category_id: self.settings.category_id.clone(),
                visibility: self.settings.visibility,
            };

            match self.host.upload(&candidate.path, &details).await {
                Ok(video_id) => {
                    info!("Uploaded {:?} as {}", candidate.path, video_id.0);
                    if let Err(e) = self
                        .host
                        .add_to_collection(&self.collection, &video_id)
                        .await
                    {
                        // The upload itself succeeded; the path must still be
                        // ledgered or the next run would upload it twice.
                        warn!(
                            "Failed to attach {} to collection {}: {}",
                            video_id.0, self.collection.0, e
                        );
                    }
                    self.ledger
                        .record(&candidate.path)
                        .context("Failed to persist upload ledger")?;
                    // Release the in-flight hold only after the ledger entry
                    // is durable, so a racing re-delivery hits the ledger
                    // check instead of slipping through.
                    self.queue.complete(&candidate.path);
                    self.quota.record_success();
                }
                Err(UploadError::QuotaExceeded(msg)) => {
                    warn!("Quota exceeded uploading {:?}: {}", candidate.path, msg);
                    self.queue.requeue_front(candidate);
                    let until = self.quota.suspend();

                    tokio::select! {
                        _ = tokio::time::sleep_until(until) => {}
                        _ = shutdown.cancelled() => break,
                    }
                    self.quota.resume();

                    // The session may have expired during a multi-hour
                    // suspension; re-acquire it before the retry.
                    self.host
                        .reconnect()
                        .await
                        .context("Re-authentication after quota suspension failed")?;
                }
                Err(e) => {
                    // Transient and permanent failures alike: drop for this
                    // run. The path stays off the ledger, so the next process
                    // start retries it via the initial scan, and the hold is
                    // released so a later watch re-delivery may retry sooner.
                    warn!("Dropping {:?} for this run: {}", candidate.path, e);
                    self.queue.complete(&candidate.path);
                }
            }
        }

        info!("Upload worker stopped");
        Ok(())
    }
}
