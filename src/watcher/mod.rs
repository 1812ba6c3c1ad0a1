//! Live filesystem watch feed.
//!
//! Watches the root recursively with `notify` and offers newly created media
//! files to the ingest queue for the lifetime of the process. The notify
//! callback runs on the watcher's own thread and bridges events into a tokio
//! channel; a spawned task filters and admits them. Delivery is at least
//! once by design - the queue and ledger own deduplication, since a file may
//! be seen by both the startup scan and the live watch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::scanner::{is_media_file, is_under_excluded_dir, CandidateFile};
use crate::upload_manager::IngestQueue;

/// Capacity of the channel bridging the notify callback to the tokio task.
/// A full channel drops the event with a warning; the next startup scan
/// picks up anything missed.
const CHANNEL_CAPACITY: usize = 512;

/// Recursive watch over the media root feeding the ingest queue.
///
/// The underlying `notify` watcher must be kept alive - dropping it
/// deregisters the OS file-watch and stops all event delivery.
pub struct WatchFeed {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl WatchFeed {
    /// Start watching `root` recursively, offering new media files to
    /// `queue` until the shutdown token fires.
    pub fn start(
        root: &Path,
        queue: Arc<IngestQueue>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("Failed to resolve watch root {:?}", root))?;

        let (bridge_tx, bridge_rx) = mpsc::channel::<notify::Event>(CHANNEL_CAPACITY);

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if bridge_tx.try_send(event).is_err() {
                        warn!(
                            "Watch event channel full (capacity {}), dropping event",
                            CHANNEL_CAPACITY
                        );
                    }
                }
                Err(e) => warn!("Watch error: {}", e),
            },
            notify::Config::default(),
        )
        .context("Failed to create filesystem watcher")?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {:?}", root))?;
        info!("Watching {:?} for new media files", root);

        let task = tokio::spawn(event_loop(root, bridge_rx, queue, shutdown));

        Ok(Self {
            _watcher: watcher,
            task,
        })
    }

    /// Stop delivering events and wait for the event task to finish.
    pub async fn stop(self) {
        // Dropping the watcher stops the OS watch; the task exits via its
        // shutdown token or the closed channel.
        let WatchFeed { _watcher, task } = self;
        drop(_watcher);
        let _ = task.await;
    }
}

async fn event_loop(
    root: PathBuf,
    mut rx: mpsc::Receiver<notify::Event>,
    queue: Arc<IngestQueue>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => handle_event(&root, event, &queue),
                None => break,
            },
            _ = shutdown.cancelled() => break,
        }
    }
    info!("Watch feed stopped");
}

fn handle_event(root: &Path, event: notify::Event, queue: &IngestQueue) {
    // New files arrive as create events, or as rename-to events when they
    // are moved into the tree (e.g. out of a staging directory).
    let is_arrival = matches!(
        event.kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both))
    );
    if !is_arrival {
        return;
    }

    for path in event.paths {
        if !is_media_file(&path) {
            continue;
        }

        // Key candidates by canonical path so watch-fed entries match the
        // scanner's (and therefore the ledger's) form.
        let path = match path.canonicalize() {
            Ok(path) => path,
            Err(_) => continue, // already gone again
        };

        let relative = path.strip_prefix(root).unwrap_or(&path);
        if is_under_excluded_dir(relative) {
            debug!("Ignoring {:?}: under excluded directory", path);
            continue;
        }
        if path.is_dir() {
            continue;
        }

        match CandidateFile::from_path(path) {
            Ok(candidate) => {
                queue.offer(candidate);
            }
            Err(e) => warn!("Failed to read metadata for watched file: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    use crate::ledger::UploadLedger;

    fn make_queue(temp: &TempDir) -> Arc<IngestQueue> {
        let ledger = Arc::new(UploadLedger::load(temp.path().join("uploaded.json")).unwrap());
        Arc::new(IngestQueue::new(ledger))
    }

    async fn wait_for_len(queue: &IngestQueue, len: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while queue.len() < len {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("queue did not reach expected length");
    }

    #[tokio::test]
    async fn test_new_media_file_is_admitted() {
        let temp = TempDir::new().unwrap();
        let media_root = temp.path().join("media");
        fs::create_dir(&media_root).unwrap();

        let queue = make_queue(&temp);
        let shutdown = CancellationToken::new();
        let feed = WatchFeed::start(&media_root, queue.clone(), shutdown.child_token()).unwrap();

        fs::write(media_root.join("new clip.mp4"), b"data").unwrap();
        wait_for_len(&queue, 1).await;

        let candidate = queue.try_take().unwrap();
        assert!(candidate.path.ends_with("new clip.mp4"));

        shutdown.cancel();
        feed.stop().await;
    }

    #[tokio::test]
    async fn test_non_media_and_excluded_files_dropped() {
        let temp = TempDir::new().unwrap();
        let media_root = temp.path().join("media");
        fs::create_dir(&media_root).unwrap();
        fs::create_dir(media_root.join("unsorted")).unwrap();

        let queue = make_queue(&temp);
        let shutdown = CancellationToken::new();
        let feed = WatchFeed::start(&media_root, queue.clone(), shutdown.child_token()).unwrap();

        fs::write(media_root.join("notes.txt"), b"text").unwrap();
        fs::write(media_root.join("unsorted").join("pending.mp4"), b"data").unwrap();
        // A real media file afterwards, to bound the wait.
        fs::write(media_root.join("ready.mkv"), b"data").unwrap();

        wait_for_len(&queue, 1).await;
        // Give stray events a moment to surface before asserting.
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(queue.len(), 1);
        assert!(queue.try_take().unwrap().path.ends_with("ready.mkv"));

        shutdown.cancel();
        feed.stop().await;
    }

    #[tokio::test]
    async fn test_file_created_in_new_subdirectory() {
        let temp = TempDir::new().unwrap();
        let media_root = temp.path().join("media");
        fs::create_dir(&media_root).unwrap();

        let queue = make_queue(&temp);
        let shutdown = CancellationToken::new();
        let feed = WatchFeed::start(&media_root, queue.clone(), shutdown.child_token()).unwrap();

        let sub = media_root.join("season2");
        fs::create_dir(&sub).unwrap();
        // Small delay so the recursive watch covers the new directory.
        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(sub.join("ep1.avi"), b"data").unwrap();

        wait_for_len(&queue, 1).await;
        assert!(queue.try_take().unwrap().path.ends_with("ep1.avi"));

        shutdown.cancel();
        feed.stop().await;
    }
}
