//! Shared fixtures for the end-to-end pipeline tests.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use tubesync::config::{AppConfig, UploaderSettings};
use tubesync::remote::{
    AuthError, CollectionId, RemoteVideoId, UploadError, VideoDetails, VideoHost, Visibility,
};
use tubesync::supervisor::Supervisor;

/// In-memory video host recording every call, with optionally scripted
/// upload outcomes (consumed in order; when exhausted, uploads succeed).
pub struct FakeVideoHost {
    outcomes: Mutex<VecDeque<Result<RemoteVideoId, UploadError>>>,
    pub uploads: Mutex<Vec<PathBuf>>,
    pub attached: Mutex<Vec<(String, String)>>,
    pub created_collections: Mutex<Vec<String>>,
    existing_collections: Vec<(CollectionId, String)>,
    pub connects: AtomicUsize,
    pub reconnects: AtomicUsize,
    upload_counter: AtomicUsize,
}

impl FakeVideoHost {
    pub fn new() -> Self {
        Self::with_outcomes(vec![])
    }

    pub fn with_outcomes(outcomes: Vec<Result<RemoteVideoId, UploadError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            uploads: Mutex::new(Vec::new()),
            attached: Mutex::new(Vec::new()),
            created_collections: Mutex::new(Vec::new()),
            existing_collections: Vec::new(),
            connects: AtomicUsize::new(0),
            reconnects: AtomicUsize::new(0),
            upload_counter: AtomicUsize::new(0),
        }
    }

    pub fn with_existing_collection(mut self, id: &str, name: &str) -> Self {
        self.existing_collections
            .push((CollectionId(id.to_string()), name.to_string()));
        self
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    pub fn uploaded_file_names(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect()
    }
}

#[async_trait]
impl VideoHost for FakeVideoHost {
    async fn connect(&self) -> Result<(), AuthError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reconnect(&self) -> Result<(), AuthError> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn upload(
        &self,
        file: &Path,
        _details: &VideoDetails,
    ) -> Result<RemoteVideoId, UploadError> {
        self.uploads.lock().unwrap().push(file.to_path_buf());
        match self.outcomes.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => {
                let n = self.upload_counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(RemoteVideoId(format!("vid-{}", n)))
            }
        }
    }

    async fn list_collections(&self) -> Result<Vec<(CollectionId, String)>, UploadError> {
        Ok(self.existing_collections.clone())
    }

    async fn create_collection(
        &self,
        name: &str,
        _visibility: Visibility,
    ) -> Result<CollectionId, UploadError> {
        self.created_collections.lock().unwrap().push(name.to_string());
        Ok(CollectionId(format!("created-{}", name)))
    }

    async fn add_to_collection(
        &self,
        collection: &CollectionId,
        video: &RemoteVideoId,
    ) -> Result<(), UploadError> {
        self.attached
            .lock()
            .unwrap()
            .push((collection.0.clone(), video.0.clone()));
        Ok(())
    }
}

/// A running pipeline against a temp media root and a fake host.
///
/// Keep the instance alive for the duration of the test; the temp directory
/// (media root and ledger file) is removed when it drops.
pub struct TestPipeline {
    _temp: TempDir,
    pub media_root: PathBuf,
    pub ledger_path: PathBuf,
    pub host: Arc<FakeVideoHost>,
    pub shutdown: CancellationToken,
    handle: Option<tokio::task::JoinHandle<anyhow::Result<()>>>,
}

impl TestPipeline {
    /// Build the media root, write `backlog` files into it, and start the
    /// supervisor with near-zero waits so tests run in real time.
    pub async fn start(host: FakeVideoHost, backlog: &[&str]) -> Self {
        Self::start_with(host, backlog, 1).await
    }

    pub async fn start_with(
        host: FakeVideoHost,
        backlog: &[&str],
        quota_suspension_secs: u64,
    ) -> Self {
        let temp = TempDir::new().unwrap();
        let media_root = temp.path().join("camera_roll");
        std::fs::create_dir(&media_root).unwrap();
        for name in backlog {
            let path = media_root.join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(&path, b"data").unwrap();
            // Keep creation timestamps strictly ordered.
            std::thread::sleep(std::time::Duration::from_millis(20));
        }

        let ledger_path = temp.path().join("uploaded.json");
        let host = Arc::new(host);

        let config = AppConfig {
            watch_root: media_root.clone(),
            ledger_path: ledger_path.clone(),
            client_secret_path: temp.path().join("client_secret.json"),
            token_path: temp.path().join("token.json"),
            collection_name: "camera_roll".to_string(),
            uploader: UploaderSettings {
                stabilization_wait_secs: 0,
                quota_suspension_secs,
                ..UploaderSettings::default()
            },
        };

        let shutdown = CancellationToken::new();
        let supervisor = Supervisor::new(config, host.clone());
        let handle = tokio::spawn(supervisor.run(shutdown.clone()));

        Self {
            _temp: temp,
            media_root,
            ledger_path,
            host,
            shutdown,
            handle: Some(handle),
        }
    }

    /// Wait until the fake host has seen at least `count` upload attempts.
    pub async fn wait_for_uploads(&self, count: usize) {
        tokio::time::timeout(std::time::Duration::from_secs(10), async {
            while self.host.upload_count() < count {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("expected uploads did not happen in time");
    }

    /// Cancel the shutdown token and wait for the supervisor to return.
    pub async fn stop(&mut self) -> anyhow::Result<()> {
        self.shutdown.cancel();
        match self.handle.take() {
            Some(handle) => handle.await.unwrap(),
            None => Ok(()),
        }
    }
}
