//! Tubesync Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod config;
pub mod ledger;
pub mod remote;
pub mod scanner;
pub mod supervisor;
pub mod upload_manager;
pub mod watcher;

// Re-export commonly used types for convenience
pub use ledger::UploadLedger;
pub use remote::{CredentialProvider, VideoHost};
pub use scanner::CandidateFile;
pub use supervisor::Supervisor;
pub use upload_manager::{IngestQueue, QuotaPolicy, UploadWorker};
