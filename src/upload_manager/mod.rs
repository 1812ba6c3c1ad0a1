//! Upload manager module
//!
//! The processing side of the pipeline: the deduplicated FIFO queue bridging
//! discovery and upload, the quota suspension state machine, the collection
//! resolver, and the worker loop that drives uploads.

mod collection;
mod queue;
mod quota;
mod worker;

pub use collection::CollectionResolver;
pub use queue::IngestQueue;
pub use quota::{QuotaPolicy, QuotaState};
pub use worker::UploadWorker;
