//! Deduplicated FIFO work queue bridging discovery and upload.
//!
//! The queue is the single serialization point between the two concurrent
//! producers (startup scan, live watch feed) and the one consumer (upload
//! worker). Admission checks the ledger and current membership under one
//! lock, so the same path offered simultaneously by scan and watch is
//! admitted exactly once.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tracing::debug;

use crate::ledger::UploadLedger;
use crate::scanner::CandidateFile;

struct QueueInner {
    items: VecDeque<CandidateFile>,
    /// Paths admitted and not yet terminally handled: everything in `items`
    /// plus the worker's current in-flight item. Membership survives `take`
    /// so an at-least-once watch re-delivery arriving while the worker holds
    /// the path (e.g. during the stabilization wait) is not re-admitted;
    /// the worker releases it via [`IngestQueue::complete`].
    queued: HashSet<PathBuf>,
}

/// Ordered, deduplicated queue of candidates awaiting upload.
pub struct IngestQueue {
    ledger: Arc<UploadLedger>,
    inner: Mutex<QueueInner>,
    available: Notify,
}

impl IngestQueue {
    pub fn new(ledger: Arc<UploadLedger>) -> Self {
        Self {
            ledger,
            inner: Mutex::new(QueueInner {
                items: VecDeque::new(),
                queued: HashSet::new(),
            }),
            available: Notify::new(),
        }
    }

    /// Offer a candidate for upload.
    ///
    /// No-op if the path is already in the ledger or already queued
    /// (idempotent admission). Returns true if the candidate was admitted.
    pub fn offer(&self, candidate: CandidateFile) -> bool {
        let mut inner = self.inner.lock().unwrap();

        if self.ledger.contains(&candidate.path) {
            debug!("Not admitting {:?}: already uploaded", candidate.path);
            return false;
        }
        if !inner.queued.insert(candidate.path.clone()) {
            debug!("Not admitting {:?}: already queued", candidate.path);
            return false;
        }

        debug!("Admitted {:?}", candidate.path);
        inner.items.push_back(candidate);
        drop(inner);
        self.available.notify_one();
        true
    }

    /// Return a quota-bounced in-flight candidate to the head of the queue
    /// so it is re-processed before newer items. Bypasses the ledger check:
    /// the item was already admitted once and is not yet ledgered. The path
    /// is still held in the queued set from its original admission.
    pub fn requeue_front(&self, candidate: CandidateFile) {
        let mut inner = self.inner.lock().unwrap();
        inner.queued.insert(candidate.path.clone());
        inner.items.push_front(candidate);
        drop(inner);
        self.available.notify_one();
    }

    /// Take the next candidate, blocking until one is available. FIFO order.
    ///
    /// The taken path stays held against re-admission until `complete` is
    /// called for it (or it is returned via `requeue_front`).
    pub async fn take(&self) -> CandidateFile {
        loop {
            // Register for notification before checking, so an offer racing
            // with this take cannot be missed.
            let notified = self.available.notified();
            if let Some(candidate) = self.pop() {
                return candidate;
            }
            notified.await;
        }
    }

    /// Non-blocking take.
    pub fn try_take(&self) -> Option<CandidateFile> {
        self.pop()
    }

    /// Release the dedup hold on a taken path after a terminal outcome
    /// (uploaded and ledgered, or dropped for this run). Until this is
    /// called, re-deliveries of the in-flight path are not re-admitted.
    pub fn complete(&self, path: &Path) {
        self.inner.lock().unwrap().queued.remove(path);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn pop(&self) -> Option<CandidateFile> {
        // Deliberately leaves the path in `queued`: it is now in flight.
        self.inner.lock().unwrap().items.pop_front()
    }
}
