//! Capability interfaces for the remote video host.
//!
//! The upload pipeline only ever talks to these traits; any implementation
//! satisfying them is substitutable, which keeps the worker loop testable
//! with a fake host and no network.

mod youtube;

pub use youtube::{FileCredentialProvider, YouTubeHost};

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An authenticated session with the remote host.
#[derive(Debug, Clone)]
pub struct Session {
    /// Bearer token for API requests.
    pub access_token: String,
    /// When the access token expires, if known.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Returns true if the token is expired or expires within `margin_secs`.
    pub fn expires_within(&self, margin_secs: i64) -> bool {
        match self.expires_at {
            Some(expiry) => expiry <= Utc::now() + chrono::Duration::seconds(margin_secs),
            None => false,
        }
    }
}

/// Errors from credential acquisition or refresh.
///
/// Fatal at startup; recoverable mid-run only via re-authentication after a
/// quota suspension.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Credential file {0} not found or unreadable: {1}")]
    CredentialFile(String, #[source] std::io::Error),

    #[error("Malformed credential file {0}: {1}")]
    Malformed(String, #[source] serde_json::Error),

    #[error("Token refresh rejected: {0}")]
    RefreshRejected(String),

    #[error("Token endpoint unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Not authenticated")]
    NotAuthenticated,
}

/// Classified failure of a single upload attempt.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The remote API signalled rate-limit exhaustion. The worker suspends
    /// and retries the same item after the suspension window.
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Likely to succeed on a later attempt (network error, 5xx). The item
    /// is dropped for this run and retried on the next process start.
    #[error("Transient upload failure: {0}")]
    Transient(String),

    /// Rejected by the remote API (4xx other than quota). The worker treats
    /// this the same as a transient failure.
    #[error("Permanent upload failure: {0}")]
    Permanent(String),
}

/// Identifier of an uploaded video on the remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteVideoId(pub String);

/// Identifier of a named remote collection (playlist).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionId(pub String);

/// Visibility level applied to uploads and created collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Unlisted,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Unlisted => "unlisted",
            Visibility::Private => "private",
        }
    }
}

impl Default for Visibility {
    fn default() -> Self {
        Visibility::Private
    }
}

/// Metadata attached to an upload attempt.
#[derive(Debug, Clone)]
pub struct VideoDetails {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category_id: String,
    pub visibility: Visibility,
}

/// Provider of authenticated sessions.
///
/// Must be re-invoked after a quota-induced multi-hour suspension, since the
/// prior session may have expired during the wait.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Acquire a session from stored credentials.
    async fn authenticate(&self) -> Result<Session, AuthError>;

    /// Refresh an existing (possibly expired) session.
    async fn refresh(&self, session: &Session) -> Result<Session, AuthError>;
}

/// The remote video-hosting API: uploads plus named collections.
#[async_trait]
pub trait VideoHost: Send + Sync {
    /// Authenticate and establish the initial session. Fatal on failure.
    async fn connect(&self) -> Result<(), AuthError>;

    /// Re-acquire the session after a long suspension.
    async fn reconnect(&self) -> Result<(), AuthError>;

    /// Upload a single file. Returns the remote identifier on success or a
    /// classified failure.
    async fn upload(&self, file: &Path, details: &VideoDetails)
        -> Result<RemoteVideoId, UploadError>;

    /// List existing collections as (id, display name) pairs.
    async fn list_collections(&self) -> Result<Vec<(CollectionId, String)>, UploadError>;

    /// Create a collection with the given display name and visibility.
    async fn create_collection(
        &self,
        name: &str,
        visibility: Visibility,
    ) -> Result<CollectionId, UploadError>;

    /// Attach an uploaded video to a collection.
    async fn add_to_collection(
        &self,
        collection: &CollectionId,
        video: &RemoteVideoId,
    ) -> Result<(), UploadError>;
}
