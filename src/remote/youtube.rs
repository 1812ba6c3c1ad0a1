//! YouTube Data API v3 implementation of the remote capabilities.
//!
//! Credentials follow the Google OAuth installed-app layout: a
//! `client_secret.json` downloaded from the console and a `token.json`
//! holding the refresh token, provisioned out of band. The daemon never runs
//! an interactive consent flow; it only refreshes the access token and
//! rewrites `token.json` after a successful refresh.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use super::{
    AuthError, CollectionId, CredentialProvider, RemoteVideoId, Session, UploadError,
    VideoDetails, VideoHost, Visibility,
};

const API_BASE: &str = "https://www.googleapis.com";
const UPLOAD_BASE: &str = "https://www.googleapis.com";

/// Refresh the access token when it expires within this many seconds.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

// =============================================================================
// Credential files
// =============================================================================

#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    installed: InstalledSecret,
}

#[derive(Debug, Clone, Deserialize)]
struct InstalledSecret {
    client_id: String,
    client_secret: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// On-disk token state, matching the layout Google's client libraries write.
#[derive(Debug, Serialize, Deserialize)]
struct TokenFile {
    /// Current access token ("token" in Google's layout).
    #[serde(alias = "access_token")]
    token: Option<String>,
    refresh_token: String,
    expiry: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

/// Credential provider backed by `client_secret.json` and `token.json`.
pub struct FileCredentialProvider {
    client_secret_path: PathBuf,
    token_path: PathBuf,
    http: Client,
}

impl FileCredentialProvider {
    pub fn new(client_secret_path: impl Into<PathBuf>, token_path: impl Into<PathBuf>) -> Self {
        Self {
            client_secret_path: client_secret_path.into(),
            token_path: token_path.into(),
            http: Client::new(),
        }
    }

    fn load_client_secret(&self) -> Result<InstalledSecret, AuthError> {
        let name = self.client_secret_path.to_string_lossy().into_owned();
        let content = std::fs::read_to_string(&self.client_secret_path)
            .map_err(|e| AuthError::CredentialFile(name.clone(), e))?;
        let parsed: ClientSecretFile =
            serde_json::from_str(&content).map_err(|e| AuthError::Malformed(name, e))?;
        Ok(parsed.installed)
    }

    fn load_token_file(&self) -> Result<TokenFile, AuthError> {
        let name = self.token_path.to_string_lossy().into_owned();
        let content = std::fs::read_to_string(&self.token_path)
            .map_err(|e| AuthError::CredentialFile(name.clone(), e))?;
        serde_json::from_str(&content).map_err(|e| AuthError::Malformed(name, e))
    }

    fn store_token_file(&self, token: &TokenFile) -> Result<(), AuthError> {
        let name = self.token_path.to_string_lossy().into_owned();
        let json = serde_json::to_string_pretty(token)
            .map_err(|e| AuthError::Malformed(name.clone(), e))?;
        std::fs::write(&self.token_path, json).map_err(|e| AuthError::CredentialFile(name, e))
    }

    /// Exchange the stored refresh token for a fresh access token and
    /// rewrite `token.json` with the result.
    async fn refresh_access_token(&self) -> Result<Session, AuthError> {
        let secret = self.load_client_secret()?;
        let mut token_file = self.load_token_file()?;

        let response = self
            .http
            .post(&secret.token_uri)
            .form(&[
                ("client_id", secret.client_id.as_str()),
                ("client_secret", secret.client_secret.as_str()),
                ("refresh_token", token_file.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::RefreshRejected(format!("{}: {}", status, body)));
        }

        let refreshed: TokenResponse = response.json().await?;
        let expires_at = refreshed
            .expires_in
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs));

        token_file.token = Some(refreshed.access_token.clone());
        token_file.expiry = expires_at;
        if let Err(e) = self.store_token_file(&token_file) {
            // The session is still usable this run; only persistence failed.
            warn!("Failed to persist refreshed token: {}", e);
        }

        info!("Refreshed access token (expires_at: {:?})", expires_at);

        Ok(Session {
            access_token: refreshed.access_token,
            expires_at,
        })
    }
}

#[async_trait]
impl CredentialProvider for FileCredentialProvider {
    async fn authenticate(&self) -> Result<Session, AuthError> {
        let token_file = self.load_token_file()?;

        if let Some(token) = token_file.token {
            let session = Session {
                access_token: token,
                expires_at: token_file.expiry,
            };
            if !session.expires_within(TOKEN_EXPIRY_MARGIN_SECS) {
                debug!("Stored access token still valid");
                return Ok(session);
            }
        }

        self.refresh_access_token().await
    }

    async fn refresh(&self, _session: &Session) -> Result<Session, AuthError> {
        self.refresh_access_token().await
    }
}

// =============================================================================
// API client
// =============================================================================

/// YouTube-backed implementation of [`VideoHost`].
pub struct YouTubeHost {
    http: Client,
    credentials: Arc<dyn CredentialProvider>,
    session: RwLock<Option<Session>>,
}

impl YouTubeHost {
    pub fn new(credentials: Arc<dyn CredentialProvider>) -> Result<Self, AuthError> {
        // No overall timeout: uploads of large files legitimately take long.
        let http = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            credentials,
            session: RwLock::new(None),
        })
    }

    async fn bearer(&self) -> Result<String, UploadError> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
            .ok_or_else(|| UploadError::Transient("no active session".to_string()))
    }

    async fn read_failure(response: reqwest::Response) -> UploadError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        classify_failure(status, &body)
    }
}

/// Classify an HTTP failure into the upload error taxonomy.
///
/// 403 responses carry the quota signal in the error reason; 429 is always
/// rate limiting. Server-side errors and timeouts are transient; remaining
/// client errors are permanent rejections of this particular upload.
fn classify_failure(status: StatusCode, body: &str) -> UploadError {
    let message = format!("{}: {}", status, truncate(body, 500));

    if status == StatusCode::TOO_MANY_REQUESTS {
        return UploadError::QuotaExceeded(message);
    }
    if status == StatusCode::FORBIDDEN {
        let quota_reasons = ["quotaExceeded", "dailyLimitExceeded", "rateLimitExceeded"];
        if quota_reasons.iter().any(|r| body.contains(r)) {
            return UploadError::QuotaExceeded(message);
        }
        return UploadError::Permanent(message);
    }
    if status == StatusCode::REQUEST_TIMEOUT || status.is_server_error() {
        return UploadError::Transient(message);
    }
    UploadError::Permanent(message)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[derive(Debug, Deserialize)]
struct VideoResource {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistListResponse {
    #[serde(default)]
    items: Vec<PlaylistResource>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistResource {
    id: String,
    snippet: PlaylistSnippet,
}

#[derive(Debug, Deserialize)]
struct PlaylistSnippet {
    title: String,
}

#[async_trait]
impl VideoHost for YouTubeHost {
    async fn connect(&self) -> Result<(), AuthError> {
        let session = self.credentials.authenticate().await?;
        *self.session.write().await = Some(session);
        info!("Authenticated with YouTube");
        Ok(())
    }

    async fn reconnect(&self) -> Result<(), AuthError> {
        let current = self.session.read().await.clone();
        let session = match current {
            Some(session) => self.credentials.refresh(&session).await?,
            None => self.credentials.authenticate().await?,
        };
        *self.session.write().await = Some(session);
        info!("Re-authenticated with YouTube after suspension");
        Ok(())
    }

    async fn upload(
        &self,
        file: &Path,
        details: &VideoDetails,
    ) -> Result<RemoteVideoId, UploadError> {
        let token = self.bearer().await?;

        let metadata = json!({
            "snippet": {
                "title": details.title,
                "description": details.description,
                "tags": details.tags,
                "categoryId": details.category_id,
            },
            "status": {
                "privacyStatus": details.visibility.as_str(),
            },
        });

        let handle = tokio::fs::File::open(file)
            .await
            .map_err(|e| UploadError::Transient(format!("cannot open {:?}: {}", file, e)))?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(handle));

        let form = Form::new()
            .part(
                "metadata",
                Part::text(metadata.to_string())
                    .mime_str("application/json")
                    .map_err(|e| UploadError::Transient(e.to_string()))?,
            )
            .part(
                "file",
                Part::stream(body)
                    .mime_str("application/octet-stream")
                    .map_err(|e| UploadError::Transient(e.to_string()))?,
            );

        let url = format!(
            "{}/upload/youtube/v3/videos?uploadType=multipart&part=snippet,status",
            UPLOAD_BASE
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Transient(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::read_failure(response).await);
        }

        let video: VideoResource = response
            .json()
            .await
            .map_err(|e| UploadError::Transient(format!("malformed upload response: {}", e)))?;
        Ok(RemoteVideoId(video.id))
    }

    async fn list_collections(&self) -> Result<Vec<(CollectionId, String)>, UploadError> {
        let token = self.bearer().await?;
        let url = format!("{}/youtube/v3/playlists", API_BASE);

        let mut collections = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(&url)
                .bearer_auth(&token)
                .query(&[("part", "snippet"), ("mine", "true"), ("maxResults", "50")]);
            if let Some(ref t) = page_token {
                request = request.query(&[("pageToken", t.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| UploadError::Transient(e.to_string()))?;
            if !response.status().is_success() {
                return Err(Self::read_failure(response).await);
            }

            let page: PlaylistListResponse = response
                .json()
                .await
                .map_err(|e| UploadError::Transient(format!("malformed playlist page: {}", e)))?;
            for item in page.items {
                collections.push((CollectionId(item.id), item.snippet.title));
            }

            match page.next_page_token {
                Some(t) => page_token = Some(t),
                None => break,
            }
        }

        Ok(collections)
    }

    async fn create_collection(
        &self,
        name: &str,
        visibility: Visibility,
    ) -> Result<CollectionId, UploadError> {
        let token = self.bearer().await?;
        let url = format!("{}/youtube/v3/playlists?part=snippet,status", API_BASE);

        let body = json!({
            "snippet": { "title": name },
            "status": { "privacyStatus": visibility.as_str() },
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| UploadError::Transient(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::read_failure(response).await);
        }

        let playlist: VideoResource = response
            .json()
            .await
            .map_err(|e| UploadError::Transient(format!("malformed playlist response: {}", e)))?;
        Ok(CollectionId(playlist.id))
    }

    async fn add_to_collection(
        &self,
        collection: &CollectionId,
        video: &RemoteVideoId,
    ) -> Result<(), UploadError> {
        let token = self.bearer().await?;
        let url = format!("{}/youtube/v3/playlistItems?part=snippet", API_BASE);

        let body = json!({
            "snippet": {
                "playlistId": collection.0,
                "resourceId": {
                    "kind": "youtube#video",
                    "videoId": video.0,
                },
            },
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| UploadError::Transient(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::read_failure(response).await);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_quota_403() {
        let body = r#"{"error":{"errors":[{"reason":"quotaExceeded"}]}}"#;
        let err = classify_failure(StatusCode::FORBIDDEN, body);
        assert!(matches!(err, UploadError::QuotaExceeded(_)));
    }

    #[test]
    fn test_classify_too_many_requests() {
        let err = classify_failure(StatusCode::TOO_MANY_REQUESTS, "");
        assert!(matches!(err, UploadError::QuotaExceeded(_)));
    }

    #[test]
    fn test_classify_plain_403_is_permanent() {
        let body = r#"{"error":{"errors":[{"reason":"forbidden"}]}}"#;
        let err = classify_failure(StatusCode::FORBIDDEN, body);
        assert!(matches!(err, UploadError::Permanent(_)));
    }

    #[test]
    fn test_classify_server_errors_transient() {
        let err = classify_failure(StatusCode::INTERNAL_SERVER_ERROR, "");
        assert!(matches!(err, UploadError::Transient(_)));
        let err = classify_failure(StatusCode::BAD_GATEWAY, "");
        assert!(matches!(err, UploadError::Transient(_)));
        let err = classify_failure(StatusCode::REQUEST_TIMEOUT, "");
        assert!(matches!(err, UploadError::Transient(_)));
    }

    #[test]
    fn test_classify_bad_request_permanent() {
        let err = classify_failure(StatusCode::BAD_REQUEST, "invalid title");
        assert!(matches!(err, UploadError::Permanent(_)));
    }

    #[test]
    fn test_token_file_accepts_google_layout() {
        let json = r#"{
            "token": "ya29.abc",
            "refresh_token": "1//refresh",
            "expiry": "2030-01-01T00:00:00Z",
            "scopes": ["https://www.googleapis.com/auth/youtube.upload"]
        }"#;
        let parsed: TokenFile = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.token.as_deref(), Some("ya29.abc"));
        assert_eq!(parsed.refresh_token, "1//refresh");
        assert!(parsed.expiry.is_some());
    }

    #[test]
    fn test_client_secret_parsing() {
        let json = r#"{
            "installed": {
                "client_id": "id.apps.googleusercontent.com",
                "client_secret": "secret",
                "token_uri": "https://oauth2.googleapis.com/token",
                "redirect_uris": ["http://localhost"]
            }
        }"#;
        let parsed: ClientSecretFile = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.installed.client_secret, "secret");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("short", 500), "short");
    }
}
