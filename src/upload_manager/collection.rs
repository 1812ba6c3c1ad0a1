//! Find-or-create resolution of the remote named collection.
//!
//! Resolved exactly once per run, before the worker loop starts; the handle
//! is then shared read-only by every upload attempt.

use std::sync::Arc;

use tracing::info;

use crate::remote::{CollectionId, UploadError, VideoHost, Visibility};

pub struct CollectionResolver {
    host: Arc<dyn VideoHost>,
}

impl CollectionResolver {
    pub fn new(host: Arc<dyn VideoHost>) -> Self {
        Self { host }
    }

    /// Return the first existing collection whose display name exactly
    /// matches `name`, creating one with the given visibility if none does.
    pub async fn resolve(
        &self,
        name: &str,
        visibility: Visibility,
    ) -> Result<CollectionId, UploadError> {
        let existing = self.host.list_collections().await?;
        if let Some((id, _)) = existing.iter().find(|(_, title)| title == name) {
            info!("Using existing collection '{}' ({})", name, id.0);
            return Ok(id.clone());
        }

        let id = self.host.create_collection(name, visibility).await?;
        info!("Created collection '{}' ({})", name, id.0);
        Ok(id)
    }
}
