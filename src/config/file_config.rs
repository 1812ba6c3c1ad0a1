use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub watch_root: Option<String>,
    pub ledger_file: Option<String>,
    pub client_secret_file: Option<String>,
    pub token_file: Option<String>,
    pub collection_name: Option<String>,

    // Feature configs
    pub uploader: Option<UploaderConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct UploaderConfig {
    pub stabilization_wait_secs: Option<u64>,
    pub quota_suspension_secs: Option<u64>,
    /// Visibility applied to uploads: "public", "unlisted", "private"
    pub visibility: Option<String>,
    pub category_id: Option<String>,
    pub description: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
