mod file_config;

pub use file_config::{FileConfig, UploaderConfig};

use crate::remote::Visibility;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub watch_root: Option<PathBuf>,
    pub ledger_file: Option<PathBuf>,
    pub client_secret_file: Option<PathBuf>,
    pub token_file: Option<PathBuf>,
    pub collection_name: Option<String>,
    pub stabilization_wait_secs: u64,
    pub quota_suspension_secs: u64,
    pub visibility: Visibility,
    pub category_id: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub watch_root: PathBuf,
    pub ledger_path: PathBuf,
    pub client_secret_path: PathBuf,
    pub token_path: PathBuf,
    /// Display name of the remote collection uploads are attached to.
    pub collection_name: String,

    // Upload behavior (with defaults)
    pub uploader: UploaderSettings,
}

#[derive(Debug, Clone)]
pub struct UploaderSettings {
    /// Fixed delay before reading a newly discovered file, to let it finish
    /// being copied.
    pub stabilization_wait_secs: u64,
    /// Flat pause after the remote API reports quota exhaustion.
    pub quota_suspension_secs: u64,
    pub visibility: Visibility,
    pub category_id: String,
    pub description: String,
}

impl Default for UploaderSettings {
    fn default() -> Self {
        Self {
            stabilization_wait_secs: 60,
            quota_suspension_secs: 21600, // 6 hours
            visibility: Visibility::Private,
            category_id: "22".to_string(), // People & Blogs
            description: String::new(),
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let watch_root = file
            .watch_root
            .map(PathBuf::from)
            .or_else(|| cli.watch_root.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("watch_root must be specified via the CLI or in the config file")
            })?;

        if !watch_root.exists() {
            bail!("Watch root does not exist: {:?}", watch_root);
        }
        if !watch_root.is_dir() {
            bail!("Watch root is not a directory: {:?}", watch_root);
        }

        let ledger_path = file
            .ledger_file
            .map(PathBuf::from)
            .or_else(|| cli.ledger_file.clone())
            .unwrap_or_else(|| PathBuf::from("uploaded_videos.json"));

        let client_secret_path = file
            .client_secret_file
            .map(PathBuf::from)
            .or_else(|| cli.client_secret_file.clone())
            .unwrap_or_else(|| PathBuf::from("client_secret.json"));

        let token_path = file
            .token_file
            .map(PathBuf::from)
            .or_else(|| cli.token_file.clone())
            .unwrap_or_else(|| PathBuf::from("token.json"));

        // The collection defaults to the watch-root directory name.
        let collection_name = match file
            .collection_name
            .or_else(|| cli.collection_name.clone())
        {
            Some(name) => name,
            None => watch_root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "Cannot derive a collection name from watch root {:?}; \
                         specify collection_name explicitly",
                        watch_root
                    )
                })?,
        };

        // Uploader settings - merge file config with CLI values
        let up_file = file.uploader.unwrap_or_default();
        let uploader = UploaderSettings {
            stabilization_wait_secs: up_file
                .stabilization_wait_secs
                .unwrap_or(cli.stabilization_wait_secs),
            quota_suspension_secs: up_file
                .quota_suspension_secs
                .unwrap_or(cli.quota_suspension_secs),
            visibility: up_file
                .visibility
                .and_then(|s| parse_visibility(&s))
                .unwrap_or(cli.visibility),
            category_id: up_file.category_id.unwrap_or_else(|| cli.category_id.clone()),
            description: up_file
                .description
                .or_else(|| cli.description.clone())
                .unwrap_or_default(),
        };

        Ok(Self {
            watch_root,
            ledger_path,
            client_secret_path,
            token_path,
            collection_name,
            uploader,
        })
    }
}

/// Parses a visibility string into Visibility.
/// Uses clap's ValueEnum trait for parsing.
fn parse_visibility(s: &str) -> Option<Visibility> {
    Visibility::from_str(s, true).ok()
}
