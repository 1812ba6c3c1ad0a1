use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tubesync::config;
use tubesync::remote::{FileCredentialProvider, Visibility, YouTubeHost};
use tubesync::supervisor::Supervisor;

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

fn parse_dir(s: &str) -> Result<PathBuf, String> {
    let path = parse_path(s)?;
    if !path.exists() {
        return Err(format!("Directory does not exist: {}", s));
    }
    if !path.is_dir() {
        return Err(format!("Path is not a directory: {}", s));
    }
    Ok(path)
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory to watch for new media files.
    /// Can also be specified in config file.
    #[clap(value_parser = parse_dir)]
    pub watch_root: Option<PathBuf>,

    /// Path to the JSON file recording already-uploaded paths.
    #[clap(long, value_parser = parse_path)]
    pub ledger_file: Option<PathBuf>,

    /// Path to the OAuth client secret JSON file.
    #[clap(long, value_parser = parse_path)]
    pub client_secret_file: Option<PathBuf>,

    /// Path to the stored OAuth token JSON file.
    #[clap(long, value_parser = parse_path)]
    pub token_file: Option<PathBuf>,

    /// Name of the remote playlist uploads are added to.
    /// Defaults to the watch root's directory name.
    #[clap(long)]
    pub collection_name: Option<String>,

    /// Seconds to wait after discovering a file before uploading it.
    #[clap(long, default_value_t = 60)]
    pub stabilization_wait_secs: u64,

    /// Seconds to pause uploads after the remote API reports quota exhaustion.
    #[clap(long, default_value_t = 21600)]
    pub quota_suspension_secs: u64,

    /// Visibility applied to uploaded videos and created playlists.
    #[clap(long, value_enum, default_value = "private")]
    pub visibility: Visibility,

    /// Remote category id applied to uploads.
    #[clap(long, default_value = "22")]
    pub category_id: String,

    /// Description applied to uploaded videos.
    #[clap(long)]
    pub description: Option<String>,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            watch_root: args.watch_root.clone(),
            ledger_file: args.ledger_file.clone(),
            client_secret_file: args.client_secret_file.clone(),
            token_file: args.token_file.clone(),
            collection_name: args.collection_name.clone(),
            stabilization_wait_secs: args.stabilization_wait_secs,
            quota_suspension_secs: args.quota_suspension_secs,
            visibility: args.visibility,
            category_id: args.category_id.clone(),
            description: args.description.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  watch_root: {:?}", app_config.watch_root);
    info!("  ledger: {:?}", app_config.ledger_path);
    info!("  collection: {}", app_config.collection_name);

    let credentials = Arc::new(FileCredentialProvider::new(
        app_config.client_secret_path.clone(),
        app_config.token_path.clone(),
    ));
    let host = Arc::new(YouTubeHost::new(credentials)?);

    let shutdown_token = CancellationToken::new();
    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, initiating graceful shutdown");
            signal_token.cancel();
        }
    });

    Supervisor::new(app_config, host).run(shutdown_token).await
}
