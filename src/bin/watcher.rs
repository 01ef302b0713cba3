//! MicroCMS folder watcher
//!
//! Run with: microcms-watcher -w ~/Sites/Blog

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use microcms::config::CmsConfig;
use microcms::error::Result;
use microcms::logging;
use microcms::store::S3Store;
use microcms::sync::{shutdown_signal, WatchService};

/// Exit code for bad configuration, before anything is started
const CONFIG_ERROR_EXIT: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "microcms-watcher")]
#[command(about = "Mirror a local site folder into the MicroCMS content store")]
struct Args {
    /// TOML config file
    #[arg(short, long, env = "MICROCMS_CONFIG")]
    config: Option<PathBuf>,

    /// Local folder to watch
    #[arg(short, long, env = "MICROCMS_WATCH_ROOT")]
    watch: Option<PathBuf>,

    /// Remote container (bucket) name
    #[arg(long, env = "MICROCMS_CONTAINER")]
    container: Option<String>,

    /// Local pages folder, stored at the container root
    #[arg(long, env = "MICROCMS_PAGES_DIR")]
    pages_dir: Option<String>,

    /// Quiet interval for repeat writes in ms
    #[arg(long, env = "MICROCMS_DEBOUNCE_MS")]
    debounce_ms: Option<u64>,

    /// Custom S3 endpoint (R2, MinIO)
    #[arg(long, env = "MICROCMS_STORE_ENDPOINT")]
    endpoint: Option<String>,

    /// Store region
    #[arg(long, env = "MICROCMS_STORE_REGION")]
    region: Option<String>,

    /// Log as JSON lines
    #[arg(long, env = "MICROCMS_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn into_config(self) -> Result<CmsConfig> {
        let mut config = CmsConfig::load(self.config.as_deref())?;

        if let Some(watch) = self.watch {
            config.watcher.local_root = Some(watch);
        }
        if let Some(container) = self.container {
            config.watcher.container = container;
        }
        if let Some(pages_dir) = self.pages_dir {
            config.watcher.pages_dir = pages_dir;
        }
        if let Some(debounce_ms) = self.debounce_ms {
            config.watcher.debounce_ms = debounce_ms;
        }
        if self.endpoint.is_some() {
            config.store.endpoint = self.endpoint;
        }
        if self.region.is_some() {
            config.store.region = self.region;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    logging::init(args.log_json);

    let config = match args.into_config() {
        Ok(config) => config,
        Err(error) => {
            tracing::error!(error = %error, "Invalid configuration");
            std::process::exit(CONFIG_ERROR_EXIT);
        }
    };

    let store = match S3Store::connect(&config.store).await {
        Ok(store) => store,
        Err(error) => {
            tracing::error!(error = %error, "Could not configure the content store");
            std::process::exit(CONFIG_ERROR_EXIT);
        }
    };

    let running = match WatchService::new(config.watcher, Arc::new(store)).start() {
        Ok(running) => running,
        Err(error) => {
            tracing::error!(error = %error, "Could not start watching");
            std::process::exit(CONFIG_ERROR_EXIT);
        }
    };

    let status = running.wait(shutdown_signal()).await;
    std::process::exit(status.code());
}
