//! MicroCMS page server
//!
//! Run with: microcms-server --bind 127.0.0.1:7071

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use microcms::cms::CmsGateway;
use microcms::config::CmsConfig;
use microcms::error::Result;
use microcms::logging;
use microcms::server::{self, AppState};
use microcms::store::S3Store;
use microcms::sync::shutdown_signal;

#[derive(Parser, Debug)]
#[command(name = "microcms-server")]
#[command(about = "Serve MicroCMS pages from the content store")]
struct Args {
    /// TOML config file
    #[arg(short, long, env = "MICROCMS_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address
    #[arg(long, env = "MICROCMS_BIND")]
    bind: Option<String>,

    /// Remote container (bucket) name
    #[arg(long, env = "MICROCMS_CONTAINER")]
    container: Option<String>,

    /// Page served at `/`
    #[arg(long, env = "MICROCMS_DEFAULT_HOME")]
    default_home: Option<String>,

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

        if let Some(bind) = self.bind {
            config.site.bind = bind;
        }
        if let Some(container) = self.container {
            config.site.container = container;
        }
        if let Some(default_home) = self.default_home {
            config.site.default_home = default_home;
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
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.log_json);

    let config = args.into_config()?;
    let store = S3Store::connect(&config.store).await?;

    let bind = config.site.bind.clone();
    let gateway = CmsGateway::new(Arc::new(store), config.site);
    let router = server::router(AppState::new(gateway));

    server::serve(&bind, router, async {
        let reason = shutdown_signal().await;
        tracing::info!(reason = ?reason, "Shutting down page server");
    })
    .await
}
