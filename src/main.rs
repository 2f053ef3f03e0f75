//! HTTP service entry point for the OpenSearch CSV exporter.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use opensearch_csv_export::{Config, OpenSearchClient, Result, api};
use tracing::{debug, error, info};

/// Stream OpenSearch query results as gzip-compressed CSV over HTTP
#[derive(Debug, Parser)]
#[command(name = "opensearch-csv-export", version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "EXPORT_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on (overrides api.bind_address)
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Search service node URL; repeat for several nodes (overrides opensearch.addresses)
    #[arg(long = "opensearch-address", value_name = "URL")]
    opensearch_addresses: Vec<String>,

    /// Index name or pattern to search; repeat for several (overrides opensearch.indices)
    #[arg(long = "index", value_name = "INDEX")]
    indices: Vec<String>,

    /// Log filter used when RUST_LOG is unset (overrides log.level)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(bind) = self.bind {
            config.api.bind_address = bind;
        }
        if !self.opensearch_addresses.is_empty() {
            config.opensearch.addresses = self.opensearch_addresses;
        }
        if !self.indices.is_empty() {
            config.opensearch.indices = self.indices;
        }
        if let Some(level) = self.log_level {
            config.log.level = level;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let config = match load_config(args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("opensearch-csv-export: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "exporter stopped with an error");
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    args.apply(&mut config);
    config.validate()?;
    Ok(config)
}

/// RUST_LOG wins over the configured level
fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.level));

    if config.log.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run(config: Config) -> Result<()> {
    debug!(?config, "configuration loaded");
    info!(
        nodes = config.opensearch.addresses.len(),
        indices = ?config.opensearch.indices,
        page_size = config.export.page_size,
        "Exporter starting"
    );

    let client = OpenSearchClient::new(&config.opensearch)?;
    api::start_api_server(client, Arc::new(config)).await
}
