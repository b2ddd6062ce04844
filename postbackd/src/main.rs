mod config;
mod telemetry;

use clap::{Args, Parser, Subcommand};
use config::{Config, ConfigError};
use postback::payload::FileBody;
use postback::store::{StoreError, get_store};
use postback::{Postback, PostbackError, PostbackServiceError};
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about = "Postback ingestion service")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve the postback and mapping endpoints
    Postback(ServeArgs),
    /// Stream a CSV file of source mappings into the store
    LoadMappings(LoadMappingsArgs),
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long)]
    config_file_path: PathBuf,
}

#[derive(Args)]
struct LoadMappingsArgs {
    #[arg(long)]
    config_file_path: PathBuf,
    /// CSV file with a header line naming mapping columns
    #[arg(long)]
    file: PathBuf,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Metrics(#[from] telemetry::MetricsError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Service(#[from] PostbackServiceError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("could not load mappings: {0}")]
    Load(#[from] PostbackError),
}

fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    let config_path = match &cli.command {
        CliCommand::Postback(args) => &args.config_file_path,
        CliCommand::LoadMappings(args) => &args.config_file_path,
    };
    let config = Config::from_file(config_path)?;

    let _sentry = telemetry::init_logging(config.common.logging.as_ref());
    if let Some(metrics) = &config.common.metrics {
        telemetry::init_metrics(metrics)?;
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match cli.command {
        CliCommand::Postback(_) => {
            tracing::info!("starting postback service");
            rt.block_on(postback::run(config.postback))?;
        }
        CliCommand::LoadMappings(args) => {
            rt.block_on(load_mappings(config, args.file))?;
        }
    }

    Ok(())
}

async fn load_mappings(config: Config, path: PathBuf) -> Result<(), CliError> {
    let store = get_store(config.postback.store.r#type).await?;
    let file = tokio::fs::File::open(&path).await?;

    let rows = Postback::new(store)
        .load_mappings(FileBody::new(file))
        .await?;
    tracing::info!(rows, path = %path.display(), "mappings loaded");
    Ok(())
}
