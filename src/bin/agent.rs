use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};
use vnstat_agent::{config::AgentConfig, error::AgentError, lifecycle};

#[derive(Debug, Clone, Parser)]
#[command(version, about)]
struct Args {
    /// Dotenv file to load before reading the environment (default: ./.env if present)
    #[arg(short, long)]
    env_file: Option<PathBuf>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("vnstat_agent", LevelFilter::DEBUG),
        ("rumqttc", LevelFilter::WARN),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

fn load_env_file(args: &Args) {
    match &args.env_file {
        Some(path) => {
            if let Err(e) = dotenv::from_path(path) {
                warn!("failed to load {}: {e}", path.display());
            }
        }
        None => {
            dotenv::dotenv().ok();
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init();
    trace!("started with args: {args:?}");

    load_env_file(&args);

    let config = match AgentConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            let err = AgentError::from(e);
            error!("{err}");
            return ExitCode::from(&err);
        }
    };

    match lifecycle::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::from(&err)
        }
    }
}
