//! parley: terminal client for the assistant session protocol.

mod cli;
mod repl;

use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use parley_common::ParleyError;
use parley_config::{toml_loader, validation, ParleyConfig};
use parley_session::{EnvCredentialProvider, SessionOrchestrator, SocketIoConnector};

use crate::cli::Args;
use crate::repl::Repl;

/// Resolve the config: explicit file or the default location, then
/// environment and command-line overrides, then validation.
fn load_config(args: &Args) -> Result<ParleyConfig, ParleyError> {
    let mut config = match &args.config {
        Some(path) => toml_loader::load_from_path(path)?,
        None => toml_loader::load_default()?,
    };
    parley_config::apply_env_overrides(&mut config);

    if let Some(endpoint) = &args.endpoint {
        config.connection.endpoint = endpoint.clone();
    }
    if let Some(budget) = args.budget {
        config.context.budget = budget;
    }

    validation::validate(&config)?;
    Ok(config)
}

fn init_logging(args: &Args, config: &ParleyConfig) {
    let filter = match &args.log_level {
        Some(directive) => EnvFilter::try_new(directive)
            .unwrap_or_else(|_| EnvFilter::new(config.logging.level.directive())),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.logging.level.directive())),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> Result<(), ParleyError> {
    let config = load_config(&args)?;
    init_logging(&args, &config);

    tracing::info!(
        endpoint = %config.connection.endpoint,
        budget = config.context.budget,
        "Starting parley"
    );

    let session = SessionOrchestrator::from_config(
        Arc::new(SocketIoConnector::new()),
        Arc::new(EnvCredentialProvider::default()),
        &config,
    );
    Repl::new(session, config.context.include_open_files).run().await
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("parley: {e}");
            ExitCode::FAILURE
        }
    }
}
