//! photolink CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use photolink_core::{TracingConfig, init_tracing};

use photolink_client::cli::{Cli, Command, ConfigAction};
use photolink_client::commands;
use photolink_client::config::ClientConfig;
use photolink_client::error::{ClientError, ClientResult};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(TracingConfig::cli(cli.debug)) {
        eprintln!("warning: {}", e);
    }

    match run(cli).await {
        Ok(()) | Err(ClientError::Cancelled) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            if e.is_auth_failure() {
                eprintln!("Run `photolink auth` to sign in again.");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let config_path = cli.config.clone().unwrap_or_else(ClientConfig::default_path);
    let mut config = if cli.config.is_some() {
        ClientConfig::load_from(&config_path)?
    } else {
        ClientConfig::load()?
    };
    if let Some(vault) = cli.vault {
        config.vault = Some(vault);
    }

    match cli.command {
        Command::Auth(args) => commands::auth::run(args, &config, &config_path).await,
        Command::Browse { target, all, query } => {
            commands::browse::browse(&config, target, all, query).await
        }
        Command::Pick { target } => commands::browse::pick(&config, target).await,
        Command::Albums => commands::albums::list(&config).await,
        Command::InsertAlbum { target } => commands::albums::insert(&config, target).await,
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config, &config_path),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(&config_path),
        },
    }
}
