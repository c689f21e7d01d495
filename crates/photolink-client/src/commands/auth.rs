//! Authentication commands.

use std::path::{Path, PathBuf};

use photolink_providers::google::{AuthStrategy, OAuthCredentials};
use tracing::{info, warn};

use crate::app;
use crate::cli::{AuthAction, AuthArgs};
use crate::config::{self, ClientConfig, GoogleSettings};
use crate::error::{ClientError, ClientResult};

/// Where the credentials were resolved from.
#[derive(Debug, PartialEq)]
enum CredentialSource {
    /// `--client-id`/`--client-secret` or `--credentials-file`
    Cli,
    /// `config.toml`, already persisted
    Config,
}

/// `photolink auth [callback|logout]`.
pub async fn run(args: AuthArgs, config: &ClientConfig, config_path: &Path) -> ClientResult<()> {
    match args.action {
        Some(AuthAction::Logout) => logout(config),
        Some(AuthAction::Callback { response }) => callback(&response, config).await,
        None => {
            sign_in(
                args.client_id,
                args.client_secret,
                args.credentials_file,
                args.force,
                config,
                config_path,
            )
            .await
        }
    }
}

/// Runs the configured authorization flow.
///
/// Credentials given on the command line are written to `config.toml` once
/// they have been used successfully.
async fn sign_in(
    client_id: Option<String>,
    client_secret: Option<String>,
    credentials_file: Option<PathBuf>,
    force: bool,
    config: &ClientConfig,
    config_path: &Path,
) -> ClientResult<()> {
    let (credentials, source) =
        resolve_credentials(client_id, client_secret, credentials_file, &config.google)?;
    let google = config.google.provider_config_with(credentials.clone())?;
    let proxy = matches!(google.strategy, AuthStrategy::Proxy { .. });

    let client = app::photos_client(google)?;
    let tokens = client.auth().tokens();

    if force {
        tokens.clear()?;
    } else if tokens.has_valid_access_token() {
        persist(&credentials, &source, config_path);
        println!("Already signed in to Google Photos.");
        println!("Use --force to sign in again.");
        return Ok(());
    }

    println!("Starting Google Photos authorization...");
    println!();

    if client.auth().authenticate().await {
        persist(&credentials, &source, config_path);
        info!("Google authentication successful");
        println!("Signed in. Your tokens have been saved.");
        return Ok(());
    }

    if proxy {
        persist(&credentials, &source, config_path);
        println!("Finish authorizing in your browser. The relay page will hand back a code;");
        println!("complete the sign-in with:");
        println!();
        println!("  photolink auth callback <code>");
        return Ok(());
    }

    Err(ClientError::AuthRequired(
        "Google did not grant access; run `photolink auth -v` for details".to_string(),
    ))
}

/// Finishes a proxy sign-in with what the relay page handed back.
async fn callback(response: &str, config: &ClientConfig) -> ClientResult<()> {
    let client = app::connect(config)?;
    if client.auth().complete(response).await {
        println!("Signed in. Your tokens have been saved.");
        Ok(())
    } else {
        Err(ClientError::AuthRequired(
            "the authorization code was rejected; start again with `photolink auth`".to_string(),
        ))
    }
}

fn logout(config: &ClientConfig) -> ClientResult<()> {
    let client = app::connect(config)?;
    client.auth().tokens().clear()?;
    println!("Signed out.");
    Ok(())
}

/// Saves credentials given on the command line to `config.toml`.
fn persist(credentials: &OAuthCredentials, source: &CredentialSource, config_path: &Path) {
    if *source == CredentialSource::Config {
        return;
    }
    match config::save_credentials(
        config_path,
        &credentials.client_id,
        &credentials.client_secret,
    ) {
        Ok(()) => println!("Credentials saved to {}", config_path.display()),
        Err(e) => warn!("could not save credentials: {}", e),
    }
}

/// Resolves Google credentials from multiple sources.
///
/// Priority (highest to lowest):
/// 1. CLI `--client-id` + `--client-secret`
/// 2. CLI `--credentials-file` (Google Cloud Console JSON)
/// 3. `config.toml` `[google]` section, with secret references resolved
fn resolve_credentials(
    cli_client_id: Option<String>,
    cli_client_secret: Option<String>,
    cli_credentials_file: Option<PathBuf>,
    settings: &GoogleSettings,
) -> ClientResult<(OAuthCredentials, CredentialSource)> {
    match (cli_client_id, cli_client_secret) {
        (Some(id), Some(secret)) => {
            return Ok((OAuthCredentials::new(id, secret), CredentialSource::Cli));
        }
        // A token proxy holds the secret.
        (Some(id), None) if settings.exchange_url.is_some() => {
            return Ok((OAuthCredentials::new(id, ""), CredentialSource::Cli));
        }
        (Some(_), None) | (None, Some(_)) => {
            return Err(ClientError::Config(
                "--client-id and --client-secret must be given together".to_string(),
            ));
        }
        (None, None) => {}
    }

    if let Some(path) = cli_credentials_file {
        let credentials = OAuthCredentials::from_file(&path).map_err(|e| {
            ClientError::Config(format!(
                "failed to load credentials from {}: {}",
                path.display(),
                e
            ))
        })?;
        return Ok((credentials, CredentialSource::Cli));
    }

    Ok((settings.resolve_credentials()?, CredentialSource::Config))
}
