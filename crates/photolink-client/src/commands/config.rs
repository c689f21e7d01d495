//! Configuration commands.

use std::path::Path;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Dump the current configuration to stdout.
pub fn dump(config: &ClientConfig, path: &Path) -> ClientResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| ClientError::Config(format!("failed to serialize config: {}", e)))?;
    println!("# config.toml ({})", path.display());
    println!("{}", toml_str);

    Ok(())
}

/// Validate the configuration.
pub fn validate(config: &ClientConfig) -> ClientResult<()> {
    check(config)?;

    if config.google.client_id.is_some() {
        config.google.to_provider_config().map_err(|e| {
            ClientError::Config(format!("invalid Google settings: {}", e))
        })?;
        println!("Google credentials are valid.");
    }

    println!("Configuration is valid.");
    Ok(())
}

/// Checks that need no secrets resolved.
fn check(config: &ClientConfig) -> ClientResult<()> {
    if config.thumbnails.width == 0 || config.thumbnails.height == 0 {
        return Err(ClientError::Config(
            "thumbnail width and height must be greater than zero".to_string(),
        ));
    }
    if config.thumbnails.filename_format.trim().is_empty() {
        return Err(ClientError::Config(
            "thumbnails.filename_format must not be empty".to_string(),
        ));
    }
    if config.dates.format.trim().is_empty() {
        return Err(ClientError::Config("dates.format must not be empty".to_string()));
    }
    if let Some(vault) = &config.vault
        && !vault.is_dir()
    {
        return Err(ClientError::Config(format!(
            "vault {} is not a directory",
            vault.display()
        )));
    }
    Ok(())
}

/// Show the configuration file path.
pub fn path(path: &Path) -> ClientResult<()> {
    println!("config: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(check(&ClientConfig::default()).is_ok());
    }

    #[test]
    fn zero_sized_thumbnails_are_rejected() {
        let mut config = ClientConfig::default();
        config.thumbnails.height = 0;
        assert!(matches!(check(&config), Err(ClientError::Config(_))));
    }

    #[test]
    fn missing_vault_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig {
            vault: Some(dir.path().join("nope")),
            ..Default::default()
        };
        assert!(check(&config).is_err());

        let config = ClientConfig {
            vault: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        assert!(check(&config).is_ok());
    }

    #[test]
    fn incomplete_google_settings_fail_validation() {
        let mut config = ClientConfig::default();
        config.google.client_id = Some("id.apps.googleusercontent.com".to_string());
        assert!(validate(&config).is_err());
    }
}
