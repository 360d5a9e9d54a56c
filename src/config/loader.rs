use std::path::Path;

use config::{Config, File, FileFormat};
use eyre::{Context, Result};

use crate::config::{models::ClientConfig, validation::ClientConfigValidator};

/// Load and validate a client configuration file using the config crate.
/// Supports YAML, JSON, TOML and INI, chosen by file extension.
pub async fn load_config(config_path: &str) -> Result<ClientConfig> {
    let config = load_config_sync(config_path)?;
    ClientConfigValidator::validate(&config)
        .with_context(|| format!("Invalid configuration in {config_path}"))?;
    Ok(config)
}

/// Load configuration synchronously, without validation
pub fn load_config_sync(config_path: &str) -> Result<ClientConfig> {
    let config_path = Path::new(config_path);

    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("ini") => FileFormat::Ini,
        _ => FileFormat::Toml,
    };

    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            format,
        ))
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    let client_config: ClientConfig = settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })?;

    tracing::debug!(
        path = %config_path.display(),
        roots = client_config.roots.len(),
        "Loaded client config"
    );
    Ok(client_config)
}

/// Load configuration without validation (used for the validate command)
pub async fn load_config_unchecked(config_path: &str) -> Result<ClientConfig> {
    load_config_sync(config_path)
}
