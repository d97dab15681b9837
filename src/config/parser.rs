use crate::config::types::{Config, SourceConfig};
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// The API token is resolved from `api-token-file` or `api-token-env`
/// before validation, so a config that loads successfully is ready to use.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses configuration text, resolves credentials and validates the result
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let mut config: Config = toml::from_str(content)?;

    config.source.api_token = resolve_api_token(&config.source)?;

    validate(&config)?;

    Ok(config)
}

/// Reads the API token from the configured file or environment variable
fn resolve_api_token(source: &SourceConfig) -> Result<String, ConfigError> {
    if let Some(token_file) = &source.api_token_file {
        let token = std::fs::read_to_string(token_file).map_err(|e| {
            ConfigError::MissingCredential(format!(
                "cannot read api-token-file '{}': {}",
                token_file, e
            ))
        })?;
        let token = token.trim().to_string();
        if token.is_empty() {
            return Err(ConfigError::MissingCredential(format!(
                "api-token-file '{}' is empty",
                token_file
            )));
        }
        return Ok(token);
    }

    if let Some(var) = &source.api_token_env {
        let token = std::env::var(var).unwrap_or_default().trim().to_string();
        if token.is_empty() {
            return Err(ConfigError::MissingCredential(format!(
                "environment variable '{}' is unset or empty",
                var
            )));
        }
        return Ok(token);
    }

    Err(ConfigError::MissingCredential(
        "one of api-token-file or api-token-env must be set".to_string(),
    ))
}

/// Computes a SHA-256 hash of the configuration file content
///
/// This is recorded with every run so that run history shows which
/// configuration produced it.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}
