use crate::config::types::{
    CheckpointConfig, Config, IndexConfig, IndexKind, ObjectStorageConfig, SourceConfig,
    SyncConfig,
};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_source_config(&config.source)?;
    validate_storage_config(&config.storage)?;
    validate_index_config(&config.index)?;
    validate_checkpoint_config(&config.checkpoint)?;
    validate_sync_config(&config.sync)?;
    Ok(())
}

/// Validates the page source configuration
fn validate_source_config(config: &SourceConfig) -> Result<(), ConfigError> {
    validate_http_url("base-url", &config.base_url)?;

    if config.collections.is_empty() {
        return Err(ConfigError::Validation(
            "at least one collection must be configured".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for key in &config.collections {
        validate_collection_key(key)?;
        if !seen.insert(key.as_str()) {
            return Err(ConfigError::Validation(format!(
                "collection '{}' is listed more than once",
                key
            )));
        }
    }

    if config.page_size < 1 || config.page_size > 500 {
        return Err(ConfigError::Validation(format!(
            "page-size must be between 1 and 500, got {}",
            config.page_size
        )));
    }

    if config.request_timeout < 1 {
        return Err(ConfigError::Validation(
            "request-timeout must be >= 1 second".to_string(),
        ));
    }

    if config.api_token.is_empty() {
        return Err(ConfigError::MissingCredential(
            "api token is empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates the object storage configuration
fn validate_storage_config(config: &ObjectStorageConfig) -> Result<(), ConfigError> {
    if config.target().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "attachments-uri must look like '<scheme>://<bucket>/<prefix>', got '{}'",
            config.attachments_uri
        )));
    }

    if config.root.is_empty() {
        return Err(ConfigError::Validation("storage root cannot be empty".to_string()));
    }

    Ok(())
}

/// Validates the document store configuration
fn validate_index_config(config: &IndexConfig) -> Result<(), ConfigError> {
    if config.source_prefix.is_empty() || config.source_prefix.chars().any(char::is_whitespace) {
        return Err(ConfigError::Validation(format!(
            "source-prefix must be non-empty and contain no whitespace, got '{}'",
            config.source_prefix
        )));
    }

    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if config.kind == IndexKind::Http {
        match &config.endpoint {
            Some(endpoint) => validate_http_url("endpoint", endpoint)?,
            None => {
                return Err(ConfigError::Validation(
                    "index kind 'http' requires an endpoint".to_string(),
                ))
            }
        }
    }

    Ok(())
}

/// Validates checkpoint store settings
fn validate_checkpoint_config(config: &CheckpointConfig) -> Result<(), ConfigError> {
    if config.parameter_name.is_empty() {
        return Err(ConfigError::Validation(
            "checkpoint parameter-name cannot be empty".to_string(),
        ));
    }

    if config.max_attempts < 1 || config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "checkpoint max-attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }

    Ok(())
}

/// Validates sync behavior settings
fn validate_sync_config(config: &SyncConfig) -> Result<(), ConfigError> {
    if config.max_redirects < 1 || config.max_redirects > 10 {
        return Err(ConfigError::Validation(format!(
            "max-redirects must be between 1 and 10, got {}",
            config.max_redirects
        )));
    }

    if config.max_attachment_bytes == 0 {
        return Err(ConfigError::Validation(
            "max-attachment-bytes must be greater than 0".to_string(),
        ));
    }

    for host in &config.trusted_redirect_hosts {
        if host.is_empty() || host.contains('/') || host.contains(':') {
            return Err(ConfigError::Validation(format!(
                "trusted redirect host '{}' must be a bare host name",
                host
            )));
        }
    }

    Ok(())
}

/// Validates that a URL parses and uses http or https
fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            field, value
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' has no host",
            field, value
        )));
    }

    Ok(())
}

/// Validates a collection key
fn validate_collection_key(key: &str) -> Result<(), ConfigError> {
    if key.is_empty() {
        return Err(ConfigError::Validation(
            "collection key cannot be empty".to_string(),
        ));
    }

    if !key
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '~')
    {
        return Err(ConfigError::Validation(format!(
            "collection key '{}' contains invalid characters",
            key
        )));
    }

    Ok(())
}
