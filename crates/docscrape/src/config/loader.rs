use std::path::Path;

use url::Url;

use crate::config::schema::{Config, CONFIG_VERSION};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != CONFIG_VERSION {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.poll_interval_seconds == 0 {
        return Err(invalid("poll_interval_seconds must be at least 1"));
    }
    if config.max_concurrent_jobs == 0 {
        return Err(invalid("max_concurrent_jobs must be at least 1"));
    }
    if config.results_directory.trim().is_empty() {
        return Err(invalid("results_directory must not be empty"));
    }
    if config.status_store.path.trim().is_empty() {
        return Err(invalid("status_store.path must not be empty"));
    }

    let session = &config.session;
    if session.page_limit == 0 {
        return Err(invalid("session.page_limit must be at least 1"));
    }
    if session.fetch_timeout_seconds == 0 {
        return Err(invalid("session.fetch_timeout_seconds must be at least 1"));
    }
    if session.retry_base_delay_ms > session.retry_max_delay_ms {
        return Err(invalid(
            "session.retry_base_delay_ms must not exceed session.retry_max_delay_ms",
        ));
    }

    let writes = &config.status_writes;
    if writes.base_delay_ms > writes.max_delay_ms {
        return Err(invalid(
            "status_writes.base_delay_ms must not exceed status_writes.max_delay_ms",
        ));
    }

    let base_url = Url::parse(&config.site.base_url).map_err(|e| ConfigError::Validation {
        message: format!("site.base_url '{}' is not a valid URL: {}", config.site.base_url, e),
    })?;
    if base_url.cannot_be_a_base() {
        return Err(invalid("site.base_url must be an absolute http(s) URL"));
    }
    if config.site.request_timeout_seconds == 0 {
        return Err(invalid("site.request_timeout_seconds must be at least 1"));
    }

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Validation {
        message: message.to_string(),
    }
}
