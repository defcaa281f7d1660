//! Configuration loading with environment variable substitution.
//!
//! Loads a [`CoreConfig`] from a YAML file, expanding `${VAR}` and
//! `${VAR:-default}` placeholders from the process environment before
//! deserialization, then validates the result. A missing variable without a
//! default is a hard configuration error, never a silent fallback.

use crate::config::CoreConfig;
use crate::error::{Result, VigilError};
use std::path::Path;
use tracing::debug;

/// Load, substitute, deserialize, and validate a config file
pub fn load_from_file(path: &Path) -> Result<CoreConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        VigilError::Configuration(format!("Failed to read {}: {e}", path.display()))
    })?;
    let config = from_yaml(&raw)?;
    debug!(path = %path.display(), "Configuration loaded");
    Ok(config)
}

/// Deserialize and validate a config from YAML text
pub fn from_yaml(raw: &str) -> Result<CoreConfig> {
    let substituted = substitute_env_vars(raw)?;
    let config: CoreConfig = serde_yaml::from_str(&substituted)
        .map_err(|e| VigilError::Configuration(format!("Invalid YAML configuration: {e}")))?;
    config.validate()?;
    Ok(config)
}

/// Expand `${VAR}` and `${VAR:-default}` placeholders
fn substitute_env_vars(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            VigilError::Configuration("Unterminated ${ placeholder in configuration".to_string())
        })?;
        let placeholder = &after[..end];

        let (name, default) = match placeholder.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (placeholder, None),
        };

        match std::env::var(name) {
            Ok(value) => out.push_str(&value),
            Err(_) => match default {
                Some(default) => out.push_str(default),
                None => {
                    return Err(VigilError::Configuration(format!(
                        "Environment variable '{name}' referenced in configuration is not set"
                    )))
                }
            },
        }

        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
