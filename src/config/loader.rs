//! Configuration loader

use std::path::Path;

use super::Config;
use crate::error::{ProxyError, Result};

/// Load configuration from a YAML file.
pub fn load_config(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&contents)?;
    config.validate().map_err(ProxyError::Config)?;
    Ok(config)
}

/// Load configuration from a YAML string (useful for testing).
pub fn load_config_from_str(yaml: &str) -> Result<Config> {
    let config: Config = serde_yaml::from_str(yaml)?;
    config.validate().map_err(ProxyError::Config)?;
    Ok(config)
}
