pub mod polling;
pub mod timeouts;

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use self::polling::PollingConfig;
use self::timeouts::OperationTimeouts;

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Config {
    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub timeouts: OperationTimeouts,
}

#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("Cannot read config file '{0}': {1}")]
    Io(String, std::io::Error),

    #[error("Cannot parse config file '{0}': {1}")]
    Parse(String, serde_yaml::Error),
}

impl Config {
    pub async fn new_from_file(path: &Path) -> Result<Config, ConfigLoadError> {
        let location = path.display().to_string();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigLoadError::Io(location.clone(), e))?;
        serde_yaml::from_str(&raw).map_err(|e| ConfigLoadError::Parse(location, e))
    }
}
