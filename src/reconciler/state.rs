use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::resource::data::{ConfigStore, ConfigTree};

/// Recorded state of the managed Job, persisted as YAML between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub resource: Value,
}

#[derive(Error, Debug)]
pub enum StateFileError {
    #[error("Cannot read '{0}': {1}")]
    Read(String, io::Error),

    #[error("Cannot write '{0}': {1}")]
    Write(String, io::Error),

    #[error("Cannot parse '{0}': {1}")]
    Parse(String, serde_yaml::Error),

    #[error("Cannot serialize state: {0}")]
    Serialize(serde_yaml::Error),
}

impl ResourceState {
    /// Loads the state file. A missing file is an empty state.
    pub async fn load(path: &Path) -> Result<Self, StateFileError> {
        let location = path.display().to_string();
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => serde_yaml::from_str(&raw).map_err(|e| StateFileError::Parse(location, e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("State file '{}' does not exist yet.", location);
                Ok(ResourceState::default())
            }
            Err(e) => Err(StateFileError::Read(location, e)),
        }
    }

    pub async fn save(&self, path: &Path) -> Result<(), StateFileError> {
        let raw = serde_yaml::to_string(self).map_err(StateFileError::Serialize)?;
        tokio::fs::write(path, raw)
            .await
            .map_err(|e| StateFileError::Write(path.display().to_string(), e))
    }

    pub fn is_managed(&self) -> bool {
        self.id.as_deref().is_some_and(|id| !id.is_empty())
    }
}

impl From<ConfigTree> for ResourceState {
    fn from(tree: ConfigTree) -> Self {
        if tree.id().is_none() {
            return ResourceState::default();
        }
        let (id, resource) = tree.into_recorded();
        ResourceState { id, resource }
    }
}

pub async fn load_manifest(path: &Path) -> Result<Value, StateFileError> {
    let location = path.display().to_string();
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| StateFileError::Read(location.clone(), e))?;
    serde_yaml::from_str(&raw).map_err(|e| StateFileError::Parse(location, e))
}
