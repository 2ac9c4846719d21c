use std::fmt;
use std::str::FromStr;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use thiserror::Error;

const ID_SEPARATOR: char = ',';

/// Namespaced address of a Job, recorded as `"<namespace>,<name>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobRef {
    pub namespace: String,
    pub name: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobRefError {
    #[error("Unexpected ID format ({0:?}), expected \"<namespace>,<name>\"")]
    Malformed(String),
}

impl JobRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        JobRef {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Builds the ref from metadata returned by the API server.
    ///
    /// Goes through the string codec so a response without a name or namespace is
    /// rejected the same way a corrupted recorded ID would be.
    pub fn from_metadata(meta: &ObjectMeta) -> Result<Self, JobRefError> {
        format!(
            "{}{ID_SEPARATOR}{}",
            meta.namespace.as_deref().unwrap_or_default(),
            meta.name.as_deref().unwrap_or_default()
        )
        .parse()
    }
}

impl fmt::Display for JobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{ID_SEPARATOR}{}", self.namespace, self.name)
    }
}

impl FromStr for JobRef {
    type Err = JobRefError;

    fn from_str(id: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = id.split(ID_SEPARATOR).collect();
        match parts.as_slice() {
            [namespace, name] if !namespace.is_empty() && !name.is_empty() => {
                Ok(JobRef::new(*namespace, *name))
            }
            _ => Err(JobRefError::Malformed(id.to_string())),
        }
    }
}
