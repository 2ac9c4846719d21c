use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use super::polling::deserialize_duration;

/// Lifecycle operation a timeout or an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    Plan,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Plan => "plan",
        };
        f.write_str(name)
    }
}

/// Wall-clock limits for the waits of each mutating operation.
#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct OperationTimeouts {
    #[serde(deserialize_with = "deserialize_duration", default = "default_timeout")]
    pub create: Duration,

    #[serde(deserialize_with = "deserialize_duration", default = "default_timeout")]
    pub update: Duration,

    #[serde(deserialize_with = "deserialize_duration", default = "default_timeout")]
    pub delete: Duration,
}

impl Default for OperationTimeouts {
    fn default() -> Self {
        Self {
            create: default_timeout(),
            update: default_timeout(),
            delete: default_timeout(),
        }
    }
}

impl OperationTimeouts {
    pub fn for_operation(&self, operation: Operation) -> Duration {
        match operation {
            Operation::Create => self.create,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
            Operation::Read | Operation::Plan => default_timeout(),
        }
    }
}

const fn default_timeout() -> Duration {
    Duration::from_secs(60)
}
