use std::time::Duration;

use duration_string::DurationString;
use serde::{Deserialize, Deserializer};

/// Backoff schedule shared by every wait loop.
#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct PollingConfig {
    /// Delay before the second attempt.
    #[serde(
        deserialize_with = "deserialize_duration",
        default = "default_initial_interval"
    )]
    pub initial_interval: Duration,

    /// Upper bound for the delay between two attempts.
    #[serde(
        deserialize_with = "deserialize_duration",
        default = "default_max_interval"
    )]
    pub max_interval: Duration,

    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_interval: default_initial_interval(),
            max_interval: default_max_interval(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

impl PollingConfig {
    /// Delay to use after `previous`, grown by the backoff factor and capped at `max_interval`.
    pub fn next_interval(&self, previous: Duration) -> Duration {
        previous
            .saturating_mul(self.backoff_factor.max(1))
            .min(self.max_interval)
    }
}

pub(crate) fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    DurationString::deserialize(deserializer).map(Duration::from)
}

const fn default_initial_interval() -> Duration {
    Duration::from_millis(500)
}
const fn default_max_interval() -> Duration {
    Duration::from_secs(10)
}
const fn default_backoff_factor() -> u32 {
    2
}
