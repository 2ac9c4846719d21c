//! Lifecycle of a single `batch/v1` Job managed through a change-tracking configuration store.

pub mod data;
mod diff;
pub mod error;
mod lifecycle;
mod patch;
mod wait;

use crate::config::polling::PollingConfig;
use crate::retry::Shutdown;

use self::data::{ConfigPathError, ConfigStore};

pub(crate) const METADATA_KEY: &str = "metadata";
pub(crate) const SPEC_KEY: &str = "spec";
pub(crate) const TTL_KEY: &str = "spec.0.ttl_seconds_after_finished";
pub(crate) const WAIT_FOR_COMPLETION_KEY: &str = "wait_for_completion";

/// Fields defaulted or assigned by the API server. They keep their recorded value while the
/// configuration leaves them out.
pub const COMPUTED_PATHS: [&str; 10] = [
    "metadata.0.name",
    "metadata.0.namespace",
    "metadata.0.uid",
    "metadata.0.resource_version",
    "metadata.0.generation",
    "spec.0.backoff_limit",
    "spec.0.completions",
    "spec.0.completion_mode",
    "spec.0.parallelism",
    "spec.0.selector",
];

/// Fields the API server refuses to change on an existing Job. A change to any of them
/// replaces the Job.
pub const IMMUTABLE_PATHS: [&str; 7] = [
    "metadata.0.name",
    "metadata.0.generate_name",
    "metadata.0.namespace",
    "spec.0.completions",
    "spec.0.completion_mode",
    "spec.0.selector",
    "spec.0.template",
];

/// Marks every changed immutable field of a tracked object as forcing a replacement.
pub fn force_immutable_changes<C: ConfigStore>(config: &mut C) -> Result<(), ConfigPathError> {
    if config.id().is_none() {
        return Ok(());
    }
    for path in IMMUTABLE_PATHS {
        if config.has_change(path) {
            config.force_new(path)?;
        }
    }
    Ok(())
}

/// Callbacks a declarative engine drives for one managed object type.
#[allow(async_fn_in_trait)]
pub trait ManagedResource<S> {
    type Error;

    async fn create<C: ConfigStore>(&self, config: &mut C, store: &S) -> Result<(), Self::Error>;

    /// Refreshes the configuration from the live object.
    async fn read<C: ConfigStore>(&self, config: &mut C, store: &S) -> Result<(), Self::Error>;

    async fn update<C: ConfigStore>(&self, config: &mut C, store: &S) -> Result<(), Self::Error>;

    async fn delete<C: ConfigStore>(&self, config: &mut C, store: &S) -> Result<(), Self::Error>;

    async fn exists<C: ConfigStore>(&self, config: &C, store: &S) -> Result<bool, Self::Error>;

    /// Adjusts a planned change before it is applied.
    async fn customize_diff<C: ConfigStore>(
        &self,
        diff: &mut C,
        store: &S,
    ) -> Result<(), Self::Error>;

    /// Adopts an existing object by its identifier.
    async fn import<C: ConfigStore>(
        &self,
        id: &str,
        config: &mut C,
        store: &S,
    ) -> Result<(), Self::Error>;
}

/// The Job resource. Holds settings only; all state lives in the stores.
#[derive(Debug, Clone)]
pub struct JobResource {
    polling: PollingConfig,
    shutdown: Shutdown,
}

impl JobResource {
    pub fn new(polling: PollingConfig, shutdown: Shutdown) -> Self {
        JobResource { polling, shutdown }
    }
}
