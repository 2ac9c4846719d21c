use std::time::Duration;

use tracing::{Level, info, instrument, warn};

use super::error::ResourceError;
use crate::config::polling::PollingConfig;
use crate::config::timeouts::Operation;
use crate::kubernetes_objects::job::{JobOutcome, terminal_condition};
use crate::kubernetes_objects::job_ref::JobRef;
use crate::kubernetes_objects::job_store::JobStore;
use crate::retry::{Attempt, Shutdown, retry_until};

/// Polls `job` until it reports `Complete`, or is gone.
///
/// A Job that disappeared was finished and collected by its TTL, so not-found counts as
/// success. A `Failed` condition or any other API error ends the wait immediately.
#[instrument(
    "wait_until_job_finished",
    level = Level::TRACE,
    skip(store, polling, shutdown),
    fields(kubernetes_namespace = %job.namespace, job_name = %job.name)
)]
pub(super) async fn wait_until_job_finished<S: JobStore>(
    store: &S,
    job: &JobRef,
    operation: Operation,
    timeout: Duration,
    polling: &PollingConfig,
    shutdown: &Shutdown,
) -> Result<(), ResourceError> {
    info!(
        "Waiting up to {} seconds for job '{}' to finish...",
        timeout.as_secs(),
        job
    );

    retry_until(timeout, polling, shutdown, || async move {
        match store.get(job).await {
            Ok(live) => match terminal_condition(&live) {
                Some(JobOutcome::Complete) => {
                    info!("Job '{}' has completed.", job);
                    Attempt::Done
                }
                Some(JobOutcome::Failed) => Attempt::Fatal(ResourceError::job_failed(job)),
                None => Attempt::Retry(format!(
                    "job: {}/{} is not in complete state",
                    job.namespace, job.name
                )),
            },
            Err(e) if e.is_not_found() => {
                info!("Job '{}' is already gone.", job);
                Attempt::Done
            }
            Err(e) => {
                warn!("Error while checking job '{}': {}", job, e);
                Attempt::Fatal(ResourceError::remote(job, operation, e))
            }
        }
    })
    .await
    .map_err(|e| ResourceError::from_retry(e, job, operation))
}

/// Polls until `job` can no longer be fetched.
#[instrument(
    "wait_until_job_deleted",
    level = Level::TRACE,
    skip(store, polling, shutdown),
    fields(kubernetes_namespace = %job.namespace, job_name = %job.name)
)]
pub(super) async fn wait_until_job_deleted<S: JobStore>(
    store: &S,
    job: &JobRef,
    timeout: Duration,
    polling: &PollingConfig,
    shutdown: &Shutdown,
) -> Result<(), ResourceError> {
    retry_until(timeout, polling, shutdown, || async move {
        match store.get(job).await {
            Ok(_) => Attempt::Retry(format!("Job ({job}) still exists")),
            Err(e) if e.is_not_found() => Attempt::Done,
            Err(e) => Attempt::Fatal(ResourceError::remote(job, Operation::Delete, e)),
        }
    })
    .await
    .map_err(|e| ResourceError::from_retry(e, job, Operation::Delete))
}
