use tracing::{Level, debug, instrument};

use super::data::ConfigStore;
use super::error::ResourceError;
use super::{METADATA_KEY, SPEC_KEY, TTL_KEY};
use crate::config::timeouts::Operation;
use crate::kubernetes_objects::job::ttl_or_zero;
use crate::kubernetes_objects::job_ref::JobRef;
use crate::kubernetes_objects::job_store::JobStore;

/// Plans around the Job's own TTL-based deletion.
///
/// Once a finished Job outlives `ttlSecondsAfterFinished` the cluster removes it. An
/// unchanged TTL then hides every `spec`/`metadata` difference instead of reporting the
/// disappearance as drift; a changed TTL forces a replacement, whether the Job is gone
/// or not.
#[instrument("job/customize_diff", level = Level::TRACE, skip_all, fields(job_id = ?diff.id()))]
pub(super) async fn customize_diff<C: ConfigStore, S: JobStore>(
    diff: &mut C,
    store: &S,
) -> Result<(), ResourceError> {
    let Some(id) = diff.id() else {
        debug!("Resource ID is empty, resource not created yet.");
        return Ok(());
    };
    let job: JobRef = id.parse()?;

    let (old, new) = diff.get_change(TTL_KEY);
    let (old_ttl, new_ttl) = (ttl_or_zero(old), ttl_or_zero(new));

    match store.get(&job).await {
        Ok(_) if old_ttl != new_ttl => {
            debug!(
                "Job {} exists and ttl_seconds_after_finished changed from {} to {}; forcing recreation",
                job, old_ttl, new_ttl
            );
            diff.force_new(TTL_KEY)?;
        }
        Ok(_) => {}
        Err(e) if e.is_not_found() => {
            if old_ttl < 0 {
                return Ok(());
            }
            if old_ttl != new_ttl {
                debug!(
                    "Job {} not found and ttl_seconds_after_finished changed from {} to {}; forcing recreation",
                    job, old_ttl, new_ttl
                );
                diff.force_new(TTL_KEY)?;
            } else {
                debug!(
                    "Job {} not found and ttl_seconds_after_finished remains {}; suppressing diff",
                    job, old_ttl
                );
                diff.clear(SPEC_KEY)?;
                diff.clear(METADATA_KEY)?;
            }
        }
        Err(e) => return Err(ResourceError::remote(&job, Operation::Plan, e)),
    }

    Ok(())
}
