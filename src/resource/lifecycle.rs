use k8s_openapi::api::batch::v1::Job;
use serde_json::Value;
use tracing::{Level, debug, info, instrument};

use super::data::ConfigStore;
use super::error::ResourceError;
use super::patch::{metadata_patch, spec_patch};
use super::wait::{wait_until_job_deleted, wait_until_job_finished};
use super::{
    JobResource, METADATA_KEY, ManagedResource, SPEC_KEY, TTL_KEY, WAIT_FOR_COMPLETION_KEY, diff,
};
use crate::config::timeouts::Operation;
use crate::error::SpannedExt;
use crate::kubernetes_objects::job::{
    DEFAULT_NAMESPACE, expand_metadata, expand_spec, flatten_metadata, flatten_spec,
    remove_generated_labels, ttl_or_zero,
};
use crate::kubernetes_objects::job_ref::JobRef;
use crate::kubernetes_objects::job_store::JobStore;

const METADATA_BLOCK: &str = "metadata.0";
const SPEC_BLOCK: &str = "spec.0";
const TEMPLATE_KEY: &str = "spec.0.template";
const MANUAL_SELECTOR_KEY: &str = "spec.0.manual_selector";

fn wait_for_completion<C: ConfigStore>(config: &C) -> bool {
    config
        .get(WAIT_FOR_COMPLETION_KEY)
        .and_then(Value::as_bool)
        .unwrap_or(true)
}

fn recorded_ref<C: ConfigStore>(config: &C) -> Result<Option<JobRef>, ResourceError> {
    Ok(config.id().map(str::parse).transpose()?)
}

/// Fetches `job`, mapping not-found to `None`.
async fn fetch<S: JobStore>(
    store: &S,
    job: &JobRef,
    operation: Operation,
) -> Result<Option<Job>, ResourceError> {
    match store.get(job).await {
        Ok(live) => Ok(Some(live)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(ResourceError::remote(job, operation, e)),
    }
}

impl<S: JobStore> ManagedResource<S> for JobResource {
    type Error = ResourceError;

    #[instrument("job/create", level = Level::TRACE, skip_all)]
    async fn create<C: ConfigStore>(&self, config: &mut C, store: &S) -> Result<(), ResourceError> {
        let metadata = expand_metadata(config.get(METADATA_BLOCK))?;
        let spec = expand_spec(config.get(SPEC_BLOCK))?;
        let namespace = metadata
            .namespace
            .clone()
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        let display_name = format!(
            "{},{}",
            namespace,
            metadata
                .name
                .as_deref()
                .or(metadata.generate_name.as_deref())
                .unwrap_or_default()
        );
        let job = Job {
            metadata,
            spec: Some(spec),
            ..Default::default()
        };

        info!("Creating new Job '{}'", display_name);
        debug!("Creating new Job: {:?}", job);
        let created = store
            .create(&namespace, &job)
            .await
            .map_err(|e| ResourceError::remote(&display_name, Operation::Create, e))?;
        debug!("Submitted new job: {:?}", created);

        let job_ref = JobRef::from_metadata(&created.metadata)?;
        info!("Job '{}' has been created.", job_ref);
        config.set_id(Some(job_ref.to_string()));

        if wait_for_completion(config) {
            return wait_until_job_finished(
                store,
                &job_ref,
                Operation::Create,
                config.timeout(Operation::Create),
                &self.polling,
                &self.shutdown,
            )
            .await;
        }

        self.read(config, store).await
    }

    #[instrument("job/read", level = Level::TRACE, skip_all, fields(job_id = ?config.id()))]
    async fn read<C: ConfigStore>(&self, config: &mut C, store: &S) -> Result<(), ResourceError> {
        let Some(job) = recorded_ref(config)? else {
            debug!("Resource ID is empty, nothing to read.");
            return Ok(());
        };

        info!("Reading job '{}'", job);
        let Some(mut live) = fetch(store, &job, Operation::Read).await? else {
            match config.get_ok(TTL_KEY) {
                Some(ttl) => info!(
                    "Job '{}' has been deleted by Kubernetes due to TTL (ttl_seconds_after_finished = {}), keeping resource in state",
                    job, ttl
                ),
                None => {
                    info!("Job '{}' no longer exists, removing it from state", job);
                    config.set_id(None);
                }
            }
            return Ok(());
        };
        debug!("Received job: {:?}", live);

        if config.get_ok(MANUAL_SELECTOR_KEY).is_none() {
            remove_generated_labels(&mut live.metadata.labels);
            if let Some(selector) = live.spec.as_mut().and_then(|spec| spec.selector.as_mut()) {
                remove_generated_labels(&mut selector.match_labels);
            }
        }

        let spec = flatten_spec(&live.spec.unwrap_or_default(), config.get(TEMPLATE_KEY))
            .with_span_trace()
            .map_err(|e| ResourceError::marshal(&job, "spec", e))?;
        config.set(METADATA_KEY, flatten_metadata(&live.metadata))?;
        config.set(SPEC_KEY, spec)?;
        Ok(())
    }

    #[instrument("job/update", level = Level::TRACE, skip_all, fields(job_id = ?config.id()))]
    async fn update<C: ConfigStore>(&self, config: &mut C, store: &S) -> Result<(), ResourceError> {
        let job: JobRef = config.id().unwrap_or_default().parse()?;

        if fetch(store, &job, Operation::Update).await?.is_none() {
            let ttl = ttl_or_zero(config.get(TTL_KEY));
            if ttl >= 0 {
                info!(
                    "Job '{}' not found but ttl_seconds_after_finished = {}; nothing to update",
                    job, ttl
                );
                return Ok(());
            }
            return Err(ResourceError::not_found(&job, Operation::Update));
        }

        let mut ops = metadata_patch(config)
            .with_span_trace()
            .map_err(|e| ResourceError::marshal(&job, "metadata", e))?;
        if config.has_change(SPEC_KEY) {
            ops.extend(spec_patch(config));
        }

        info!("Updating job '{}' with {} operation(s)", job, ops.len());
        debug!("Patch operations: {:?}", ops);
        let patched = store
            .patch(&job, &json_patch::Patch(ops))
            .await
            .map_err(|e| ResourceError::remote(&job, Operation::Update, e))?;
        debug!("Submitted updated job: {:?}", patched);

        let job_ref = JobRef::from_metadata(&patched.metadata)?;
        config.set_id(Some(job_ref.to_string()));

        if wait_for_completion(config) {
            wait_until_job_finished(
                store,
                &job,
                Operation::Update,
                config.timeout(Operation::Update),
                &self.polling,
                &self.shutdown,
            )
            .await?;
        }

        self.read(config, store).await
    }

    #[instrument("job/delete", level = Level::TRACE, skip_all, fields(job_id = ?config.id()))]
    async fn delete<C: ConfigStore>(&self, config: &mut C, store: &S) -> Result<(), ResourceError> {
        let Some(job) = recorded_ref(config)? else {
            debug!("Resource ID is empty, nothing to delete.");
            return Ok(());
        };

        info!("Deleting job '{}'", job);
        match store.delete(&job).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                info!("Job '{}' is already gone.", job);
                config.set_id(None);
                return Ok(());
            }
            Err(e) => return Err(ResourceError::remote(&job, Operation::Delete, e)),
        }

        wait_until_job_deleted(
            store,
            &job,
            config.timeout(Operation::Delete),
            &self.polling,
            &self.shutdown,
        )
        .await?;

        info!("Job '{}' deleted", job);
        config.set_id(None);
        Ok(())
    }

    #[instrument("job/exists", level = Level::TRACE, skip_all, fields(job_id = ?config.id()))]
    async fn exists<C: ConfigStore>(&self, config: &C, store: &S) -> Result<bool, ResourceError> {
        let Some(job) = recorded_ref(config)? else {
            return Ok(false);
        };
        debug!("Checking job '{}'", job);
        Ok(fetch(store, &job, Operation::Read).await?.is_some())
    }

    async fn customize_diff<C: ConfigStore>(
        &self,
        planned: &mut C,
        store: &S,
    ) -> Result<(), ResourceError> {
        diff::customize_diff(planned, store).await
    }

    #[instrument("job/import", level = Level::TRACE, skip(self, config, store))]
    async fn import<C: ConfigStore>(
        &self,
        id: &str,
        config: &mut C,
        store: &S,
    ) -> Result<(), ResourceError> {
        let job: JobRef = id.parse()?;
        config.set_id(Some(job.to_string()));
        self.read(config, store).await?;
        if config.id().is_none() {
            return Err(ResourceError::not_found(&job, Operation::Read));
        }
        Ok(())
    }
}
