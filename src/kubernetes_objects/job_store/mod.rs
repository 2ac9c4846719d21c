#[cfg(test)]
pub(crate) mod fake;

use derive_debug::Dbg;
use k8s_openapi::api::batch::v1::Job;
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::{Api, Client};
use thiserror::Error;
use tracing::{Level, instrument};

use super::FIELD_MANAGER;
use super::job_ref::JobRef;

#[derive(Error, Debug)]
pub enum JobStoreError {
    #[error("Job '{0}' not found")]
    NotFound(JobRef),

    #[error("Kubernetes client error: {0}")]
    KubeClient(#[from] kube::Error),
}

impl JobStoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, JobStoreError::NotFound(_))
    }

    fn classify(job: &JobRef, err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ref response) if response.code == 404 => {
                JobStoreError::NotFound(job.clone())
            }
            e => JobStoreError::KubeClient(e),
        }
    }
}

/// The narrow slice of the Jobs API the reconciler talks to.
#[allow(async_fn_in_trait)]
pub trait JobStore {
    async fn get(&self, job: &JobRef) -> Result<Job, JobStoreError>;

    async fn create(&self, namespace: &str, job: &Job) -> Result<Job, JobStoreError>;

    async fn patch(&self, job: &JobRef, patch: &json_patch::Patch) -> Result<Job, JobStoreError>;

    async fn delete(&self, job: &JobRef) -> Result<(), JobStoreError>;
}

#[derive(Dbg, Clone)]
pub struct KubeJobStore {
    #[dbg(skip)]
    client: Client,
}

impl KubeJobStore {
    pub fn new(client: Client) -> Self {
        KubeJobStore { client }
    }

    fn api(&self, namespace: &str) -> Api<Job> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl JobStore for KubeJobStore {
    #[instrument(
        "job_store/get",
        level = Level::TRACE,
        skip(self),
        fields(kubernetes_namespace = %job.namespace, job_name = %job.name)
    )]
    async fn get(&self, job: &JobRef) -> Result<Job, JobStoreError> {
        self.api(&job.namespace)
            .get_opt(&job.name)
            .await?
            .ok_or_else(|| JobStoreError::NotFound(job.clone()))
    }

    #[instrument(
        "job_store/create",
        level = Level::TRACE,
        skip(self, job),
        fields(kubernetes_namespace = %namespace)
    )]
    async fn create(&self, namespace: &str, job: &Job) -> Result<Job, JobStoreError> {
        let post_params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        Ok(self.api(namespace).create(&post_params, job).await?)
    }

    #[instrument(
        "job_store/patch",
        level = Level::TRACE,
        skip(self, patch),
        fields(kubernetes_namespace = %job.namespace, job_name = %job.name)
    )]
    async fn patch(&self, job: &JobRef, patch: &json_patch::Patch) -> Result<Job, JobStoreError> {
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        self.api(&job.namespace)
            .patch(&job.name, &params, &Patch::Json::<()>(patch.clone()))
            .await
            .map_err(|e| JobStoreError::classify(job, e))
    }

    #[instrument(
        "job_store/delete",
        level = Level::TRACE,
        skip(self),
        fields(kubernetes_namespace = %job.namespace, job_name = %job.name)
    )]
    async fn delete(&self, job: &JobRef) -> Result<(), JobStoreError> {
        self.api(&job.namespace)
            .delete(&job.name, &DeleteParams::foreground())
            .await
            .map(|_| ())
            .map_err(|e| JobStoreError::classify(job, e))
    }
}
