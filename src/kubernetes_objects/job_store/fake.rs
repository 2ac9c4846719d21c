use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use k8s_openapi::api::batch::v1::{Job, JobCondition, JobStatus};

use super::{JobStore, JobStoreError};
use crate::kubernetes_objects::job_ref::JobRef;

/// Scripted answer for the next `get` on [`FakeJobStore`].
#[derive(Debug, Clone)]
pub(crate) enum Scripted {
    Found(Job),
    NotFound,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Get(JobRef),
    Create(String),
    Patch(JobRef, usize),
    Delete(JobRef),
}

/// In-memory Jobs API. Scripted `get` answers take precedence over stored objects.
#[derive(Debug, Default)]
pub(crate) struct FakeJobStore {
    jobs: Mutex<BTreeMap<JobRef, Job>>,
    gets: Mutex<VecDeque<Scripted>>,
    fail_deletes: Mutex<bool>,
    calls: Mutex<Vec<Call>>,
}

pub(crate) fn api_failure() -> JobStoreError {
    let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    JobStoreError::KubeClient(kube::Error::SerdeError(err))
}

pub(crate) fn job_with_conditions(job: &JobRef, conditions: &[(&str, &str)]) -> Job {
    let mut live = Job::default();
    live.metadata.namespace = Some(job.namespace.clone());
    live.metadata.name = Some(job.name.clone());
    live.status = Some(JobStatus {
        conditions: Some(
            conditions
                .iter()
                .map(|(type_, status)| JobCondition {
                    type_: type_.to_string(),
                    status: status.to_string(),
                    ..Default::default()
                })
                .collect(),
        ),
        ..Default::default()
    });
    live
}

impl FakeJobStore {
    pub(crate) fn with_job(self, job: Job) -> Self {
        let job_ref = JobRef::from_metadata(&job.metadata).unwrap();
        self.jobs.lock().unwrap().insert(job_ref, job);
        self
    }

    pub(crate) fn script_gets(self, answers: impl IntoIterator<Item = Scripted>) -> Self {
        self.gets.lock().unwrap().extend(answers);
        self
    }

    pub(crate) fn failing_deletes(self) -> Self {
        *self.fail_deletes.lock().unwrap() = true;
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn get_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Get(_)))
            .count()
    }

    pub(crate) fn stored(&self, job: &JobRef) -> Option<Job> {
        self.jobs.lock().unwrap().get(job).cloned()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl JobStore for FakeJobStore {
    async fn get(&self, job: &JobRef) -> Result<Job, JobStoreError> {
        self.record(Call::Get(job.clone()));
        let scripted = self.gets.lock().unwrap().pop_front();
        match scripted {
            Some(Scripted::Found(live)) => Ok(live),
            Some(Scripted::NotFound) => Err(JobStoreError::NotFound(job.clone())),
            Some(Scripted::Fail) => Err(api_failure()),
            None => self
                .jobs
                .lock()
                .unwrap()
                .get(job)
                .cloned()
                .ok_or_else(|| JobStoreError::NotFound(job.clone())),
        }
    }

    async fn create(&self, namespace: &str, job: &Job) -> Result<Job, JobStoreError> {
        let mut created = job.clone();
        let name = match (&job.metadata.name, &job.metadata.generate_name) {
            (Some(name), _) => name.clone(),
            (None, Some(prefix)) => format!("{prefix}x7k2p"),
            (None, None) => String::new(),
        };
        self.record(Call::Create(name.clone()));
        created.metadata.name = Some(name.clone());
        created.metadata.namespace = Some(namespace.to_string());
        created.metadata.uid = Some(format!("uid-{name}"));
        created.metadata.resource_version = Some("1".to_string());
        self.jobs
            .lock()
            .unwrap()
            .insert(JobRef::new(namespace, name), created.clone());
        Ok(created)
    }

    async fn patch(&self, job: &JobRef, patch: &json_patch::Patch) -> Result<Job, JobStoreError> {
        self.record(Call::Patch(job.clone(), patch.0.len()));
        let mut jobs = self.jobs.lock().unwrap();
        let stored = jobs
            .get_mut(job)
            .ok_or_else(|| JobStoreError::NotFound(job.clone()))?;
        let mut doc = serde_json::to_value(&*stored).unwrap();
        json_patch::patch(&mut doc, patch).map_err(|_| api_failure())?;
        *stored = serde_json::from_value(doc).unwrap();
        Ok(stored.clone())
    }

    async fn delete(&self, job: &JobRef) -> Result<(), JobStoreError> {
        self.record(Call::Delete(job.clone()));
        if *self.fail_deletes.lock().unwrap() {
            return Err(api_failure());
        }
        self.jobs
            .lock()
            .unwrap()
            .remove(job)
            .map(|_| ())
            .ok_or_else(|| JobStoreError::NotFound(job.clone()))
    }
}
