pub mod job;
pub mod job_ref;
pub mod job_store;

pub(crate) const FIELD_MANAGER: &str = "job-reconciler";
