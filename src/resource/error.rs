use std::time::Duration;

use thiserror::Error;
use tracing_error::{ExtractSpanTrace, SpanTrace};

use super::data::ConfigPathError;
use crate::config::timeouts::Operation;
use crate::error::SpannedErr;
use crate::kubernetes_objects::job::JobFieldError;
use crate::kubernetes_objects::job_ref::{JobRef, JobRefError};
use crate::kubernetes_objects::job_store::JobStoreError;
use crate::retry::RetryError;

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Job '{job}' not found; cannot {operation} because it has been deleted")]
    NotFound {
        job: JobRef,
        operation: Operation,
        span_trace: SpanTrace,
    },

    #[error("Failed to {operation} Job '{job}'! API error: {source}")]
    RemoteApi {
        job: String,
        operation: Operation,
        source: SpannedErr<JobStoreError>,
    },

    #[error("Invalid job ID: {0}")]
    Identifier(SpannedErr<JobRefError>),

    #[error("Timed out waiting for job '{job}' during {operation} after {}s: {last}", .waited.as_secs())]
    Timeout {
        job: JobRef,
        operation: Operation,
        waited: Duration,
        last: String,
        span_trace: SpanTrace,
    },

    #[error("job: {}/{} is in failed state", .job.namespace, .job.name)]
    JobFailed { job: JobRef, span_trace: SpanTrace },

    #[error("Failed to marshal {what} of job '{job}': {source}")]
    Marshal {
        job: String,
        what: &'static str,
        source: SpannedErr<serde_json::Error>,
    },

    #[error("Invalid job configuration: {0}")]
    InvalidConfig(SpannedErr<JobFieldError>),

    #[error("Configuration store error: {0}")]
    ConfigPath(SpannedErr<ConfigPathError>),

    #[error("Waiting for job '{job}' during {operation} was interrupted by {signal}")]
    Cancelled {
        job: JobRef,
        operation: Operation,
        signal: &'static str,
        span_trace: SpanTrace,
    },
}

impl ResourceError {
    pub fn is_not_found(&self) -> bool {
        match self {
            ResourceError::NotFound { .. } => true,
            ResourceError::RemoteApi { source, .. } => source.inner().is_not_found(),
            _ => false,
        }
    }

    pub(crate) fn not_found(job: &JobRef, operation: Operation) -> Self {
        ResourceError::NotFound {
            job: job.clone(),
            operation,
            span_trace: SpanTrace::capture(),
        }
    }

    pub(crate) fn remote(job: impl ToString, operation: Operation, err: JobStoreError) -> Self {
        ResourceError::RemoteApi {
            job: job.to_string(),
            operation,
            source: SpannedErr::new(err),
        }
    }

    pub(crate) fn job_failed(job: &JobRef) -> Self {
        ResourceError::JobFailed {
            job: job.clone(),
            span_trace: SpanTrace::capture(),
        }
    }

    pub(crate) fn marshal(
        job: impl ToString,
        what: &'static str,
        source: SpannedErr<serde_json::Error>,
    ) -> Self {
        ResourceError::Marshal {
            job: job.to_string(),
            what,
            source,
        }
    }

    /// Maps the outcome of a failed wait on `job`.
    pub(crate) fn from_retry(
        err: RetryError<ResourceError>,
        job: &JobRef,
        operation: Operation,
    ) -> Self {
        match err {
            RetryError::Fatal(e) => e,
            RetryError::Timeout { waited, last } => ResourceError::Timeout {
                job: job.clone(),
                operation,
                waited,
                last,
                span_trace: SpanTrace::capture(),
            },
            RetryError::Cancelled(signal) => ResourceError::Cancelled {
                job: job.clone(),
                operation,
                signal,
                span_trace: SpanTrace::capture(),
            },
        }
    }
}

impl From<JobRefError> for ResourceError {
    fn from(err: JobRefError) -> Self {
        ResourceError::Identifier(SpannedErr::new(err))
    }
}

impl From<JobFieldError> for ResourceError {
    fn from(err: JobFieldError) -> Self {
        ResourceError::InvalidConfig(SpannedErr::new(err))
    }
}

impl From<ConfigPathError> for ResourceError {
    fn from(err: ConfigPathError) -> Self {
        ResourceError::ConfigPath(SpannedErr::new(err))
    }
}

impl ExtractSpanTrace for ResourceError {
    fn span_trace(&self) -> Option<&SpanTrace> {
        match self {
            ResourceError::NotFound { span_trace, .. } => Some(span_trace),
            ResourceError::RemoteApi { source, .. } => source.span_trace(),
            ResourceError::Identifier(e) => e.span_trace(),
            ResourceError::Timeout { span_trace, .. } => Some(span_trace),
            ResourceError::JobFailed { span_trace, .. } => Some(span_trace),
            ResourceError::Marshal { source, .. } => source.span_trace(),
            ResourceError::InvalidConfig(e) => e.span_trace(),
            ResourceError::ConfigPath(e) => e.span_trace(),
            ResourceError::Cancelled { span_trace, .. } => Some(span_trace),
        }
    }
}
