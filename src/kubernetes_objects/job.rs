//! Translation between the `metadata` / `spec` configuration blocks and `batch/v1` Jobs.

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use thiserror::Error;

pub(crate) const DEFAULT_NAMESPACE: &str = "default";

/// Labels the Job controller stamps on Jobs and their selectors.
const GENERATED_LABELS: [&str; 4] = [
    "controller-uid",
    "job-name",
    "batch.kubernetes.io/controller-uid",
    "batch.kubernetes.io/job-name",
];

#[derive(Error, Debug)]
pub enum JobFieldError {
    #[error("'{key}' must be {expected}, got {value}")]
    InvalidField {
        key: &'static str,
        expected: &'static str,
        value: Value,
    },

    #[error("Cannot decode '{key}': {source}")]
    Decode {
        key: &'static str,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobOutcome {
    Complete,
    Failed,
}

/// First `Complete` or `Failed` condition whose status is `"True"`, in API order.
pub(crate) fn terminal_condition(job: &Job) -> Option<JobOutcome> {
    job.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .into_iter()
        .flatten()
        .filter(|condition| condition.status == "True")
        .find_map(|condition| match condition.type_.as_str() {
            "Complete" => Some(JobOutcome::Complete),
            "Failed" => Some(JobOutcome::Failed),
            _ => None,
        })
}

/// Lenient TTL reading used for comparisons: anything absent or unparseable is `0`.
pub(crate) fn ttl_or_zero(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        _ => 0,
    }
}

pub(crate) fn remove_generated_labels(labels: &mut Option<BTreeMap<String, String>>) {
    if let Some(labels) = labels.as_mut() {
        for label in GENERATED_LABELS {
            labels.remove(label);
        }
    }
}

pub(crate) fn expand_metadata(block: Option<&Value>) -> Result<ObjectMeta, JobFieldError> {
    let block = block.unwrap_or(&Value::Null);
    Ok(ObjectMeta {
        name: string_field(block, "name")?,
        generate_name: string_field(block, "generate_name")?,
        namespace: Some(
            string_field(block, "namespace")?.unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
        ),
        labels: decoded_field(block, "labels")?,
        annotations: decoded_field(block, "annotations")?,
        ..Default::default()
    })
}

pub(crate) fn expand_spec(block: Option<&Value>) -> Result<JobSpec, JobFieldError> {
    let block = block.unwrap_or(&Value::Null);
    Ok(JobSpec {
        active_deadline_seconds: int_field(block, "active_deadline_seconds")?,
        backoff_limit: int_field(block, "backoff_limit")?,
        completions: int_field(block, "completions")?,
        completion_mode: string_field(block, "completion_mode")?,
        manual_selector: bool_field(block, "manual_selector")?,
        parallelism: int_field(block, "parallelism")?,
        selector: decoded_field::<LabelSelector>(block, "selector")?,
        template: decoded_field::<PodTemplateSpec>(block, "template")?.unwrap_or_default(),
        ttl_seconds_after_finished: ttl_field(block)?,
        ..Default::default()
    })
}

pub(crate) fn flatten_metadata(meta: &ObjectMeta) -> Value {
    let mut block = Map::new();
    insert_some(&mut block, "name", &meta.name);
    insert_some(&mut block, "generate_name", &meta.generate_name);
    insert_some(&mut block, "namespace", &meta.namespace);
    insert_string_map(&mut block, "labels", &meta.labels);
    insert_string_map(&mut block, "annotations", &meta.annotations);
    insert_some(&mut block, "uid", &meta.uid);
    insert_some(&mut block, "resource_version", &meta.resource_version);
    insert_some(&mut block, "generation", &meta.generation);
    json!([block])
}

/// Flattens a live spec. A template already present in the configuration is kept as is.
pub(crate) fn flatten_spec(
    spec: &JobSpec,
    configured_template: Option<&Value>,
) -> Result<Value, serde_json::Error> {
    let mut block = Map::new();
    insert_some(&mut block, "active_deadline_seconds", &spec.active_deadline_seconds);
    insert_some(&mut block, "backoff_limit", &spec.backoff_limit);
    insert_some(&mut block, "completions", &spec.completions);
    insert_some(&mut block, "completion_mode", &spec.completion_mode);
    insert_some(&mut block, "manual_selector", &spec.manual_selector);
    insert_some(&mut block, "parallelism", &spec.parallelism);
    insert_some(
        &mut block,
        "ttl_seconds_after_finished",
        &spec.ttl_seconds_after_finished.map(|ttl| ttl.to_string()),
    );
    if let Some(selector) = &spec.selector {
        block.insert("selector".to_string(), serde_json::to_value(selector)?);
    }
    let template = match configured_template {
        Some(template) if !template.is_null() => template.clone(),
        _ => serde_json::to_value(&spec.template)?,
    };
    block.insert("template".to_string(), template);
    Ok(json!([block]))
}

fn insert_some<T: Into<Value> + Clone>(block: &mut Map<String, Value>, key: &str, value: &Option<T>) {
    if let Some(value) = value {
        block.insert(key.to_string(), value.clone().into());
    }
}

fn insert_string_map(
    block: &mut Map<String, Value>,
    key: &str,
    value: &Option<BTreeMap<String, String>>,
) {
    if let Some(map) = value {
        let map = map
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        block.insert(key.to_string(), Value::Object(map));
    }
}

fn present<'a>(block: &'a Value, key: &str) -> Option<&'a Value> {
    block.get(key).filter(|v| !v.is_null())
}

fn string_field(block: &Value, key: &'static str) -> Result<Option<String>, JobFieldError> {
    match present(block, key) {
        None => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(invalid(key, "a string", other)),
    }
}

fn int_field<N: TryFrom<i64>>(
    block: &Value,
    key: &'static str,
) -> Result<Option<N>, JobFieldError> {
    match present(block, key) {
        None => Ok(None),
        Some(value) => value
            .as_i64()
            .and_then(|n| N::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| invalid(key, "an integer in range", value)),
    }
}

fn bool_field(block: &Value, key: &'static str) -> Result<Option<bool>, JobFieldError> {
    match present(block, key) {
        None => Ok(None),
        Some(value) => value
            .as_bool()
            .map(Some)
            .ok_or_else(|| invalid(key, "a boolean", value)),
    }
}

fn ttl_field(block: &Value) -> Result<Option<i32>, JobFieldError> {
    const KEY: &str = "ttl_seconds_after_finished";
    match present(block, KEY) {
        None => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i32>()
            .map(Some)
            .map_err(|_| invalid(KEY, "an integer string", &Value::String(s.clone()))),
        Some(_) => int_field(block, KEY),
    }
}

fn decoded_field<T: DeserializeOwned>(
    block: &Value,
    key: &'static str,
) -> Result<Option<T>, JobFieldError> {
    present(block, key)
        .map(|value| serde_json::from_value(value.clone()))
        .transpose()
        .map_err(|source| JobFieldError::Decode { key, source })
}

fn invalid(key: &'static str, expected: &'static str, value: &Value) -> JobFieldError {
    JobFieldError::InvalidField {
        key,
        expected,
        value: value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kubernetes_objects::job_ref::JobRef;
    use crate::kubernetes_objects::job_store::fake::job_with_conditions;

    fn job_with(conditions: &[(&str, &str)]) -> Job {
        job_with_conditions(&JobRef::new("batch", "pi"), conditions)
    }

    #[test]
    fn test_terminal_condition() {
        assert_eq!(terminal_condition(&Job::default()), None);
        assert_eq!(terminal_condition(&job_with(&[("Complete", "False")])), None);
        assert_eq!(
            terminal_condition(&job_with(&[("SuccessCriteriaMet", "True"), ("Complete", "True")])),
            Some(JobOutcome::Complete)
        );
        assert_eq!(
            terminal_condition(&job_with(&[("Complete", "Unknown"), ("Failed", "True")])),
            Some(JobOutcome::Failed)
        );
        assert_eq!(
            terminal_condition(&job_with(&[("Failed", "True"), ("Complete", "True")])),
            Some(JobOutcome::Failed)
        );
    }

    #[test]
    fn test_ttl_or_zero() {
        assert_eq!(ttl_or_zero(None), 0);
        assert_eq!(ttl_or_zero(Some(&json!(""))), 0);
        assert_eq!(ttl_or_zero(Some(&json!("abc"))), 0);
        assert_eq!(ttl_or_zero(Some(&json!("30"))), 30);
        assert_eq!(ttl_or_zero(Some(&json!("-1"))), -1);
        assert_eq!(ttl_or_zero(Some(&json!(45))), 45);
    }

    #[test]
    fn test_expand_spec() {
        let block = json!({
            "backoff_limit": 2,
            "manual_selector": false,
            "ttl_seconds_after_finished": "30",
            "template": {
                "spec": {
                    "restartPolicy": "Never",
                    "containers": [{ "name": "pi", "image": "perl:5.34" }]
                }
            }
        });

        let spec = expand_spec(Some(&block)).unwrap();

        assert_eq!(spec.backoff_limit, Some(2));
        assert_eq!(spec.manual_selector, Some(false));
        assert_eq!(spec.ttl_seconds_after_finished, Some(30));
        assert_eq!(spec.parallelism, None);
        let pod = spec.template.spec.unwrap();
        assert_eq!(pod.restart_policy.as_deref(), Some("Never"));
        assert_eq!(pod.containers[0].image.as_deref(), Some("perl:5.34"));
    }

    #[test]
    fn test_expand_spec_rejects_bad_ttl() {
        let block = json!({ "ttl_seconds_after_finished": "soon" });

        let err = expand_spec(Some(&block)).unwrap_err();

        assert!(matches!(
            err,
            JobFieldError::InvalidField {
                key: "ttl_seconds_after_finished",
                ..
            }
        ));
    }

    #[test]
    fn test_expand_spec_integer_widths() {
        let block = json!({
            "active_deadline_seconds": 4_000_000_000_i64,
            "parallelism": 3,
        });

        let spec = expand_spec(Some(&block)).unwrap();

        assert_eq!(spec.active_deadline_seconds, Some(4_000_000_000));
        assert_eq!(spec.parallelism, Some(3));

        let block = json!({ "parallelism": 4_000_000_000_i64 });
        let err = expand_spec(Some(&block)).unwrap_err();
        assert!(matches!(
            err,
            JobFieldError::InvalidField {
                key: "parallelism",
                ..
            }
        ));
    }

    #[test]
    fn test_expand_metadata_defaults_namespace() {
        let meta = expand_metadata(Some(&json!({
            "generate_name": "migrate-",
            "labels": { "app": "migrate" }
        })))
        .unwrap();

        assert_eq!(meta.namespace.as_deref(), Some(DEFAULT_NAMESPACE));
        assert_eq!(meta.name, None);
        assert_eq!(meta.generate_name.as_deref(), Some("migrate-"));
        assert_eq!(meta.labels.unwrap()["app"], "migrate");
    }

    #[test]
    fn test_flatten_spec_keeps_configured_template() {
        let spec = JobSpec {
            backoff_limit: Some(6),
            ttl_seconds_after_finished: Some(30),
            ..Default::default()
        };
        let configured = json!({ "spec": { "restartPolicy": "Never" } });

        let flattened = flatten_spec(&spec, Some(&configured)).unwrap();

        assert_eq!(flattened[0]["backoff_limit"], json!(6));
        assert_eq!(flattened[0]["ttl_seconds_after_finished"], json!("30"));
        assert_eq!(flattened[0]["template"], configured);
        assert!(flattened[0].get("parallelism").is_none());
    }

    #[test]
    fn test_remove_generated_labels() {
        let mut labels = Some(BTreeMap::from([
            ("app".to_string(), "migrate".to_string()),
            ("controller-uid".to_string(), "1234".to_string()),
            ("batch.kubernetes.io/job-name".to_string(), "migrate".to_string()),
        ]));

        remove_generated_labels(&mut labels);

        assert_eq!(
            labels,
            Some(BTreeMap::from([("app".to_string(), "migrate".to_string())]))
        );
    }
}
