use std::collections::BTreeMap;

use json_patch::jsonptr::PointerBuf;
use json_patch::{AddOperation, PatchOperation, RemoveOperation, ReplaceOperation};
use serde_json::Value;

use super::data::ConfigStore;

/// Mutable spec fields and the JSON pointer tokens they patch.
const MUTABLE_SPEC_FIELDS: [(&str, &str); 4] = [
    ("active_deadline_seconds", "activeDeadlineSeconds"),
    ("backoff_limit", "backoffLimit"),
    ("manual_selector", "manualSelector"),
    ("parallelism", "parallelism"),
];

const STRING_MAPS: [&str; 2] = ["labels", "annotations"];

/// Label and annotation changes as JSON patch operations against `/metadata`.
pub(super) fn metadata_patch<C: ConfigStore>(
    config: &C,
) -> Result<Vec<PatchOperation>, serde_json::Error> {
    let mut ops = Vec::new();
    for field in STRING_MAPS {
        let key = format!("metadata.0.{field}");
        if !config.has_change(&key) {
            continue;
        }
        let (old, new) = config.get_change(&key);
        ops.extend(diff_string_map(
            pointer(&["metadata", field]),
            string_map(old)?,
            string_map(new)?,
        ));
    }
    Ok(ops)
}

/// Operations for the changed mutable spec fields. Unset fields are removed.
pub(super) fn spec_patch<C: ConfigStore>(config: &C) -> Vec<PatchOperation> {
    MUTABLE_SPEC_FIELDS
        .iter()
        .filter_map(|(field, token)| {
            let key = format!("spec.0.{field}");
            if !config.has_change(&key) {
                return None;
            }
            let path = pointer(&["spec", token]);
            Some(match config.get(&key).filter(|v| !v.is_null()) {
                Some(value) => PatchOperation::Add(AddOperation {
                    path,
                    value: value.clone(),
                }),
                None => PatchOperation::Remove(RemoveOperation { path }),
            })
        })
        .collect()
}

fn diff_string_map(
    path: PointerBuf,
    old: BTreeMap<String, String>,
    new: BTreeMap<String, String>,
) -> Vec<PatchOperation> {
    if old.is_empty() {
        return vec![PatchOperation::Add(AddOperation {
            path,
            value: Value::Object(
                new.into_iter()
                    .map(|(key, value)| (key, Value::String(value)))
                    .collect(),
            ),
        })];
    }

    let mut ops: Vec<PatchOperation> = old
        .keys()
        .filter(|key| !new.contains_key(*key))
        .map(|key| {
            PatchOperation::Remove(RemoveOperation {
                path: child(&path, key),
            })
        })
        .collect();

    for (key, value) in new {
        let op = match old.get(&key) {
            Some(previous) if *previous == value => continue,
            Some(_) => PatchOperation::Replace(ReplaceOperation {
                path: child(&path, &key),
                value: Value::String(value),
            }),
            None => PatchOperation::Add(AddOperation {
                path: child(&path, &key),
                value: Value::String(value),
            }),
        };
        ops.push(op);
    }
    ops
}

fn string_map(value: Option<&Value>) -> Result<BTreeMap<String, String>, serde_json::Error> {
    match value {
        None | Some(Value::Null) => Ok(BTreeMap::new()),
        Some(value) => serde_json::from_value(value.clone()),
    }
}

fn pointer(tokens: &[&str]) -> PointerBuf {
    PointerBuf::from_tokens(tokens.iter().copied())
}

fn child(parent: &PointerBuf, key: &str) -> PointerBuf {
    let mut path = parent.clone();
    path.push_back(key);
    path
}
