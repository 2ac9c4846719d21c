use std::collections::BTreeSet;
use std::time::Duration;

use json_patch::jsonptr::index::Index;
use json_patch::jsonptr::PointerBuf;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::timeouts::{Operation, OperationTimeouts};

static NULL: Value = Value::Null;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigPathError {
    #[error("Path '{0}' does not address a value in the configuration tree")]
    InvalidPath(String),

    #[error("ForceNew: no changes for '{0}'")]
    NoChange(String),
}

/// Change-tracking configuration store handed to every lifecycle operation.
///
/// Keys are dotted paths such as `spec.0.ttl_seconds_after_finished`, where numeric
/// segments index lists. Reads see the desired configuration; `get_change` pairs it
/// with the previously recorded one.
pub trait ConfigStore {
    /// Recorded identifier, `None` until the object was created.
    fn id(&self) -> Option<&str>;

    fn set_id(&mut self, id: Option<String>);

    fn get(&self, key: &str) -> Option<&Value>;

    /// Like `get`, but treats zero values (`null`, `""`, `false`, `0`, empty
    /// collections) as unset.
    fn get_ok(&self, key: &str) -> Option<&Value> {
        self.get(key).filter(|value| !is_zero_value(value))
    }

    /// `(recorded, desired)` values of `key`.
    fn get_change(&self, key: &str) -> (Option<&Value>, Option<&Value>);

    fn has_change(&self, key: &str) -> bool {
        let (old, new) = self.get_change(key);
        old.unwrap_or(&NULL) != new.unwrap_or(&NULL)
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), ConfigPathError>;

    /// Marks a changed key as requiring the object to be destroyed and recreated.
    fn force_new(&mut self, key: &str) -> Result<(), ConfigPathError>;

    /// Drops every planned change under `key`.
    fn clear(&mut self, key: &str) -> Result<(), ConfigPathError>;

    fn timeout(&self, operation: Operation) -> Duration;
}

pub(crate) fn is_zero_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// In-memory [`ConfigStore`] over a recorded and a desired JSON tree.
#[derive(Debug, Clone, Default)]
pub struct ConfigTree {
    id: Option<String>,
    recorded: Value,
    desired: Value,
    forced_new: BTreeSet<String>,
    cleared: BTreeSet<String>,
    timeouts: OperationTimeouts,
}

impl ConfigTree {
    pub fn new(id: Option<String>, recorded: Value, desired: Value) -> Self {
        ConfigTree {
            id,
            recorded,
            desired,
            ..Default::default()
        }
    }

    /// A tree without pending changes, as used by refresh and destroy.
    pub fn from_recorded(id: Option<String>, recorded: Value) -> Self {
        ConfigTree::new(id, recorded.clone(), recorded)
    }

    pub fn with_timeouts(mut self, timeouts: OperationTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Fills server-computed `paths` missing from the desired tree with their recorded value.
    ///
    /// A path is only filled when its parent block exists in the desired tree.
    pub fn carry_computed(&mut self, paths: &[&str]) -> Result<(), ConfigPathError> {
        for path in paths {
            let parent_present = match path.rsplit_once('.') {
                Some((parent, _)) => lookup(&self.desired, parent).is_some_and(|v| !v.is_null()),
                None => true,
            };
            let desired_missing = lookup(&self.desired, path).is_none_or(Value::is_null);
            if !parent_present || !desired_missing {
                continue;
            }
            if let Some(recorded) = lookup(&self.recorded, path)
                .filter(|v| !v.is_null())
                .cloned()
            {
                *slot_mut(&mut self.desired, path)? = recorded;
            }
        }
        Ok(())
    }

    pub fn requires_new(&self) -> bool {
        !self.forced_new.is_empty()
    }

    pub fn forced_new(&self) -> impl Iterator<Item = &str> {
        self.forced_new.iter().map(String::as_str)
    }

    pub fn cleared(&self) -> impl Iterator<Item = &str> {
        self.cleared.iter().map(String::as_str)
    }

    /// Keys among `roots` whose desired value differs from the recorded one.
    pub fn changed<'a>(&self, roots: &[&'a str]) -> Vec<&'a str> {
        roots
            .iter()
            .copied()
            .filter(|root| self.has_change(root))
            .collect()
    }

    /// Forgets the recorded object so the desired tree is applied from scratch.
    pub fn start_replacement(&mut self) {
        self.id = None;
        self.recorded = Value::Null;
        self.forced_new.clear();
        self.cleared.clear();
    }

    pub fn into_recorded(self) -> (Option<String>, Value) {
        (self.id, self.desired)
    }
}

impl ConfigStore for ConfigTree {
    fn id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn get(&self, key: &str) -> Option<&Value> {
        lookup(&self.desired, key)
    }

    fn get_change(&self, key: &str) -> (Option<&Value>, Option<&Value>) {
        (lookup(&self.recorded, key), lookup(&self.desired, key))
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), ConfigPathError> {
        *slot_mut(&mut self.desired, key)? = value;
        Ok(())
    }

    fn force_new(&mut self, key: &str) -> Result<(), ConfigPathError> {
        if !self.has_change(key) {
            return Err(ConfigPathError::NoChange(key.to_string()));
        }
        self.forced_new.insert(key.to_string());
        Ok(())
    }

    fn clear(&mut self, key: &str) -> Result<(), ConfigPathError> {
        match lookup(&self.recorded, key).cloned() {
            Some(recorded) => *slot_mut(&mut self.desired, key)? = recorded,
            None => {
                if lookup(&self.desired, key).is_some() {
                    *slot_mut(&mut self.desired, key)? = Value::Null;
                }
            }
        }
        self.forced_new
            .retain(|forced| forced != key && !forced.starts_with(&format!("{key}.")));
        self.cleared.insert(key.to_string());
        Ok(())
    }

    fn timeout(&self, operation: Operation) -> Duration {
        self.timeouts.for_operation(operation)
    }
}

/// JSON pointer addressing a dotted key. The empty key addresses the root.
fn pointer(key: &str) -> PointerBuf {
    if key.is_empty() {
        PointerBuf::new()
    } else {
        PointerBuf::from_tokens(key.split('.'))
    }
}

fn lookup<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    root.pointer(pointer(key).as_str())
}

/// Mutable slot for `key`, creating intermediate objects and lists on the way.
fn slot_mut<'a>(root: &'a mut Value, key: &str) -> Result<&'a mut Value, ConfigPathError> {
    let invalid = || ConfigPathError::InvalidPath(key.to_string());
    let path = pointer(key);
    let mut node = root;
    for token in path.tokens() {
        if node.is_null() {
            *node = match token.to_index() {
                Ok(_) => Value::Array(Vec::new()),
                Err(_) => Value::Object(Map::new()),
            };
        }
        node = match node {
            Value::Object(map) => map.entry(token.decoded().into_owned()).or_insert(Value::Null),
            Value::Array(items) => {
                let index = match token.to_index().map_err(|_| invalid())? {
                    Index::Num(index) => index,
                    Index::Next => items.len(),
                };
                if index == items.len() {
                    items.push(Value::Null);
                }
                items.get_mut(index).ok_or_else(invalid)?
            }
            _ => return Err(invalid()),
        };
    }
    Ok(node)
}
