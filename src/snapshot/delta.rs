//! Field-level diffing between object versions.
//!
//! A diff between two versions is a collection of [`Delta`]s, one per leaf
//! path that changed. Store-managed noise fields and the instrumentation's
//! own labels are excluded so diffs reflect controller-visible change only.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::object::DynamicObject;
use crate::snapshot::Record;
use crate::tag;

/// A change at one path between two versions of an object.
#[derive(Clone, Debug, PartialEq)]
pub struct Delta {
    path: String,
    prev: Option<Value>,
    curr: Option<Value>,
}

impl Delta {
    pub fn new(path: impl Into<String>, prev: Option<Value>, curr: Option<Value>) -> Self {
        Self {
            path: path.into(),
            prev,
            curr,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn prev(&self) -> Option<&Value> {
        self.prev.as_ref()
    }

    pub fn curr(&self) -> Option<&Value> {
        self.curr.as_ref()
    }

    /// Two deltas eliminate each other when they touch the same path and one
    /// undoes the other: this delta's prev equals the other's curr, or this
    /// delta's curr equals the other's prev.
    pub fn eliminates(&self, other: &Delta) -> bool {
        self.path == other.path && (self.prev == other.curr || self.curr == other.prev)
    }
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let render = |v: &Option<Value>| match v {
            Some(v) => v.to_string(),
            None => "null".to_string(),
        };
        write!(
            f,
            "{}:\n\t-: {}\n\t+: {}",
            self.path,
            render(&self.prev),
            render(&self.curr)
        )
    }
}

// Store-managed churn plus our own labels; neither is controller-visible
// change.
const IGNORED_FIELDS: &[&str] = &[
    "resourceVersion",
    "managedFields",
    "generation",
    "observedGeneration",
    tag::CHANGE_ID_LABEL,
    tag::CREATOR_ID_LABEL,
    tag::ROOT_EVENT_ID_LABEL,
    tag::RECONCILE_ID_LABEL,
];

fn is_ignored(key: &str) -> bool {
    IGNORED_FIELDS.contains(&key)
}

/// Computes the field-level deltas between two versions of an object.
pub fn compute_delta(prev: &DynamicObject, curr: &DynamicObject) -> Vec<Delta> {
    let prev = serde_json::to_value(prev).expect("object serializes");
    let curr = serde_json::to_value(curr).expect("object serializes");
    let mut deltas = Vec::new();
    diff_value("", Some(&prev), Some(&curr), &mut deltas);
    deltas
}

fn diff_value(path: &str, prev: Option<&Value>, curr: Option<&Value>, out: &mut Vec<Delta>) {
    match (prev, curr) {
        (Some(Value::Object(a)), Some(Value::Object(b))) => {
            let keys: std::collections::BTreeSet<&String> = a.keys().chain(b.keys()).collect();
            for key in keys {
                if is_ignored(key) {
                    continue;
                }
                let child = if path.is_empty() {
                    key.to_string()
                } else {
                    format!("{path}.{key}")
                };
                diff_value(&child, a.get(key.as_str()), b.get(key.as_str()), out);
            }
        }
        (Some(Value::Array(a)), Some(Value::Array(b))) => {
            let len = a.len().max(b.len());
            for i in 0..len {
                let child = format!("{path}[{i}]");
                diff_value(&child, a.get(i), b.get(i), out);
            }
        }
        (p, c) if p == c => {}
        (p, c) => out.push(Delta::new(path, p.cloned(), c.cloned())),
    }
}

#[derive(Debug, Error)]
pub enum DeltaError {
    #[error("cannot diff records with different kinds or object ids")]
    Mismatched,
    #[error("record value: {0}")]
    Value(#[from] serde_json::Error),
}

impl Record {
    /// Renders the field-level diff from this record's version to `other`'s.
    pub fn diff(&self, other: &Record) -> Result<String, DeltaError> {
        if self.kind != other.kind || self.object_id != other.object_id {
            return Err(DeltaError::Mismatched);
        }
        let prev = self.to_object()?;
        let curr = other.to_object()?;
        let deltas = compute_delta(&prev, &curr);
        let body = deltas
            .iter()
            .map(Delta::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        Ok(format!(
            "{}/{}\n\t- currVersion: {}\n\t- prevVersion: {}\nDeltas:\n{}",
            self.kind, self.object_id, other.version, self.version, body
        ))
    }
}
