//! Execution predicates: latching detectors over written objects.
//!
//! A predicate names a desired outcome of an execution; the recorder
//! evaluates it against every object written during replay, and once it
//! returns true it stays satisfied for the rest of the run.

use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;

use crate::object::DynamicObject;

/// A boolean property of an object in an execution trace.
pub type Predicate = Box<dyn Fn(&DynamicObject) -> bool + Send + Sync>;

pub(crate) struct ExecutionPredicate {
    evaluate: Predicate,
    satisfied: AtomicBool,
}

impl std::fmt::Debug for ExecutionPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionPredicate")
            .field("satisfied", &self.satisfied())
            .finish()
    }
}

impl ExecutionPredicate {
    pub(crate) fn new(evaluate: Predicate) -> Self {
        Self {
            evaluate,
            satisfied: AtomicBool::new(false),
        }
    }

    pub(crate) fn check(&self, obj: &DynamicObject) {
        if (self.evaluate)(obj) {
            self.satisfied.store(true, Ordering::Relaxed);
        }
    }

    pub(crate) fn satisfied(&self) -> bool {
        self.satisfied.load(Ordering::Relaxed)
    }
}

/// True when the object's `status.conditions` holds an entry with the given
/// type and status.
pub fn condition_predicate(
    condition_type: impl Into<String>,
    condition_status: impl Into<String>,
) -> Predicate {
    let condition_type = condition_type.into();
    let condition_status = condition_status.into();
    Box::new(move |obj: &DynamicObject| {
        let Some(conditions) = obj
            .content
            .get("status")
            .and_then(|s| s.get("conditions"))
            .and_then(Value::as_array)
        else {
            return false;
        };
        conditions.iter().any(|c| {
            c.get("type").and_then(Value::as_str) == Some(condition_type.as_str())
                && c.get("status").and_then(Value::as_str) == Some(condition_status.as_str())
        })
    })
}
