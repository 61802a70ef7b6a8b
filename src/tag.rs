//! Causal label vocabulary and log-stream markers.
//!
//! Every object that passes through the instrumentation client carries labels
//! under the `discrete.events/` prefix, plus the webhook-stamped `tracey-uid`.
//! The two instrumented log streams are identified by a logger-name token and
//! a `LogType` marker so external shippers can filter them back out.

use std::collections::BTreeMap;

use thiserror::Error;
use uuid::Uuid;

use crate::object::DynamicObject;

/// Set by the admission webhook only, on externally-introduced objects.
pub const WEBHOOK_LABEL: &str = "tracey-uid";

/// The reconcile invocation in which the object was last written.
pub const RECONCILE_ID_LABEL: &str = "discrete.events/prev-write-reconcile-id";

/// The controller that acted upon the object.
pub const CREATOR_ID_LABEL: &str = "discrete.events/creator-id";

/// The root event that caused the object to be acted upon. The value
/// originates from a `tracey-uid` but travels under this name when propagated.
pub const ROOT_EVENT_ID_LABEL: &str = "discrete.events/root-event-id";

/// Fresh per-mutation identifier naming the logical change that produced the
/// object's current value.
pub const CHANGE_ID_LABEL: &str = "discrete.events/change-id";

pub const LOGGER_NAME: &str = "sleeve";
pub const CONTROLLER_OPERATION_KEY: &str = "sleeve:controller-operation";
pub const OBJECT_VERSION_KEY: &str = "sleeve:object-version";

/// The `LogType` marker as it appears on an instrumented log line.
pub fn log_marker(log_type: &str) -> String {
    format!("{{\"LogType\": \"{log_type}\"}}")
}

/// Removes any instrumented-stream marker from a line, leaving the payload.
pub fn strip_log_key(line: &str) -> String {
    line.replace(&log_marker(CONTROLLER_OPERATION_KEY), "")
        .replace(&log_marker(OBJECT_VERSION_KEY), "")
}

/// Stamps a fresh change-id on the object to associate its current value with
/// the change event that produced it.
pub fn label_change(obj: &mut DynamicObject) {
    obj.labels_mut()
        .insert(CHANGE_ID_LABEL.to_string(), Uuid::new_v4().to_string());
}

/// A label map carrying only a fresh change-id.
pub fn change_label() -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(CHANGE_ID_LABEL.to_string(), Uuid::new_v4().to_string());
    labels
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("labeling assumptions violated: tracey-uid={webhook}, root-event-id={root}")]
pub struct LabelViolation {
    pub webhook: String,
    pub root: String,
}

/// When both the webhook label and the propagated root label are present they
/// must agree.
pub fn sanity_check_labels(obj: &DynamicObject) -> Result<(), LabelViolation> {
    let labels = obj.labels();
    if let (Some(webhook), Some(root)) = (labels.get(WEBHOOK_LABEL), labels.get(ROOT_EVENT_ID_LABEL))
    {
        if webhook != root {
            return Err(LabelViolation {
                webhook: webhook.clone(),
                root: root.clone(),
            });
        }
    }
    Ok(())
}
