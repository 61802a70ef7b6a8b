//! Controller operation events and their causal identity.
//!
//! Events serialize with labels lifted to top-level `label:<name>` JSON keys
//! in sorted order; parsing reverses the transform. The round trip is exact.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;
use time::OffsetDateTime;

use crate::object::DynamicObject;
use crate::snapshot::VersionKey;
use crate::tag;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpType {
    Init,
    Get,
    List,
    Create,
    Update,
    Delete,
    Patch,
}

impl OpType {
    pub fn as_str(self) -> &'static str {
        match self {
            OpType::Init => "INIT",
            OpType::Get => "GET",
            OpType::List => "LIST",
            OpType::Create => "CREATE",
            OpType::Update => "UPDATE",
            OpType::Delete => "DELETE",
            OpType::Patch => "PATCH",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "INIT" => Some(OpType::Init),
            "GET" => Some(OpType::Get),
            "LIST" => Some(OpType::List),
            "CREATE" => Some(OpType::Create),
            "UPDATE" => Some(OpType::Update),
            "DELETE" => Some(OpType::Delete),
            "PATCH" => Some(OpType::Patch),
            _ => None,
        }
    }

    pub fn is_read(self) -> bool {
        matches!(self, OpType::Get | OpType::List)
    }

    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            OpType::Create | OpType::Update | OpType::Delete | OpType::Patch
        )
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `discrete.events/change-id` label value: one logical change event.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChangeId(String);

impl ChangeId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of an object at logical-change granularity. The version is the
/// change-id label, not the store's resource version, which lets causal
/// analysis ignore version churn produced by non-instrumented actors.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CausalKey {
    pub kind: String,
    pub object_id: String,
    pub version: ChangeId,
}

impl fmt::Display for CausalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.kind, self.object_id, self.version)
    }
}

/// One controller operation as it appears in the trace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    /// Epoch milliseconds as a string; string order is chronological order.
    pub timestamp: String,
    pub reconcile_id: String,
    pub controller_id: String,
    pub root_event_id: String,
    pub op_type: OpType,
    pub kind: String,
    pub object_id: String,
    pub version: String,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Error)]
pub enum EventParseError {
    #[error("malformed event json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("event field {0} missing or not a string")]
    Field(&'static str),
    #[error("unknown op type: {0}")]
    OpType(String),
}

impl Event {
    /// Builds an event describing an operation on `obj` as currently labeled.
    pub fn for_object(
        obj: &DynamicObject,
        reconcile_id: &str,
        controller_id: &str,
        root_event_id: &str,
        op_type: OpType,
    ) -> Self {
        Self {
            timestamp: now_millis(),
            reconcile_id: reconcile_id.to_string(),
            controller_id: controller_id.to_string(),
            root_event_id: root_event_id.to_string(),
            op_type,
            kind: obj.kind().to_string(),
            object_id: obj.uid().to_string(),
            version: obj.resource_version().to_string(),
            labels: obj.labels().clone(),
        }
    }

    /// The change-id this event observed, derived from the event's labels by
    /// the causal fallback chain: change-id, then the webhook stamp, then the
    /// propagated root id. Empty when none are present.
    pub fn change_id(&self) -> ChangeId {
        for key in [
            tag::CHANGE_ID_LABEL,
            tag::WEBHOOK_LABEL,
            tag::ROOT_EVENT_ID_LABEL,
        ] {
            if let Some(v) = self.labels.get(key) {
                return ChangeId::new(v.clone());
            }
        }
        ChangeId::default()
    }

    pub fn causal_key(&self) -> CausalKey {
        CausalKey {
            kind: self.kind.clone(),
            object_id: self.object_id.clone(),
            version: self.change_id(),
        }
    }

    /// Store-version identity of the observed object.
    pub fn version_key(&self) -> VersionKey {
        VersionKey {
            kind: self.kind.clone(),
            object_id: self.object_id.clone(),
            version: self.version.clone(),
        }
    }

    pub fn to_json(&self) -> String {
        let mut map = Map::new();
        map.insert("timestamp".into(), Value::String(self.timestamp.clone()));
        map.insert(
            "reconcile_id".into(),
            Value::String(self.reconcile_id.clone()),
        );
        map.insert(
            "controller_id".into(),
            Value::String(self.controller_id.clone()),
        );
        map.insert(
            "root_event_id".into(),
            Value::String(self.root_event_id.clone()),
        );
        map.insert("op_type".into(), Value::String(self.op_type.to_string()));
        map.insert("kind".into(), Value::String(self.kind.clone()));
        map.insert("object_id".into(), Value::String(self.object_id.clone()));
        map.insert("version".into(), Value::String(self.version.clone()));
        for (k, v) in &self.labels {
            map.insert(format!("label:{k}"), Value::String(v.clone()));
        }
        Value::Object(map).to_string()
    }

    pub fn from_json(data: &str) -> Result<Self, EventParseError> {
        let value: Value = serde_json::from_str(data)?;
        let map = value
            .as_object()
            .ok_or(EventParseError::Field("payload"))?;

        let field = |name: &'static str| -> Result<String, EventParseError> {
            map.get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or(EventParseError::Field(name))
        };

        let raw_op = field("op_type")?;
        let op_type = OpType::parse(&raw_op).ok_or(EventParseError::OpType(raw_op))?;

        let mut labels = BTreeMap::new();
        for (key, value) in map {
            if let Some(name) = key.strip_prefix("label:") {
                if let Some(v) = value.as_str() {
                    labels.insert(name.to_string(), v.to_string());
                }
            }
        }

        Ok(Self {
            timestamp: field("timestamp")?,
            reconcile_id: field("reconcile_id")?,
            controller_id: field("controller_id")?,
            root_event_id: field("root_event_id")?,
            op_type,
            kind: field("kind")?,
            object_id: field("object_id")?,
            version: field("version")?,
            labels,
        })
    }
}

/// The change-id of an object, derived from its labels by the same fallback
/// chain events use. `None` when the object carries no causal identity.
pub fn object_change_id(obj: &DynamicObject) -> Option<ChangeId> {
    for key in [
        tag::CHANGE_ID_LABEL,
        tag::WEBHOOK_LABEL,
        tag::ROOT_EVENT_ID_LABEL,
    ] {
        if let Some(v) = obj.label(key) {
            return Some(ChangeId::new(v));
        }
    }
    None
}

/// Partitions events into reads (GET, LIST) and writes (everything else).
pub fn filter_reads_writes(events: &[Event]) -> (Vec<Event>, Vec<Event>) {
    let mut reads = Vec::new();
    let mut writes = Vec::new();
    for e in events {
        if e.op_type.is_read() {
            reads.push(e.clone());
        } else {
            writes.push(e.clone());
        }
    }
    (reads, writes)
}

pub fn earliest(events: &[Event]) -> Option<&Event> {
    events.iter().min_by(|a, b| a.timestamp.cmp(&b.timestamp))
}

pub fn format_millis(t: OffsetDateTime) -> String {
    (t.unix_timestamp_nanos() / 1_000_000).to_string()
}

pub fn now_millis() -> String {
    format_millis(OffsetDateTime::now_utc())
}
