//! Dynamic object model.
//!
//! Objects are schemaless: a kind tag, standard metadata, and an arbitrary
//! JSON payload. The kind tag replaces runtime type inference; every caller
//! that hands an object to a client must have the kind set.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Namespace-qualified object name.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NamespacedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Standard object metadata carried by every stored object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub resource_version: String,
    /// RFC 3339; empty when the object has not been persisted yet.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub creation_timestamp: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// A schemaless object: kind + metadata + everything else.
///
/// The flattened `content` holds whatever the object's schema defines (spec,
/// status, ...); the core never interprets it beyond diffing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamicObject {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(flatten)]
    pub content: Map<String, Value>,
}

impl DynamicObject {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    pub fn named(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let mut obj = Self::new(kind);
        obj.metadata.namespace = namespace.into();
        obj.metadata.name = name.into();
        obj
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn uid(&self) -> &str {
        &self.metadata.uid
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    pub fn namespaced_name(&self) -> NamespacedName {
        NamespacedName::new(self.metadata.namespace.clone(), self.metadata.name.clone())
    }

    pub fn resource_version(&self) -> &str {
        &self.metadata.resource_version
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.metadata.labels
    }

    pub fn labels_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.metadata.labels
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.metadata.labels.get(key).map(String::as_str)
    }

    pub fn set_labels(&mut self, labels: BTreeMap<String, String>) {
        self.metadata.labels = labels;
    }

    pub fn creation_timestamp(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::parse(&self.metadata.creation_timestamp, &Rfc3339).ok()
    }

    pub fn set_creation_timestamp(&mut self, at: OffsetDateTime) {
        self.metadata.creation_timestamp = at
            .format(&Rfc3339)
            .expect("RFC 3339 formatting of a valid timestamp");
    }
}

/// Container for LIST results. Carries its element kind explicitly so list
/// dispatch never has to guess.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectList {
    kind: String,
    pub items: Vec<DynamicObject>,
}

impl ObjectList {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            items: Vec::new(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }
}

/// UID prefix up to the first dash, for compact display.
pub fn short_uid(s: &str) -> &str {
    match s.find('-') {
        Some(idx) => &s[..idx],
        None => s,
    }
}
