//! Object snapshots: full serialized versions of objects as they appear in
//! the trace's object-version stream.

mod delta;

pub use delta::{compute_delta, Delta, DeltaError};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::{BufRead, BufReader, Read};

use serde::{Deserialize, Serialize};

use crate::object::{short_uid, DynamicObject};

/// Identity of an object at store-version granularity.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionKey {
    pub kind: String,
    pub object_id: String,
    pub version: String,
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.kind, self.object_id, self.version)
    }
}

/// A snapshot of an object at a version. `value` is the full serialized
/// object, nested JSON-in-JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub object_id: String,
    pub kind: String,
    pub version: String,
    pub value: String,
}

impl Record {
    pub fn from_object(obj: &DynamicObject) -> Self {
        Self {
            object_id: obj.uid().to_string(),
            kind: obj.kind().to_string(),
            version: obj.resource_version().to_string(),
            value: serde_json::to_string(obj).expect("object serializes"),
        }
    }

    pub fn to_object(&self) -> Result<DynamicObject, serde_json::Error> {
        serde_json::from_str(&self.value)
    }

    pub fn version_key(&self) -> VersionKey {
        VersionKey {
            kind: self.kind.clone(),
            object_id: self.object_id.clone(),
            version: self.version.clone(),
        }
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("record serializes")
    }

    /// Compact display identity, shortening the UID to its first segment.
    pub fn display_id(&self) -> String {
        format!(
            "{}:{}@{}",
            self.kind,
            short_uid(&self.object_id),
            self.version
        )
    }
}

/// Loads one record per line, dropping duplicate (kind, object, version)
/// triples.
pub fn read_records<R: Read>(reader: R) -> Result<Vec<Record>, std::io::Error> {
    let mut seen = BTreeSet::new();
    let mut records = Vec::new();
    for line in BufReader::new(reader).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = Record::from_json(&line)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        if seen.insert(record.version_key()) {
            records.push(record);
        }
    }
    Ok(records)
}

/// Partitions records per object id, preserving first-seen order and dropping
/// duplicate versions.
pub fn group_by_object(records: &[Record]) -> BTreeMap<String, Vec<Record>> {
    let mut seen = BTreeSet::new();
    let mut groups: BTreeMap<String, Vec<Record>> = BTreeMap::new();
    for r in records {
        if !seen.insert(r.version_key()) {
            continue;
        }
        groups.entry(r.object_id.clone()).or_default().push(r.clone());
    }
    groups
}
