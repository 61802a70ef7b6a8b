//! The hydrated object store: every snapshot in the trace, indexed twice.
//!
//! The VersionKey index serves raw frame hydration and read-event integrity
//! checks; the CausalKey index serves causal analysis. Read-only once the
//! trace is parsed.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::debug;

use crate::event::{object_change_id, CausalKey};
use crate::object::DynamicObject;
use crate::snapshot::{Record, VersionKey};

use super::builder::TraceError;

#[derive(Debug, Default)]
pub struct ReplayStore {
    by_version: HashMap<VersionKey, Arc<DynamicObject>>,
    by_causal: HashMap<CausalKey, Arc<DynamicObject>>,
    observations: usize,
}

impl ReplayStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, record: &Record) -> Result<(), TraceError> {
        let obj = record.to_object().map_err(|source| TraceError::RecordValue {
            key: record.version_key(),
            source,
        })?;
        let obj = Arc::new(obj);
        self.observations += 1;
        self.by_version.insert(record.version_key(), Arc::clone(&obj));
        match object_change_id(&obj) {
            Some(change_id) => {
                let key = CausalKey {
                    kind: obj.kind().to_string(),
                    object_id: obj.uid().to_string(),
                    version: change_id,
                };
                self.by_causal.insert(key, obj);
            }
            None => {
                debug!(
                    target: "sleeve",
                    key = %record.version_key(),
                    "record has no causal id; causal index skips it"
                );
            }
        }
        Ok(())
    }

    pub fn lookup(&self, key: &CausalKey) -> Option<&Arc<DynamicObject>> {
        self.by_causal.get(key)
    }

    pub fn get_version(&self, key: &VersionKey) -> Option<&Arc<DynamicObject>> {
        self.by_version.get(key)
    }

    pub fn has_version(&self, key: &VersionKey) -> bool {
        self.by_version.contains_key(key)
    }

    /// All hydrated versions of a kind, sorted by resource version.
    pub fn all_of_kind(&self, kind: &str) -> Vec<Arc<DynamicObject>> {
        let mut objs: Vec<Arc<DynamicObject>> = self
            .by_version
            .values()
            .filter(|obj| obj.kind() == kind)
            .cloned()
            .collect();
        objs.sort_by(|a, b| a.resource_version().cmp(b.resource_version()));
        objs
    }

    /// Every CausalKey of a kind known to the trace.
    pub fn causal_keys_of_kind(&self, kind: &str) -> BTreeSet<CausalKey> {
        self.by_causal
            .keys()
            .filter(|key| key.kind == kind)
            .cloned()
            .collect()
    }

    pub fn kinds(&self) -> BTreeSet<String> {
        self.by_version
            .values()
            .map(|obj| obj.kind().to_string())
            .collect()
    }

    /// Total snapshot observations added, duplicates included.
    pub fn observations(&self) -> usize {
        self.observations
    }

    /// Unique object versions after hydration.
    pub fn unique_versions(&self) -> usize {
        self.by_version.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag;

    fn record(uid: &str, version: &str, change_id: Option<&str>) -> Record {
        let mut obj = DynamicObject::named("Widget", "default", uid);
        obj.metadata.uid = uid.to_string();
        obj.metadata.resource_version = version.to_string();
        if let Some(cid) = change_id {
            obj.labels_mut()
                .insert(tag::CHANGE_ID_LABEL.to_string(), cid.to_string());
        }
        Record::from_object(&obj)
    }

    #[test]
    fn add_indexes_by_version_and_causal_key() {
        let mut store = ReplayStore::new();
        store.add(&record("uid-1", "1", Some("c1"))).unwrap();

        let vkey = VersionKey {
            kind: "Widget".to_string(),
            object_id: "uid-1".to_string(),
            version: "1".to_string(),
        };
        assert!(store.has_version(&vkey));

        let ckey = CausalKey {
            kind: "Widget".to_string(),
            object_id: "uid-1".to_string(),
            version: crate::event::ChangeId::new("c1"),
        };
        assert!(store.lookup(&ckey).is_some());
    }

    #[test]
    fn unlabeled_records_skip_the_causal_index() {
        let mut store = ReplayStore::new();
        store.add(&record("uid-1", "1", None)).unwrap();
        assert_eq!(store.unique_versions(), 1);
        assert!(store.causal_keys_of_kind("Widget").is_empty());
    }

    #[test]
    fn all_of_kind_sorts_by_resource_version() {
        let mut store = ReplayStore::new();
        store.add(&record("uid-1", "3", Some("c3"))).unwrap();
        store.add(&record("uid-1", "1", Some("c1"))).unwrap();
        store.add(&record("uid-1", "2", Some("c2"))).unwrap();

        let versions: Vec<String> = store
            .all_of_kind("Widget")
            .iter()
            .map(|o| o.resource_version().to_string())
            .collect();
        assert_eq!(versions, vec!["1", "2", "3"]);
    }
}
