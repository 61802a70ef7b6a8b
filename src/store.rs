//! External contracts: the object-store client, the reconcile entry point,
//! and the per-call trace scope.
//!
//! The instrumentation client decorates a [`StoreClient`]; the replay client
//! implements the same contract backed only by frames. Store errors pass
//! through the instrumentation layer verbatim.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde_json::Value;
use thiserror::Error;

use crate::object::{DynamicObject, NamespacedName, ObjectList};

/// Per-call trace scope. Replaces the ambient call context: the reconcile
/// dispatcher binds the reconcile id before invoking a reconciler, and the
/// replay player binds the frame id before each frame.
#[derive(Clone, Debug, Default)]
pub struct Context {
    reconcile_id: Option<String>,
    frame_id: Option<String>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reconcile_id(mut self, id: impl Into<String>) -> Self {
        self.reconcile_id = Some(id.into());
        self
    }

    pub fn with_frame_id(mut self, id: impl Into<String>) -> Self {
        self.frame_id = Some(id.into());
        self
    }

    pub fn reconcile_id(&self) -> Option<&str> {
        self.reconcile_id.as_deref()
    }

    pub fn frame_id(&self) -> Option<&str> {
        self.frame_id.as_deref()
    }
}

/// A patch payload. The store applies it as a JSON merge patch; the
/// instrumentation layer never inspects it.
#[derive(Clone, Debug, PartialEq)]
pub struct Patch(Value);

impl Patch {
    pub fn merge(value: Value) -> Self {
        Self(value)
    }

    pub fn data(&self) -> &Value {
        &self.0
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: NamespacedName },
    #[error("conflict writing {kind} {name}: {reason}")]
    Conflict {
        kind: String,
        name: NamespacedName,
        reason: String,
    },
    #[error("transport: {0}")]
    Transport(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// CRUD + list + patch + status-subresource writes over dynamic objects.
///
/// GET requires `obj.kind` to be set by the caller; LIST takes its kind from
/// the list container.
pub trait StoreClient {
    fn get(
        &self,
        ctx: &Context,
        key: &NamespacedName,
        obj: &mut DynamicObject,
    ) -> Result<(), StoreError>;

    fn list(&self, ctx: &Context, list: &mut ObjectList) -> Result<(), StoreError>;

    fn create(&self, ctx: &Context, obj: &mut DynamicObject) -> Result<(), StoreError>;

    fn update(&self, ctx: &Context, obj: &mut DynamicObject) -> Result<(), StoreError>;

    fn delete(&self, ctx: &Context, obj: &mut DynamicObject) -> Result<(), StoreError>;

    /// Deletes every object of the prototype's kind.
    fn delete_all_of(&self, ctx: &Context, obj: &mut DynamicObject) -> Result<(), StoreError>;

    fn patch(
        &self,
        ctx: &Context,
        obj: &mut DynamicObject,
        patch: &Patch,
    ) -> Result<(), StoreError>;

    fn update_status(&self, ctx: &Context, obj: &mut DynamicObject) -> Result<(), StoreError>;

    fn patch_status(
        &self,
        ctx: &Context,
        obj: &mut DynamicObject,
        patch: &Patch,
    ) -> Result<(), StoreError>;

    fn create_status(
        &self,
        ctx: &Context,
        obj: &mut DynamicObject,
        sub: &mut DynamicObject,
    ) -> Result<(), StoreError>;
}

/// A reconcile request names the resource to reconcile.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileRequest {
    pub namespaced_name: NamespacedName,
}

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The reconcile entry point driven by the dispatcher during live operation
/// and by the player during replay.
pub trait Reconciler {
    fn reconcile(&mut self, ctx: &Context, req: &ReconcileRequest) -> Result<(), BoxError>;
}

/// In-memory [`StoreClient`]: the reference backend for tests and demos.
///
/// Assigns UIDs and monotonically increasing resource versions the way a real
/// store would. Not meant for production use.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreState>,
}

#[derive(Debug, Default)]
struct MemoryStoreState {
    objects: BTreeMap<(String, NamespacedName), DynamicObject>,
    next_uid: u64,
    next_version: u64,
}

impl MemoryStoreState {
    fn bump_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an object without going through create (no fresh UID).
    pub fn insert(&self, obj: DynamicObject) {
        let mut state = self.inner.lock().expect("memory store lock");
        let key = (obj.kind().to_string(), obj.namespaced_name());
        state.objects.insert(key, obj);
    }

    pub fn get_object(&self, kind: &str, key: &NamespacedName) -> Option<DynamicObject> {
        let state = self.inner.lock().expect("memory store lock");
        state.objects.get(&(kind.to_string(), key.clone())).cloned()
    }
}

impl StoreClient for MemoryStore {
    fn get(
        &self,
        _ctx: &Context,
        key: &NamespacedName,
        obj: &mut DynamicObject,
    ) -> Result<(), StoreError> {
        let state = self.inner.lock().expect("memory store lock");
        match state.objects.get(&(obj.kind().to_string(), key.clone())) {
            Some(stored) => {
                *obj = stored.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                kind: obj.kind().to_string(),
                name: key.clone(),
            }),
        }
    }

    fn list(&self, _ctx: &Context, list: &mut ObjectList) -> Result<(), StoreError> {
        let state = self.inner.lock().expect("memory store lock");
        list.items = state
            .objects
            .iter()
            .filter(|((kind, _), _)| kind == list.kind())
            .map(|(_, obj)| obj.clone())
            .collect();
        Ok(())
    }

    fn create(&self, _ctx: &Context, obj: &mut DynamicObject) -> Result<(), StoreError> {
        let mut state = self.inner.lock().expect("memory store lock");
        let key = (obj.kind().to_string(), obj.namespaced_name());
        if state.objects.contains_key(&key) {
            return Err(StoreError::Conflict {
                kind: obj.kind().to_string(),
                name: obj.namespaced_name(),
                reason: "already exists".to_string(),
            });
        }
        state.next_uid += 1;
        obj.metadata.uid = format!("uid-{}", state.next_uid);
        obj.metadata.resource_version = state.bump_version();
        if obj.metadata.creation_timestamp.is_empty() {
            obj.set_creation_timestamp(time::OffsetDateTime::now_utc());
        }
        state.objects.insert(key, obj.clone());
        Ok(())
    }

    fn update(&self, _ctx: &Context, obj: &mut DynamicObject) -> Result<(), StoreError> {
        let mut state = self.inner.lock().expect("memory store lock");
        let key = (obj.kind().to_string(), obj.namespaced_name());
        if !state.objects.contains_key(&key) {
            return Err(StoreError::NotFound {
                kind: obj.kind().to_string(),
                name: obj.namespaced_name(),
            });
        }
        obj.metadata.resource_version = state.bump_version();
        state.objects.insert(key, obj.clone());
        Ok(())
    }

    fn delete(&self, _ctx: &Context, obj: &mut DynamicObject) -> Result<(), StoreError> {
        let mut state = self.inner.lock().expect("memory store lock");
        let key = (obj.kind().to_string(), obj.namespaced_name());
        match state.objects.remove(&key) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound {
                kind: obj.kind().to_string(),
                name: obj.namespaced_name(),
            }),
        }
    }

    fn delete_all_of(&self, _ctx: &Context, obj: &mut DynamicObject) -> Result<(), StoreError> {
        let mut state = self.inner.lock().expect("memory store lock");
        let kind = obj.kind().to_string();
        state.objects.retain(|(k, _), _| *k != kind);
        Ok(())
    }

    fn patch(
        &self,
        _ctx: &Context,
        obj: &mut DynamicObject,
        patch: &Patch,
    ) -> Result<(), StoreError> {
        let mut state = self.inner.lock().expect("memory store lock");
        let key = (obj.kind().to_string(), obj.namespaced_name());
        let Some(stored) = state.objects.get(&key).cloned() else {
            return Err(StoreError::NotFound {
                kind: obj.kind().to_string(),
                name: obj.namespaced_name(),
            });
        };
        let mut value = serde_json::to_value(&stored).expect("object serializes");
        merge_patch(&mut value, patch.data());
        let mut merged: DynamicObject =
            serde_json::from_value(value).map_err(|e| StoreError::Transport(e.to_string()))?;
        // the caller's label stamps win over whatever the patch carried
        for (k, v) in obj.labels() {
            merged
                .labels_mut()
                .insert(k.clone(), v.clone());
        }
        merged.metadata.resource_version = state.bump_version();
        state.objects.insert(key, merged.clone());
        *obj = merged;
        Ok(())
    }

    fn update_status(&self, ctx: &Context, obj: &mut DynamicObject) -> Result<(), StoreError> {
        self.update(ctx, obj)
    }

    fn patch_status(
        &self,
        ctx: &Context,
        obj: &mut DynamicObject,
        patch: &Patch,
    ) -> Result<(), StoreError> {
        self.patch(ctx, obj, patch)
    }

    fn create_status(
        &self,
        ctx: &Context,
        obj: &mut DynamicObject,
        _sub: &mut DynamicObject,
    ) -> Result<(), StoreError> {
        self.update(ctx, obj)
    }
}

fn merge_patch(target: &mut Value, patch: &Value) {
    match patch {
        Value::Object(entries) => {
            if !target.is_object() {
                *target = Value::Object(serde_json::Map::new());
            }
            let map = target.as_object_mut().expect("object target");
            for (k, v) in entries {
                if v.is_null() {
                    map.remove(k);
                } else {
                    merge_patch(map.entry(k.clone()).or_insert(Value::Null), v);
                }
            }
        }
        other => *target = other.clone(),
    }
}
