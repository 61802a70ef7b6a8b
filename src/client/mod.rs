//! The instrumentation client.
//!
//! A transparent decorator over a [`StoreClient`]: identical semantics, plus
//! one operation event per call, a fresh change-id on every mutation before
//! it reaches the store, causal-label propagation after the event is logged
//! (so events capture pre-image labels), and configurable visibility delay on
//! reads.

mod context;
mod options;
mod subresource;

pub use context::ReconcileContext;
pub use options::{ClientConfig, LOG_SNAPSHOTS_ENV};

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::event::{Event, OpType};
use crate::object::{DynamicObject, NamespacedName, ObjectList};
use crate::sink::{TraceSink, TracingSink};
use crate::snapshot::Record;
use crate::store::{Context, Patch, StoreClient, StoreError};
use crate::tag;

pub struct Client<C> {
    inner: C,
    id: String,
    reconcile_context: ReconcileContext,
    sink: Arc<dyn TraceSink>,
    config: ClientConfig,
}

/// Wraps a store client with instrumentation. Equivalent to
/// [`Client::wrap`].
pub fn wrap<C: StoreClient>(inner: C) -> Client<C> {
    Client::wrap(inner)
}

impl<C: StoreClient> Client<C> {
    pub fn wrap(inner: C) -> Self {
        Self {
            inner,
            id: String::new(),
            reconcile_context: ReconcileContext::new(),
            sink: Arc::new(TracingSink),
            config: ClientConfig::default(),
        }
    }

    /// Names the controller this client serves; the name becomes the
    /// controller id on every emitted event.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.id = name.into();
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Applies environment overrides to the current configuration.
    pub fn with_env_config(mut self) -> Self {
        self.config = self.config.from_env();
        self
    }

    /// Marks the start of a reconcile invocation. Optional: the context also
    /// switches automatically on the first operation carrying a new reconcile
    /// id. Panics if an invocation is already active on this client; one
    /// client must not be shared across parallel reconcile routines.
    pub fn begin_reconcile(&self, reconcile_id: &str) {
        if !self.reconcile_context.begin(reconcile_id) {
            panic!(
                "concurrent reconcile invocations detected on client {:?}; \
                 clients must not be shared across parallel reconcilers",
                self.id
            );
        }
    }

    /// Marks the end of a reconcile invocation, clearing the reconcile
    /// context.
    pub fn end_reconcile(&self) {
        self.reconcile_context.end();
    }

    fn set_reconcile_id(&self, ctx: &Context) {
        let Some(rid) = ctx.reconcile_id() else {
            panic!("reconcile id not set in call context");
        };
        let curr = self.reconcile_context.reconcile_id();
        if curr.is_empty() {
            self.reconcile_context.set_reconcile_id(rid);
        } else if rid != curr {
            debug!(target: "sleeve", old = %curr, new = %rid, "reconcile id changed");
            // a new invocation invalidates the previous root context
            self.reconcile_context.set_root_id("");
            self.reconcile_context.set_reconcile_id(rid);
        }
    }

    fn set_root_context(&self, obj: &DynamicObject) {
        let labels = obj.labels();
        let root_id = match labels
            .get(tag::WEBHOOK_LABEL)
            .or_else(|| labels.get(tag::ROOT_EVENT_ID_LABEL))
        {
            Some(id) => id.clone(),
            None => {
                debug!(
                    target: "sleeve",
                    kind = %obj.kind(),
                    "root context not set on object"
                );
                return;
            }
        };
        let curr = self.reconcile_context.root_id();
        if !curr.is_empty() && curr != root_id {
            let (reconcile_id, _) = self.reconcile_context.snapshot();
            warn!(
                target: "sleeve",
                controller_id = %self.id,
                reconcile_id = %reconcile_id,
                root_id = %curr,
                new_root_id = %root_id,
                "root context changed during reconcile"
            );
        }
        self.reconcile_context.set_root_id(&root_id);
    }

    fn log_operation(&self, obj: &DynamicObject, op: OpType) {
        let (reconcile_id, root_id) = self.reconcile_context.snapshot();
        let event = Event::for_object(obj, &reconcile_id, &self.id, &root_id, op);
        self.sink
            .emit(tag::CONTROLLER_OPERATION_KEY, &event.to_json());
    }

    fn log_object_version(&self, obj: &DynamicObject) {
        let record = Record::from_object(obj);
        self.sink.emit(tag::OBJECT_VERSION_KEY, &record.to_json());
    }

    fn propagate_labels(&self, obj: &mut DynamicObject) {
        let (reconcile_id, root_id) = self.reconcile_context.snapshot();
        let labels = obj.labels_mut();
        labels.insert(tag::CREATOR_ID_LABEL.to_string(), self.id.clone());
        labels.insert(tag::ROOT_EVENT_ID_LABEL.to_string(), root_id);
        labels.insert(tag::RECONCILE_ID_LABEL.to_string(), reconcile_id);
    }

    fn track_operation(&self, ctx: &Context, obj: &mut DynamicObject, op: OpType) {
        if let Err(violation) = tag::sanity_check_labels(obj) {
            panic!("{violation}");
        }
        self.set_reconcile_id(ctx);
        if op.is_read() {
            self.set_root_context(obj);
        }
        if op.is_mutation() {
            tag::label_change(obj);
        }
        self.log_operation(obj, op);
        if self.config.log_object_snapshots {
            self.log_object_version(obj);
        }
        // after logging, so the event captured the pre-image labels
        // (e.g. the previous writer's reconcile id)
        self.propagate_labels(obj);
    }

    fn is_visible(&self, obj: &DynamicObject) -> bool {
        let Some(delay) = self.config.delay_for(obj.kind()) else {
            return true;
        };
        let Some(created) = obj.creation_timestamp() else {
            return true;
        };
        let age = OffsetDateTime::now_utc() - created;
        if age.whole_milliseconds() < delay.as_millis() as i128 {
            debug!(
                target: "sleeve",
                kind = %obj.kind(),
                uid = %obj.uid(),
                age_ms = age.whole_milliseconds(),
                "object not visible yet"
            );
            return false;
        }
        true
    }
}

impl<C: StoreClient> StoreClient for Client<C> {
    fn get(
        &self,
        ctx: &Context,
        key: &NamespacedName,
        obj: &mut DynamicObject,
    ) -> Result<(), StoreError> {
        if obj.kind().is_empty() {
            panic!("object kind not set on GET target");
        }
        let mut probe = DynamicObject::new(obj.kind());
        self.inner.get(ctx, key, &mut probe)?;
        if !self.is_visible(&probe) {
            return Err(StoreError::NotFound {
                kind: obj.kind().to_string(),
                name: key.clone(),
            });
        }
        self.inner.get(ctx, key, obj)?;
        self.track_operation(ctx, obj, OpType::Get);
        Ok(())
    }

    fn list(&self, ctx: &Context, list: &mut ObjectList) -> Result<(), StoreError> {
        let mut fetched = ObjectList::new(list.kind());
        self.inner.list(ctx, &mut fetched)?;
        // each returned item is a separate observation, not one LIST event
        list.items.clear();
        for mut item in fetched.items {
            if !self.is_visible(&item) {
                continue;
            }
            self.track_operation(ctx, &mut item, OpType::List);
            list.items.push(item);
        }
        Ok(())
    }

    fn create(&self, ctx: &Context, obj: &mut DynamicObject) -> Result<(), StoreError> {
        self.track_operation(ctx, obj, OpType::Create);
        self.inner.create(ctx, obj)
    }

    fn update(&self, ctx: &Context, obj: &mut DynamicObject) -> Result<(), StoreError> {
        self.track_operation(ctx, obj, OpType::Update);
        self.inner.update(ctx, obj)
    }

    fn delete(&self, ctx: &Context, obj: &mut DynamicObject) -> Result<(), StoreError> {
        self.track_operation(ctx, obj, OpType::Delete);
        self.inner.delete(ctx, obj)
    }

    fn delete_all_of(&self, ctx: &Context, obj: &mut DynamicObject) -> Result<(), StoreError> {
        self.track_operation(ctx, obj, OpType::Delete);
        self.inner.delete_all_of(ctx, obj)
    }

    fn patch(
        &self,
        ctx: &Context,
        obj: &mut DynamicObject,
        patch: &Patch,
    ) -> Result<(), StoreError> {
        self.track_operation(ctx, obj, OpType::Patch);
        self.inner.patch(ctx, obj, patch)
    }

    fn update_status(&self, ctx: &Context, obj: &mut DynamicObject) -> Result<(), StoreError> {
        self.prepare_status_write(ctx, obj, OpType::Update)?;
        self.inner.update_status(ctx, obj)
    }

    fn patch_status(
        &self,
        ctx: &Context,
        obj: &mut DynamicObject,
        patch: &Patch,
    ) -> Result<(), StoreError> {
        self.prepare_status_write(ctx, obj, OpType::Patch)?;
        self.inner.patch_status(ctx, obj, patch)
    }

    fn create_status(
        &self,
        ctx: &Context,
        obj: &mut DynamicObject,
        sub: &mut DynamicObject,
    ) -> Result<(), StoreError> {
        self.prepare_status_write(ctx, obj, OpType::Create)?;
        self.inner.create_status(ctx, obj, sub)
    }
}
