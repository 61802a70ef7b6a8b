//! The frame-backed client handed to a reconciler under replay.
//!
//! Reads are served frozen from the current frame; writes touch nothing and
//! are recorded as effects. The current frame is addressed by the frame id
//! bound into the call context by the player.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::event::OpType;
use crate::object::{DynamicObject, NamespacedName, ObjectList};
use crate::store::{Context, Patch, StoreClient, StoreError};

use super::effects::Recorder;
use super::frame::FrameData;

#[derive(Clone)]
pub struct ReplayClient {
    frames_by_id: Arc<BTreeMap<String, FrameData>>,
    recorder: Recorder,
}

impl ReplayClient {
    pub(crate) fn new(frames_by_id: Arc<BTreeMap<String, FrameData>>, recorder: Recorder) -> Self {
        Self {
            frames_by_id,
            recorder,
        }
    }

    fn current_frame<'a>(&'a self, ctx: &Context) -> &'a FrameData {
        let Some(frame_id) = ctx.frame_id() else {
            panic!("frame id not bound in call context during replay");
        };
        self.frames_by_id
            .get(frame_id)
            .unwrap_or_else(|| panic!("no frame data for frame {frame_id}"))
    }
}

impl StoreClient for ReplayClient {
    fn get(
        &self,
        ctx: &Context,
        key: &NamespacedName,
        obj: &mut DynamicObject,
    ) -> Result<(), StoreError> {
        if obj.kind().is_empty() {
            panic!("object kind not set on GET target");
        }
        let frame = self.current_frame(ctx);
        match frame.get(obj.kind()).and_then(|objs| objs.get(key)) {
            Some(frozen) => {
                self.recorder.record_effect(ctx, frozen, OpType::Get);
                *obj = DynamicObject::clone(frozen);
                Ok(())
            }
            None => Err(StoreError::NotFound {
                kind: obj.kind().to_string(),
                name: key.clone(),
            }),
        }
    }

    fn list(&self, ctx: &Context, list: &mut ObjectList) -> Result<(), StoreError> {
        let frame = self.current_frame(ctx);
        list.items.clear();
        if let Some(objs) = frame.get(list.kind()) {
            for frozen in objs.values() {
                self.recorder.record_effect(ctx, frozen, OpType::List);
                list.items.push(DynamicObject::clone(frozen));
            }
        }
        Ok(())
    }

    fn create(&self, ctx: &Context, obj: &mut DynamicObject) -> Result<(), StoreError> {
        self.recorder.record_effect(ctx, obj, OpType::Create);
        Ok(())
    }

    fn update(&self, ctx: &Context, obj: &mut DynamicObject) -> Result<(), StoreError> {
        self.recorder.record_effect(ctx, obj, OpType::Update);
        Ok(())
    }

    fn delete(&self, ctx: &Context, obj: &mut DynamicObject) -> Result<(), StoreError> {
        self.recorder.record_effect(ctx, obj, OpType::Delete);
        Ok(())
    }

    fn delete_all_of(&self, ctx: &Context, obj: &mut DynamicObject) -> Result<(), StoreError> {
        self.recorder.record_effect(ctx, obj, OpType::Delete);
        Ok(())
    }

    fn patch(
        &self,
        ctx: &Context,
        obj: &mut DynamicObject,
        _patch: &Patch,
    ) -> Result<(), StoreError> {
        self.recorder.record_effect(ctx, obj, OpType::Patch);
        Ok(())
    }

    fn update_status(&self, ctx: &Context, obj: &mut DynamicObject) -> Result<(), StoreError> {
        self.recorder.record_effect(ctx, obj, OpType::Update);
        Ok(())
    }

    fn patch_status(
        &self,
        ctx: &Context,
        obj: &mut DynamicObject,
        _patch: &Patch,
    ) -> Result<(), StoreError> {
        self.recorder.record_effect(ctx, obj, OpType::Patch);
        Ok(())
    }

    fn create_status(
        &self,
        ctx: &Context,
        obj: &mut DynamicObject,
        _sub: &mut DynamicObject,
    ) -> Result<(), StoreError> {
        self.recorder.record_effect(ctx, obj, OpType::Create);
        Ok(())
    }
}
