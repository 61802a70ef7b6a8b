//! Status-subresource write instrumentation.
//!
//! A status write stamps a fresh change-id on the parent object, emits the
//! operation event, propagates the causal labels, and persists those labels
//! through the main writer before the subresource write runs: the backend
//! only guarantees label propagation through the main resource. If the main
//! resource moved since the caller read it, the persist step surfaces the
//! store's conflict verbatim.

use crate::event::OpType;
use crate::object::DynamicObject;
use crate::store::{Context, StoreClient, StoreError};
use crate::tag;

use super::Client;

impl<C: StoreClient> Client<C> {
    pub(super) fn prepare_status_write(
        &self,
        ctx: &Context,
        obj: &mut DynamicObject,
        op: OpType,
    ) -> Result<(), StoreError> {
        if let Err(violation) = tag::sanity_check_labels(obj) {
            panic!("{violation}");
        }
        self.set_reconcile_id(ctx);
        tag::label_change(obj);
        self.log_operation(obj, op);
        self.propagate_labels(obj);
        self.persist_labels(ctx, obj)
    }

    fn persist_labels(&self, ctx: &Context, obj: &mut DynamicObject) -> Result<(), StoreError> {
        self.inner.update(ctx, obj)
    }
}
