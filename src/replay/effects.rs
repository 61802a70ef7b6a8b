//! Data effects: what a reconcile invocation read and wrote.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::event::{Event, OpType};
use crate::object::DynamicObject;
use crate::store::Context;

use super::predicate::ExecutionPredicate;

/// Root-event id stamped on effects recorded during replay; replayed
/// operations have no live causal chain.
pub(crate) const REPLAY_ROOT: &str = "<REPLAY>";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DataEffect {
    pub reads: Vec<Event>,
    pub writes: Vec<Event>,
}

impl DataEffect {
    pub fn new(reads: Vec<Event>, writes: Vec<Event>) -> Self {
        Self { reads, writes }
    }
}

/// Accumulates one [`DataEffect`] per frame during replay and evaluates the
/// execution predicates against every written object.
#[derive(Clone)]
pub(crate) struct Recorder {
    reconciler_id: String,
    effects: Arc<Mutex<BTreeMap<String, DataEffect>>>,
    predicates: Vec<Arc<ExecutionPredicate>>,
}

impl Recorder {
    pub(crate) fn new(
        reconciler_id: String,
        effects: Arc<Mutex<BTreeMap<String, DataEffect>>>,
        predicates: Vec<Arc<ExecutionPredicate>>,
    ) -> Self {
        Self {
            reconciler_id,
            effects,
            predicates,
        }
    }

    pub(crate) fn record_effect(&self, ctx: &Context, obj: &DynamicObject, op: OpType) {
        let Some(frame_id) = ctx.frame_id() else {
            panic!("frame id not bound in call context during replay");
        };
        let event = Event::for_object(obj, frame_id, &self.reconciler_id, REPLAY_ROOT, op);

        let is_read = op.is_read();
        {
            let mut effects = self.effects.lock().expect("replay effects lock");
            let effect = effects.entry(frame_id.to_string()).or_default();
            if is_read {
                effect.reads.push(event);
            } else {
                effect.writes.push(event);
            }
        }
        if !is_read {
            // a write during a perturbed execution may be the desired outcome
            for predicate in &self.predicates {
                predicate.check(obj);
            }
        }
    }
}
