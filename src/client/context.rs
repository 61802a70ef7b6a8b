//! Per-client reconcile context.
//!
//! One instrumented client serves one reconciler, so the context is a single
//! (reconcile id, root id) pair. It is mutated under a lock so the automatic
//! context switch on the first operation of a new reconcile invocation is
//! observed atomically by any call that follows within that invocation.

use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct ReconcileContext {
    inner: Mutex<State>,
}

#[derive(Clone, Debug, Default)]
struct State {
    reconcile_id: String,
    root_id: String,
    active: bool,
}

impl ReconcileContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reconcile_id(&self) -> String {
        self.inner.lock().expect("reconcile context lock").reconcile_id.clone()
    }

    pub fn root_id(&self) -> String {
        self.inner.lock().expect("reconcile context lock").root_id.clone()
    }

    /// Both halves read under one lock acquisition.
    pub fn snapshot(&self) -> (String, String) {
        let state = self.inner.lock().expect("reconcile context lock");
        (state.reconcile_id.clone(), state.root_id.clone())
    }

    pub fn set_reconcile_id(&self, id: &str) {
        self.inner.lock().expect("reconcile context lock").reconcile_id = id.to_string();
    }

    pub fn set_root_id(&self, id: &str) {
        self.inner.lock().expect("reconcile context lock").root_id = id.to_string();
    }

    /// Begins an explicit invocation. Returns false when one is already
    /// active, which is the caller's programming-error signal.
    pub fn begin(&self, reconcile_id: &str) -> bool {
        let mut state = self.inner.lock().expect("reconcile context lock");
        if state.active {
            return false;
        }
        state.active = true;
        state.reconcile_id = reconcile_id.to_string();
        state.root_id.clear();
        true
    }

    pub fn end(&self) {
        let mut state = self.inner.lock().expect("reconcile context lock");
        state.active = false;
        state.reconcile_id.clear();
        state.root_id.clear();
    }
}
