//! Frames: immutable snapshots of the world as one reconcile invocation saw
//! it, like the frames of a movie.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::object::{DynamicObject, NamespacedName};
use crate::store::ReconcileRequest;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameType {
    /// Reconstructed from the trace.
    Traced,
    /// Fabricated by the synthesizer to carry a missed observation.
    Synthetic,
}

impl FrameType {
    pub fn as_str(self) -> &'static str {
        match self {
            FrameType::Traced => "TRACED",
            FrameType::Synthetic => "SYNTHETIC",
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub id: String,
    pub frame_type: FrameType,
    /// Total order over frames. In practice an event timestamp.
    pub(crate) sequence_id: String,
    pub req: ReconcileRequest,
    pub tracey_root_id: String,
}

impl Frame {
    pub fn sequence_id(&self) -> &str {
        &self.sequence_id
    }
}

/// What one reconcile invocation observed: kind, then namespaced name, to the
/// exact object version. Objects are shared; cloning a frame's data clones
/// the map shape, not the objects.
pub type FrameData = BTreeMap<String, BTreeMap<NamespacedName, Arc<DynamicObject>>>;
