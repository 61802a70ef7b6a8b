//! Trace parsing and harness construction.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::{debug, info};

use crate::event::{earliest, filter_reads_writes, CausalKey, ChangeId, Event, EventParseError};
use crate::object::NamespacedName;
use crate::snapshot::VersionKey;
use crate::store::ReconcileRequest;

use super::effects::DataEffect;
use super::frame::{Frame, FrameData, FrameType};
use super::harness::ReplayHarness;
use super::parse;
use super::store::ReplayStore;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("controller id not found in trace: {0}")]
    UnknownController(String),
    #[error("object not found in store: {0}")]
    MissingSnapshot(VersionKey),
    #[error("could not infer reconcile request for controller {0} from its read set")]
    NoRequestAnchor(String),
    #[error("object with causal id {0} not found in store")]
    MissingCausalObject(CausalKey),
    #[error("no read event found for change id {0}")]
    NoReadForChange(ChangeId),
    #[error("{kind} {name} not present in frame {frame_id}; cannot substitute an unrelated object")]
    MissingInterpolationAnchor {
        kind: String,
        name: NamespacedName,
        frame_id: String,
    },
    #[error("harness has no frames to anchor interpolation")]
    NoFrames,
    #[error("decoding record value for {key}: {source}")]
    RecordValue {
        key: VersionKey,
        source: serde_json::Error,
    },
    #[error("parsing event line: {0}")]
    Event(#[from] EventParseError),
    #[error("parsing record line: {0}")]
    Record(#[from] serde_json::Error),
}

/// Parses a raw trace into a [`TraceBuilder`]: hydrates the object store,
/// decodes the event corpus, and checks read-event integrity.
pub fn parse_trace(trace: &[u8]) -> Result<TraceBuilder, TraceError> {
    let text = String::from_utf8_lossy(trace);
    let lines: Vec<&str> = text.lines().collect();

    let records = parse::records_from_lines(&lines)?;
    let mut store = ReplayStore::new();
    for record in &records {
        store.add(record)?;
    }
    info!(
        target: "sleeve",
        observations = store.observations(),
        unique = store.unique_versions(),
        "hydrated object store from trace"
    );

    let events = parse::events_from_lines(&lines)?;
    info!(target: "sleeve", total = events.len(), "parsed operation events");

    // every read must resolve to a snapshot, or the trace is unusable
    for event in &events {
        if event.op_type.is_read() && !store.has_version(&event.version_key()) {
            return Err(TraceError::MissingSnapshot(event.version_key()));
        }
    }

    let mut reconciler_ids = BTreeSet::new();
    for event in &events {
        if reconciler_ids.insert(event.controller_id.clone()) {
            debug!(target: "sleeve", controller_id = %event.controller_id, "found controller in trace");
        }
    }

    Ok(TraceBuilder {
        store,
        events,
        reconciler_ids,
    })
}

/// An indexed trace, ready to build replay harnesses per controller.
#[derive(Debug)]
pub struct TraceBuilder {
    pub(crate) store: ReplayStore,
    pub(crate) events: Vec<Event>,
    reconciler_ids: BTreeSet<String>,
}

impl TraceBuilder {
    pub fn store(&self) -> &ReplayStore {
        &self.store
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn reconciler_ids(&self) -> &BTreeSet<String> {
        &self.reconciler_ids
    }

    pub fn build_harness(&self, controller_id: &str) -> Result<ReplayHarness, TraceError> {
        if !self.reconciler_ids.contains(controller_id) {
            return Err(TraceError::UnknownController(controller_id.to_string()));
        }

        let mut by_reconcile_id: BTreeMap<String, Vec<Event>> = BTreeMap::new();
        for event in &self.events {
            if event.controller_id == controller_id {
                by_reconcile_id
                    .entry(event.reconcile_id.clone())
                    .or_default()
                    .push(event.clone());
            }
        }

        let mut frames = Vec::new();
        let mut frame_data = BTreeMap::new();
        let mut effects = BTreeMap::new();

        for (reconcile_id, group) in by_reconcile_id {
            let sequence_id = earliest(&group)
                .map(|e| e.timestamp.clone())
                .unwrap_or_default();
            let (reads, writes) = filter_reads_writes(&group);

            let req = self.infer_reconcile_request(controller_id, &reads)?;
            frame_data.insert(reconcile_id.clone(), self.generate_frame_data(&reads)?);
            let tracey_root_id = majority_root_id(&reads);
            effects.insert(reconcile_id.clone(), DataEffect::new(reads, writes));

            frames.push(Frame {
                id: reconcile_id,
                frame_type: FrameType::Traced,
                sequence_id,
                req,
                tracey_root_id,
            });
        }

        frames.sort_by(|a, b| a.sequence_id.cmp(&b.sequence_id));

        Ok(ReplayHarness::new(
            controller_id.to_string(),
            frames,
            frame_data,
            effects,
        ))
    }

    /// A reconcile loop's request names a resource whose kind equals the
    /// controller id; the read set must contain one.
    fn infer_reconcile_request(
        &self,
        controller_id: &str,
        reads: &[Event],
    ) -> Result<ReconcileRequest, TraceError> {
        for event in reads {
            if event.kind == controller_id {
                if let Some(obj) = self.store.get_version(&event.version_key()) {
                    return Ok(ReconcileRequest {
                        namespaced_name: obj.namespaced_name(),
                    });
                }
            }
        }
        Err(TraceError::NoRequestAnchor(controller_id.to_string()))
    }

    fn generate_frame_data(&self, reads: &[Event]) -> Result<FrameData, TraceError> {
        let mut data = FrameData::new();
        for event in reads {
            let key = event.version_key();
            let obj = self
                .store
                .get_version(&key)
                .ok_or_else(|| TraceError::MissingSnapshot(key.clone()))?;
            data.entry(event.kind.clone())
                .or_default()
                .insert(obj.namespaced_name(), obj.clone());
        }
        Ok(data)
    }
}

/// Majority vote over the reads' root-event ids; ties break toward the
/// smallest value so frame construction is deterministic.
fn majority_root_id(reads: &[Event]) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for event in reads {
        *counts.entry(event.root_event_id.as_str()).or_default() += 1;
    }
    let mut best = "";
    let mut best_count = 0;
    for (root, count) in counts {
        if count > best_count {
            best = root;
            best_count = count;
        }
    }
    best.to_string()
}
