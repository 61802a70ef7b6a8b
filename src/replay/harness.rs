//! The replay harness and player.
//!
//! A harness holds the ordered frames for one controller plus the traced and
//! replayed effects per frame. The player drives the reconciler through the
//! frames in order, strictly single-threaded.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::info;

use crate::event::Event;
use crate::object::short_uid;
use crate::store::{BoxError, Context, ReconcileRequest, Reconciler};

use super::client::ReplayClient;
use super::effects::{DataEffect, Recorder};
use super::frame::{Frame, FrameData, FrameType};
use super::predicate::{ExecutionPredicate, Predicate};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("reconcile failed in frame {frame_id}: {source}")]
    Reconcile {
        frame_id: String,
        #[source]
        source: BoxError,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayOutcome {
    /// Every frame played without a predicate latching.
    Completed,
    /// A predicate latched; the run ended early.
    PredicateSatisfied,
}

#[derive(Debug)]
pub struct ReplayHarness {
    reconciler_id: String,
    pub(crate) frames: Vec<Frame>,
    pub(crate) frame_data_by_id: BTreeMap<String, FrameData>,
    traced_effects: BTreeMap<String, DataEffect>,
    replay_effects: Arc<Mutex<BTreeMap<String, DataEffect>>>,
    predicates: Vec<Arc<ExecutionPredicate>>,
}

impl ReplayHarness {
    pub(crate) fn new(
        reconciler_id: String,
        frames: Vec<Frame>,
        frame_data_by_id: BTreeMap<String, FrameData>,
        traced_effects: BTreeMap<String, DataEffect>,
    ) -> Self {
        Self {
            reconciler_id,
            frames,
            frame_data_by_id,
            traced_effects,
            replay_effects: Arc::new(Mutex::new(BTreeMap::new())),
            predicates: Vec::new(),
        }
    }

    pub fn reconciler_id(&self) -> &str {
        &self.reconciler_id
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frame_data(&self, frame_id: &str) -> Option<&FrameData> {
        self.frame_data_by_id.get(frame_id)
    }

    pub fn traced_effect(&self, frame_id: &str) -> Option<&DataEffect> {
        self.traced_effects.get(frame_id)
    }

    pub fn traced_effects(&self) -> impl Iterator<Item = (&String, &DataEffect)> {
        self.traced_effects.iter()
    }

    /// The effects recorded by the replay so far, per frame.
    pub fn replay_effect(&self, frame_id: &str) -> Option<DataEffect> {
        self.replay_effects
            .lock()
            .expect("replay effects lock")
            .get(frame_id)
            .cloned()
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicates
            .push(Arc::new(ExecutionPredicate::new(predicate)));
        self
    }

    /// A frame-backed client for the reconciler under replay.
    pub fn replay_client(&self) -> ReplayClient {
        let recorder = Recorder::new(
            self.reconciler_id.clone(),
            Arc::clone(&self.replay_effects),
            self.predicates.clone(),
        );
        ReplayClient::new(Arc::new(self.frame_data_by_id.clone()), recorder)
    }

    pub fn load<R: Reconciler>(self, reconciler: R) -> Player<R> {
        Player {
            reconciler,
            harness: self,
        }
    }

    /// Inserts preserving the total order: after every frame ordered strictly
    /// before it, before the rest.
    pub(crate) fn insert_frame(&mut self, frame: Frame) {
        let pos = self
            .frames
            .partition_point(|f| f.sequence_id < frame.sequence_id);
        self.frames.insert(pos, frame);
    }

    /// The frame nearest to `ts` by sequence id; the earlier frame wins when
    /// equidistant. Frames with non-numeric sequence ids are skipped.
    pub(crate) fn nearest_frame(&self, ts: &str) -> Option<&Frame> {
        let target: i128 = ts.parse().ok()?;
        let mut nearest: Option<(&Frame, i128)> = None;
        for frame in &self.frames {
            let Ok(seq) = frame.sequence_id.parse::<i128>() else {
                continue;
            };
            let distance = (seq - target).abs();
            match nearest {
                Some((_, best)) if distance >= best => {}
                _ => nearest = Some((frame, distance)),
            }
        }
        nearest.map(|(frame, _)| frame)
    }

    pub(crate) fn add_frame_data(&mut self, frame_id: String, data: FrameData) {
        self.frame_data_by_id.insert(frame_id, data);
    }

    fn any_predicate_satisfied(&self) -> bool {
        self.predicates.iter().any(|p| p.satisfied())
    }
}

/// A reconciler that does nothing. Useful for validating a trace end-to-end
/// without the original controller code.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopReconciler;

impl Reconciler for NoopReconciler {
    fn reconcile(&mut self, _ctx: &Context, _req: &ReconcileRequest) -> Result<(), BoxError> {
        Ok(())
    }
}

pub struct Player<R> {
    reconciler: R,
    harness: ReplayHarness,
}

impl<R: Reconciler> Player<R> {
    pub fn harness(&self) -> &ReplayHarness {
        &self.harness
    }

    pub fn play(&mut self) -> Result<PlayOutcome, ReplayError> {
        let Player {
            reconciler,
            harness,
        } = self;
        for frame in &harness.frames {
            let traced = harness.traced_effects.get(&frame.id).cloned().unwrap_or_default();
            // a pure-read traced frame produces nothing to compare
            if frame.frame_type == FrameType::Traced && traced.writes.is_empty() {
                continue;
            }

            let ctx = Context::new().with_frame_id(frame.id.clone());
            info!(
                target: "sleeve",
                frame = %frame.id,
                frame_type = %frame.frame_type,
                controller = %harness.reconciler_id,
                "replaying frame"
            );
            info!(target: "sleeve", "traced readset:\n{}", format_event_list(&traced.reads));
            info!(target: "sleeve", "traced writeset:\n{}", format_event_list(&traced.writes));

            reconciler
                .reconcile(&ctx, &frame.req)
                .map_err(|source| ReplayError::Reconcile {
                    frame_id: frame.id.clone(),
                    source,
                })?;

            let replayed = harness
                .replay_effects
                .lock()
                .expect("replay effects lock")
                .get(&frame.id)
                .cloned()
                .unwrap_or_default();
            info!(target: "sleeve", "actual readset:\n{}", format_event_list(&replayed.reads));
            info!(target: "sleeve", "actual writeset:\n{}", format_event_list(&replayed.writes));

            if harness.any_predicate_satisfied() {
                info!(target: "sleeve", frame = %frame.id, "predicate satisfied");
                return Ok(PlayOutcome::PredicateSatisfied);
            }
        }
        Ok(PlayOutcome::Completed)
    }
}

fn format_event_list(events: &[Event]) -> String {
    if events.is_empty() {
        return "\t<empty>".to_string();
    }
    events
        .iter()
        .map(|e| {
            if e.op_type.is_read() {
                format!(
                    "\t{{kind: {}, id: {}, ver: {}}}",
                    e.kind,
                    short_uid(&e.object_id),
                    e.version
                )
            } else {
                format!(
                    "\t{{kind: {}, id: {}, op: {}}}",
                    e.kind,
                    short_uid(&e.object_id),
                    e.op_type
                )
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(sequence_id: &str, root: &str) -> Frame {
        Frame {
            id: format!("frame-{sequence_id}"),
            frame_type: FrameType::Traced,
            sequence_id: sequence_id.to_string(),
            req: ReconcileRequest::default(),
            tracey_root_id: root.to_string(),
        }
    }

    fn harness_with(frames: Vec<Frame>) -> ReplayHarness {
        ReplayHarness::new(
            "Widget".to_string(),
            frames,
            BTreeMap::new(),
            BTreeMap::new(),
        )
    }

    fn sequence_ids(harness: &ReplayHarness) -> Vec<&str> {
        harness.frames.iter().map(|f| f.sequence_id()).collect()
    }

    #[test]
    fn insert_frame_lands_in_the_middle() {
        let mut harness = harness_with(vec![frame("0010", "root1"), frame("0012", "root2")]);
        harness.insert_frame(frame("0011", "root3"));
        assert_eq!(sequence_ids(&harness), vec!["0010", "0011", "0012"]);
    }

    #[test]
    fn insert_frame_prepends_before_first() {
        let mut harness = harness_with(vec![frame("0010", "root1"), frame("0012", "root2")]);
        harness.insert_frame(frame("0009", "root3"));
        assert_eq!(sequence_ids(&harness), vec!["0009", "0010", "0012"]);
    }

    #[test]
    fn insert_frame_appends_after_last() {
        let mut harness = harness_with(vec![frame("0010", "root1"), frame("0012", "root2")]);
        harness.insert_frame(frame("0013", "root3"));
        assert_eq!(sequence_ids(&harness), vec!["0010", "0012", "0013"]);
    }

    #[test]
    fn nearest_frame_breaks_ties_toward_the_earlier_frame() {
        let harness = harness_with(vec![frame("0010", "root1"), frame("0012", "root2")]);
        // 0011 is equidistant; the lower-index frame wins
        assert_eq!(harness.nearest_frame("0011").unwrap().sequence_id(), "0010");
        assert_eq!(harness.nearest_frame("0013").unwrap().sequence_id(), "0012");
        assert!(harness_with(Vec::new()).nearest_frame("0011").is_none());
    }

    #[test]
    fn format_event_list_handles_empty() {
        assert_eq!(format_event_list(&[]), "\t<empty>");
    }
}
