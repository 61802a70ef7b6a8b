//! Missed-observation detection and synthetic-frame interpolation.
//!
//! A missed observation is an object version the trace knows about that a
//! controller could in principle have observed but did not. Interpolation
//! force-feeds a missed version to the reconciler at a strategically chosen
//! point in replay order by fabricating a frame that carries it.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};
use uuid::Uuid;

use crate::event::CausalKey;

use super::builder::{TraceBuilder, TraceError};
use super::frame::{Frame, FrameType};
use super::harness::ReplayHarness;

impl TraceBuilder {
    /// Per read-depended kind, the CausalKeys present in the trace that the
    /// controller never observed.
    pub fn find_missed_observations(
        &self,
        controller_id: &str,
    ) -> Result<BTreeMap<String, BTreeSet<CausalKey>>, TraceError> {
        let harness = self.build_harness(controller_id)?;

        let mut read_dependencies = BTreeSet::new();
        let mut local_knowledge: BTreeMap<String, BTreeSet<CausalKey>> = BTreeMap::new();
        for (_, effect) in harness.traced_effects() {
            for event in &effect.reads {
                read_dependencies.insert(event.kind.clone());
                local_knowledge
                    .entry(event.kind.clone())
                    .or_default()
                    .insert(event.causal_key());
            }
            for event in &effect.writes {
                local_knowledge
                    .entry(event.kind.clone())
                    .or_default()
                    .insert(event.causal_key());
            }
        }

        let mut missed = BTreeMap::new();
        for kind in read_dependencies {
            let all_known = self.store.causal_keys_of_kind(&kind);
            let local = local_knowledge.remove(&kind).unwrap_or_default();
            let diff: BTreeSet<CausalKey> = all_known.difference(&local).cloned().collect();
            if !diff.is_empty() {
                info!(
                    target: "sleeve",
                    controller = %controller_id,
                    kind = %kind,
                    count = diff.len(),
                    "missed observations"
                );
                for key in &diff {
                    debug!(target: "sleeve", key = %key, "missed observation");
                }
            }
            missed.insert(kind, diff);
        }
        Ok(missed)
    }

    /// Builds a harness with one synthetic frame per missed CausalKey,
    /// inserted at the point in replay order where the missed version was
    /// first read by anyone.
    pub fn interpolate_frames(
        &self,
        controller_id: &str,
        missed: &BTreeSet<CausalKey>,
    ) -> Result<ReplayHarness, TraceError> {
        let mut harness = self.build_harness(controller_id)?;

        for causal_key in missed {
            let store_obj = self
                .store
                .lookup(causal_key)
                .cloned()
                .ok_or_else(|| TraceError::MissingCausalObject(causal_key.clone()))?;
            let ts = self.earliest_read_timestamp(causal_key)?;

            let nearest = harness
                .nearest_frame(&ts)
                .ok_or(TraceError::NoFrames)?
                .clone();
            let mut data = harness
                .frame_data(&nearest.id)
                .cloned()
                .unwrap_or_else(|| panic!("no frame data for frame {}", nearest.id));

            let kind = store_obj.kind().to_string();
            let name = store_obj.namespaced_name();
            let slot = data.get_mut(&kind).and_then(|objs| objs.get_mut(&name));
            match slot {
                Some(slot) => *slot = store_obj,
                // the harness cannot substitute an unrelated object
                None => {
                    return Err(TraceError::MissingInterpolationAnchor {
                        kind,
                        name,
                        frame_id: nearest.id,
                    })
                }
            }

            let frame = Frame {
                id: Uuid::new_v4().to_string(),
                frame_type: FrameType::Synthetic,
                sequence_id: ts.clone(),
                req: nearest.req.clone(),
                tracey_root_id: nearest.tracey_root_id.clone(),
            };
            info!(
                target: "sleeve",
                key = %causal_key,
                at = %ts,
                anchor = %nearest.id,
                synthetic = %frame.id,
                "interpolating synthetic frame"
            );
            harness.add_frame_data(frame.id.clone(), data);
            harness.insert_frame(frame);
        }

        Ok(harness)
    }

    /// The timestamp of the earliest read event observing the key's change
    /// id.
    fn earliest_read_timestamp(&self, key: &CausalKey) -> Result<String, TraceError> {
        self.events
            .iter()
            .filter(|e| e.op_type.is_read() && e.change_id() == key.version)
            .map(|e| e.timestamp.clone())
            .min()
            .ok_or_else(|| TraceError::NoReadForChange(key.version.clone()))
    }
}
