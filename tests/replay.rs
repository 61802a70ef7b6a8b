//! End-to-end replay tests: trace to harness to player, missed-observation
//! detection, and synthetic-frame interpolation.

mod fixtures;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sleeve::{
    parse_trace, tag, BoxError, CausalKey, ChangeId, Context, DynamicObject, FrameType,
    NoopReconciler, PlayOutcome, ReconcileRequest, Reconciler, ReplayClient, StoreClient,
    TraceError,
};

use fixtures::{changed_object, event_line, live_widget_trace, read_event, record_line, write_event};

#[test]
fn harness_reconstructs_frames_from_live_trace() {
    let trace = live_widget_trace();
    let builder = parse_trace(trace.as_bytes()).expect("trace parses");
    assert!(builder.reconciler_ids().contains("Widget"));

    let harness = builder.build_harness("Widget").expect("harness builds");
    assert_eq!(harness.frames().len(), 2);

    // frames are totally ordered by sequence id
    for pair in harness.frames().windows(2) {
        assert!(pair[0].sequence_id() <= pair[1].sequence_id());
    }

    // every frame's request names the widget the controller reconciles
    for frame in harness.frames() {
        assert_eq!(frame.frame_type, FrameType::Traced);
        assert_eq!(frame.req.namespaced_name.name, "w-1");
        assert_eq!(frame.tracey_root_id, "root-1");
    }

    // every read resolves to the exact version in the frame's cache
    for frame in harness.frames() {
        let data = harness.frame_data(&frame.id).expect("frame data");
        let effect = harness.traced_effect(&frame.id).expect("traced effect");
        for read in &effect.reads {
            let obj = data
                .get(&read.kind)
                .and_then(|objs| objs.values().find(|o| o.uid() == read.object_id))
                .expect("read object present in frame");
            assert_eq!(obj.resource_version(), read.version);
        }
    }
}

#[test]
fn read_event_without_snapshot_rejects_the_trace() {
    let widget = changed_object("Widget", "w-1", "uid-w", "9", "c-unseen");
    let lines = event_line(&read_event("0010", "r1", "Widget", &widget));
    let err = parse_trace(lines.as_bytes()).unwrap_err();
    assert!(matches!(err, TraceError::MissingSnapshot(_)));
}

#[test]
fn unknown_controller_is_rejected() {
    let trace = live_widget_trace();
    let builder = parse_trace(trace.as_bytes()).unwrap();
    assert!(matches!(
        builder.build_harness("Nonesuch"),
        Err(TraceError::UnknownController(_))
    ));
}

/// A controller whose read set never contains its own kind has no request
/// anchor.
#[test]
fn harness_requires_a_request_anchor() {
    let gadget = changed_object("Gadget", "g-1", "uid-g", "1", "c-a");
    let trace = [
        record_line(&gadget),
        event_line(&read_event("0010", "o1", "Other", &gadget)),
        event_line(&write_event("0011", "o1", "Other", &gadget)),
    ]
    .join("\n");
    let builder = parse_trace(trace.as_bytes()).unwrap();
    assert!(matches!(
        builder.build_harness("Other"),
        Err(TraceError::NoRequestAnchor(_))
    ));
}

fn detection_trace() -> String {
    let mut widget = DynamicObject::named("Widget", "default", "w-1");
    widget.metadata.uid = "uid-w".to_string();
    widget.metadata.resource_version = "1".to_string();
    widget
        .labels_mut()
        .insert(tag::WEBHOOK_LABEL.to_string(), "root-1".to_string());

    let gadget_a = changed_object("Gadget", "g-1", "uid-g", "1", "c-a");
    let gadget_b = changed_object("Gadget", "g-1", "uid-g", "2", "c-b");
    let gadget_c = changed_object("Gadget", "g-1", "uid-g", "3", "c-c");

    [
        record_line(&widget),
        record_line(&gadget_a),
        record_line(&gadget_b),
        record_line(&gadget_c),
        // the Widget controller observes versions a and c, never b
        event_line(&read_event("0010", "r1", "Widget", &widget)),
        event_line(&read_event("0011", "r1", "Widget", &gadget_a)),
        event_line(&read_event("0013", "r1", "Widget", &gadget_c)),
        event_line(&write_event("0014", "r1", "Widget", &widget)),
        // a different controller did observe version b
        event_line(&read_event("0012", "o1", "Other", &gadget_b)),
    ]
    .join("\n")
}

#[test]
fn detection_reports_unobserved_causal_keys() {
    let trace = detection_trace();
    let builder = parse_trace(trace.as_bytes()).unwrap();

    let missed = builder.find_missed_observations("Widget").unwrap();
    let missed_gadgets = &missed["Gadget"];
    assert_eq!(missed_gadgets.len(), 1);
    let key = missed_gadgets.iter().next().unwrap();
    assert_eq!(key.object_id, "uid-g");
    assert_eq!(key.version, ChangeId::new("c-b"));

    // the controller's own kind was fully observed
    assert!(missed["Widget"].is_empty());
}

#[test]
fn interpolation_inserts_a_synthetic_frame_carrying_the_missed_version() {
    let trace = detection_trace();
    let builder = parse_trace(trace.as_bytes()).unwrap();

    let missed: BTreeSet<CausalKey> = builder
        .find_missed_observations("Widget")
        .unwrap()
        .into_values()
        .flatten()
        .collect();
    assert_eq!(missed.len(), 1);

    let harness = builder.interpolate_frames("Widget", &missed).unwrap();
    assert_eq!(harness.frames().len(), 2);

    // order is preserved after insertion
    for pair in harness.frames().windows(2) {
        assert!(pair[0].sequence_id() <= pair[1].sequence_id());
    }

    let synthetic = harness
        .frames()
        .iter()
        .find(|f| f.frame_type == FrameType::Synthetic)
        .expect("one synthetic frame");
    // inserted at the timestamp the missed version was first read
    assert_eq!(synthetic.sequence_id(), "0012");
    // request and root carried over from the anchor frame
    assert_eq!(synthetic.req.namespaced_name.name, "w-1");

    // the synthetic frame force-feeds the missed version
    let data = harness.frame_data(&synthetic.id).expect("synthetic data");
    let gadget = &data["Gadget"][&sleeve::NamespacedName::new("default", "g-1")];
    assert_eq!(gadget.resource_version(), "2");
    assert_eq!(gadget.label(tag::CHANGE_ID_LABEL), Some("c-b"));
}

#[test]
fn interpolation_fails_without_an_anchor_object() {
    // the missed kind never appears in any of the controller's frames
    let mut widget = DynamicObject::named("Widget", "default", "w-1");
    widget.metadata.uid = "uid-w".to_string();
    widget.metadata.resource_version = "1".to_string();
    widget
        .labels_mut()
        .insert(tag::WEBHOOK_LABEL.to_string(), "root-1".to_string());
    let sprocket = changed_object("Sprocket", "s-1", "uid-s", "1", "c-s");

    let trace = [
        record_line(&widget),
        record_line(&sprocket),
        event_line(&read_event("0010", "r1", "Widget", &widget)),
        event_line(&write_event("0011", "r1", "Widget", &widget)),
        event_line(&read_event("0012", "o1", "Other", &sprocket)),
    ]
    .join("\n");
    let builder = parse_trace(trace.as_bytes()).unwrap();

    let mut missed = BTreeSet::new();
    missed.insert(CausalKey {
        kind: "Sprocket".to_string(),
        object_id: "uid-s".to_string(),
        version: ChangeId::new("c-s"),
    });
    let err = builder.interpolate_frames("Widget", &missed).unwrap_err();
    assert!(matches!(
        err,
        TraceError::MissingInterpolationAnchor { .. }
    ));
}

struct ScriptedReconciler {
    client: ReplayClient,
    invocations: Arc<AtomicUsize>,
}

impl Reconciler for ScriptedReconciler {
    fn reconcile(&mut self, ctx: &Context, req: &ReconcileRequest) -> Result<(), BoxError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let mut widget = DynamicObject::new("Widget");
        self.client.get(ctx, &req.namespaced_name, &mut widget)?;
        let mut gadget = DynamicObject::named("Gadget", "default", "g-1");
        self.client.create(ctx, &mut gadget)?;
        Ok(())
    }
}

#[test]
fn player_serves_frozen_reads_and_records_effects() {
    let trace = live_widget_trace();
    let builder = parse_trace(trace.as_bytes()).unwrap();
    let harness = builder.build_harness("Widget").unwrap();

    let invocations = Arc::new(AtomicUsize::new(0));
    let reconciler = ScriptedReconciler {
        client: harness.replay_client(),
        invocations: Arc::clone(&invocations),
    };
    let mut player = harness.load(reconciler);
    let outcome = player.play().unwrap();
    assert_eq!(outcome, PlayOutcome::Completed);
    assert_eq!(invocations.load(Ordering::SeqCst), 2);

    // each played frame recorded one read and one write
    let harness = player.harness();
    for frame in harness.frames() {
        let effect = harness.replay_effect(&frame.id).expect("replayed effect");
        assert_eq!(effect.reads.len(), 1);
        assert_eq!(effect.writes.len(), 1);
        // the frozen read matches the traced version exactly
        let traced_widget_read = harness
            .traced_effect(&frame.id)
            .unwrap()
            .reads
            .iter()
            .find(|e| e.kind == "Widget")
            .unwrap()
            .clone();
        assert_eq!(effect.reads[0].version, traced_widget_read.version);
        assert_eq!(effect.reads[0].root_event_id, "<REPLAY>");
    }
}

#[test]
fn player_skips_pure_read_traced_frames() {
    // r-idle only reads; it must not be replayed
    let mut widget = DynamicObject::named("Widget", "default", "w-1");
    widget.metadata.uid = "uid-w".to_string();
    widget.metadata.resource_version = "1".to_string();
    widget
        .labels_mut()
        .insert(tag::WEBHOOK_LABEL.to_string(), "root-1".to_string());

    let trace = [
        record_line(&widget),
        event_line(&read_event("0010", "r-idle", "Widget", &widget)),
        event_line(&read_event("0020", "r-write", "Widget", &widget)),
        event_line(&write_event("0021", "r-write", "Widget", &widget)),
    ]
    .join("\n");
    let builder = parse_trace(trace.as_bytes()).unwrap();
    let harness = builder.build_harness("Widget").unwrap();
    assert_eq!(harness.frames().len(), 2);

    let invocations = Arc::new(AtomicUsize::new(0));
    let reconciler = ScriptedReconciler {
        client: harness.replay_client(),
        invocations: Arc::clone(&invocations),
    };
    let mut player = harness.load(reconciler);
    player.play().unwrap();
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[test]
fn satisfied_predicate_ends_the_run_early() {
    let trace = live_widget_trace();
    let builder = parse_trace(trace.as_bytes()).unwrap();
    let harness = builder
        .build_harness("Widget")
        .unwrap()
        .with_predicate(Box::new(|obj| obj.kind() == "Gadget"));

    let invocations = Arc::new(AtomicUsize::new(0));
    let reconciler = ScriptedReconciler {
        client: harness.replay_client(),
        invocations: Arc::clone(&invocations),
    };
    let mut player = harness.load(reconciler);
    let outcome = player.play().unwrap();
    assert_eq!(outcome, PlayOutcome::PredicateSatisfied);
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[test]
fn noop_reconciler_replays_cleanly() {
    let trace = live_widget_trace();
    let builder = parse_trace(trace.as_bytes()).unwrap();
    let harness = builder.build_harness("Widget").unwrap();
    let mut player = harness.load(NoopReconciler);
    assert_eq!(player.play().unwrap(), PlayOutcome::Completed);
}
