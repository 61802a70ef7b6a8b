//! Shared trace fixtures.
//!
//! Two ways to build a trace: drive the real instrumentation client against
//! an in-memory store (end-to-end), or assemble canonical lines by hand when
//! a test needs precise control over versions and labels.

// not every test binary uses every fixture
#![allow(dead_code)]

use std::sync::Arc;

use sleeve::sink::canonical_line;
use sleeve::{
    tag, BufferSink, Client, Context, DynamicObject, Event, MemoryStore, NamespacedName,
    ObjectList, OpType, Record, StoreClient,
};

pub fn event_line(event: &Event) -> String {
    canonical_line(tag::CONTROLLER_OPERATION_KEY, &event.to_json())
}

pub fn record_line(obj: &DynamicObject) -> String {
    canonical_line(tag::OBJECT_VERSION_KEY, &Record::from_object(obj).to_json())
}

/// An object carrying an explicit change-id label, as a mutation through the
/// instrumentation client would have left it.
pub fn changed_object(
    kind: &str,
    name: &str,
    uid: &str,
    resource_version: &str,
    change_id: &str,
) -> DynamicObject {
    let mut obj = DynamicObject::named(kind, "default", name);
    obj.metadata.uid = uid.to_string();
    obj.metadata.resource_version = resource_version.to_string();
    obj.labels_mut()
        .insert(tag::CHANGE_ID_LABEL.to_string(), change_id.to_string());
    obj
}

pub fn read_event(
    timestamp: &str,
    reconcile_id: &str,
    controller_id: &str,
    obj: &DynamicObject,
) -> Event {
    let mut event = Event::for_object(obj, reconcile_id, controller_id, "", OpType::Get);
    event.timestamp = timestamp.to_string();
    event
}

pub fn write_event(
    timestamp: &str,
    reconcile_id: &str,
    controller_id: &str,
    obj: &DynamicObject,
) -> Event {
    let mut event = Event::for_object(obj, reconcile_id, controller_id, "", OpType::Update);
    event.timestamp = timestamp.to_string();
    event
}

/// Runs a small "Widget" controller for two reconcile invocations against an
/// in-memory store and returns the captured trace.
///
/// Invocation r1 reads the webhook-stamped Widget and creates a Gadget;
/// invocation r2 reads the Widget again, lists Gadgets, and updates one.
pub fn live_widget_trace() -> String {
    let store = MemoryStore::new();
    let mut widget = DynamicObject::named("Widget", "default", "w-1");
    widget.metadata.uid = "uid-w".to_string();
    widget.metadata.resource_version = "1".to_string();
    widget
        .labels_mut()
        .insert(tag::WEBHOOK_LABEL.to_string(), "root-1".to_string());
    store.insert(widget);

    let sink = BufferSink::new();
    let client = Client::wrap(store)
        .with_name("Widget")
        .with_sink(Arc::new(sink.clone()));

    // r1: observe the widget, derive a gadget from it
    let ctx = Context::new().with_reconcile_id("r1");
    let mut widget = DynamicObject::new("Widget");
    client
        .get(&ctx, &NamespacedName::new("default", "w-1"), &mut widget)
        .expect("widget is seeded");
    let mut gadget = DynamicObject::named("Gadget", "default", "g-1");
    client.create(&ctx, &mut gadget).expect("gadget create");

    // r2: observe both, update the gadget
    let ctx = Context::new().with_reconcile_id("r2");
    let mut widget = DynamicObject::new("Widget");
    client
        .get(&ctx, &NamespacedName::new("default", "w-1"), &mut widget)
        .expect("widget still present");
    let mut gadgets = ObjectList::new("Gadget");
    client.list(&ctx, &mut gadgets).expect("gadget list");
    let mut gadget = gadgets.items.into_iter().next().expect("one gadget");
    client.update(&ctx, &mut gadget).expect("gadget update");

    sink.contents()
}
