#![forbid(unsafe_code)]

//! Causal trace capture and deterministic replay for reconcilers over a
//! declarative object store.
//!
//! During live operation the instrumentation [`Client`] wraps an object-store
//! client, stamps causal labels on every mutation, and emits two structured
//! log streams. Offline, [`replay::parse_trace`] re-hydrates those streams
//! into an indexed corpus, builds per-reconcile cache frames, and drives the
//! original reconciler against them, detecting and interpolating missed
//! observations along the way.

pub mod cli;
pub mod client;
pub mod error;
pub mod event;
pub mod object;
pub mod replay;
pub mod sink;
pub mod snapshot;
pub mod store;
pub mod tag;
pub mod telemetry;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

// Re-export core types at crate root for convenience
pub use crate::client::{wrap, Client, ClientConfig, ReconcileContext, LOG_SNAPSHOTS_ENV};
pub use crate::event::{
    earliest, filter_reads_writes, object_change_id, CausalKey, ChangeId, Event, EventParseError,
    OpType,
};
pub use crate::object::{short_uid, DynamicObject, NamespacedName, ObjectList, ObjectMeta};
pub use crate::replay::{
    condition_predicate, parse_trace, DataEffect, Frame, FrameData, FrameType, NoopReconciler,
    PlayOutcome, Player, Predicate, ReplayClient, ReplayError, ReplayHarness, ReplayStore,
    TraceBuilder, TraceError,
};
pub use crate::sink::{BufferSink, TraceSink, TracingSink, WriterSink};
pub use crate::snapshot::{compute_delta, Delta, DeltaError, Record, VersionKey};
pub use crate::store::{
    BoxError, Context, MemoryStore, Patch, ReconcileRequest, Reconciler, StoreClient, StoreError,
};
