//! Offline replay: re-hydrates a trace into an indexed corpus, reconstructs
//! per-reconcile read sets into immutable frames, and drives a reconciler
//! against them.

mod builder;
mod client;
mod effects;
mod frame;
mod harness;
mod parse;
mod predicate;
mod store;
mod synthesizer;

pub use builder::{parse_trace, TraceBuilder, TraceError};
pub use client::ReplayClient;
pub use effects::DataEffect;
pub use frame::{Frame, FrameData, FrameType};
pub use harness::{NoopReconciler, PlayOutcome, Player, ReplayError, ReplayHarness};
pub use parse::{events_from_lines, records_from_lines};
pub use predicate::{condition_predicate, Predicate};
pub use store::ReplayStore;
