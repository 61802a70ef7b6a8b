use thiserror::Error;

use crate::replay::{ReplayError, TraceError};
use crate::store::StoreError;

/// Crate-level convenience error.
///
/// A thin wrapper over the canonical per-concern errors. Programming errors
/// (a client shared across parallel reconcilers, a missing reconcile or frame
/// id in the call context, a label sanity violation) never reach this type:
/// they are fatal.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error("reading trace input: {0}")]
    Io(#[from] std::io::Error),
}
