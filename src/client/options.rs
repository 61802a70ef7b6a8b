//! Instrumentation client configuration.

use std::collections::BTreeMap;
use std::time::Duration;

/// Enables (`1`) or disables (`0`) the object-version stream.
pub const LOG_SNAPSHOTS_ENV: &str = "SLEEVE_LOG_SNAPSHOTS";

#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Emit a full object snapshot alongside every operation event.
    pub log_object_snapshots: bool,
    pub(crate) visibility_delay_by_kind: BTreeMap<String, Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            log_object_snapshots: true,
            visibility_delay_by_kind: BTreeMap::new(),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_object_snapshots(mut self, on: bool) -> Self {
        self.log_object_snapshots = on;
        self
    }

    /// Suppresses freshly-created objects of `kind` from reads for `delay`
    /// after their creation timestamp, to surface ordering assumptions.
    pub fn visibility_delay(mut self, kind: impl Into<String>, delay: Duration) -> Self {
        self.visibility_delay_by_kind.insert(kind.into(), delay);
        self
    }

    /// Applies environment overrides on top of the current values.
    pub fn from_env(mut self) -> Self {
        if let Ok(raw) = std::env::var(LOG_SNAPSHOTS_ENV) {
            self.log_object_snapshots = raw == "1";
            tracing::debug!(
                target: "sleeve",
                value = %raw,
                "configuring snapshot logging from env"
            );
        }
        self
    }

    pub(crate) fn delay_for(&self, kind: &str) -> Option<Duration> {
        self.visibility_delay_by_kind.get(kind).copied()
    }
}
