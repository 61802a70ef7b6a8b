//! Diagnostic logging setup.
//!
//! The instrumented streams have their own sink (`crate::sink`); this module
//! only wires the ordinary diagnostics. The `SLEEVE_LOG` env var takes an
//! `EnvFilter` directive and overrides the verbosity knob.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

#[derive(Clone, Copy, Debug)]
pub struct TelemetryConfig {
    pub verbosity: u8,
    pub json: bool,
}

impl TelemetryConfig {
    pub fn new(verbosity: u8) -> Self {
        Self {
            verbosity,
            json: false,
        }
    }
}

pub fn init(config: TelemetryConfig) {
    let filter = EnvFilter::builder()
        .with_default_directive(level_from_verbosity(config.verbosity).into())
        .with_env_var("SLEEVE_LOG")
        .from_env_lossy();

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = if config.json {
        Box::new(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
    } else {
        Box::new(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
    };

    // try_init so tests that race to install a subscriber don't panic
    let _ = Registry::default().with(fmt_layer).with(filter).try_init();
}

fn level_from_verbosity(verbosity: u8) -> tracing::metadata::LevelFilter {
    match verbosity {
        0 => tracing::metadata::LevelFilter::ERROR,
        1 => tracing::metadata::LevelFilter::INFO,
        _ => tracing::metadata::LevelFilter::DEBUG,
    }
}
