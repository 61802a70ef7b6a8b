use sleeve::{cli, telemetry};

fn main() {
    let cli = cli::parse_from(std::env::args_os());

    // CLI output rides on info-level diagnostics, so default to -v
    let config = telemetry::TelemetryConfig::new(cli.verbose.saturating_add(1));
    telemetry::init(config);

    if let Err(e) = cli::run(cli) {
        tracing::error!("error: {e}");
        std::process::exit(1);
    }
}
