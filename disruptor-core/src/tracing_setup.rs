//! Sets up `tracing` for the disruptor orchestrator and the agent binary
//!
//! Unlike the teacher's API/scaler tracing setup this has no external collector: the
//! distilled spec's Non-goals keep cluster-wide coordination and its telemetry export
//! out of scope, so this crate only ever formats to stdout/stderr.

use tracing_subscriber::prelude::*;

use crate::conf::TracingConfig;

/// Initialize the global `tracing` subscriber
///
/// # Arguments
///
/// * `name` - The service name, logged once at startup
/// * `conf` - The tracing config to apply
pub fn init(name: &str, conf: &TracingConfig) {
    let layer = tracing_subscriber::fmt::layer().with_filter(conf.level.to_filter());
    if tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .is_err()
    {
        // a subscriber is already installed (e.g. under `cargo test`); nothing to do
        return;
    }
    tracing::event!(tracing::Level::INFO, name, level = ?conf.level, "tracing initialized");
}

/// Initialize tracing from a config file, falling back to defaults when the file is absent
///
/// # Arguments
///
/// * `name` - The service name, logged once at startup
/// * `path` - The path to a YAML tracing config
pub fn init_from_file(name: &str, path: &str) {
    let conf = TracingConfig::from_file(path).unwrap_or_default();
    init(name, &conf);
}
