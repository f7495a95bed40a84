//! Telemetry initialization for embedders.
//!
//! braid itself only emits `tracing` events; installing a subscriber is
//! the embedder's choice. [`init`] wires up a stderr subscriber filtered
//! by `RUST_LOG` (default `info`); [`init_json`] does the same with JSON
//! output for log pipelines. Both tolerate an already-installed global
//! subscriber, so tests and embedding binaries can call them freely.

use tracing_subscriber::EnvFilter;

/// Install a human-readable stderr subscriber.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Install a JSON stderr subscriber.
pub fn init_json() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
