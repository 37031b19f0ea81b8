//! # Logging
//!
//! Structured JSON logs through `tracing-subscriber`, one line per event.
//! Call records written by the logging interceptor are ordinary events, so
//! their fields (`requestID`, `grpc.code`, `tags`, ...) come out as JSON keys.
//!
//! The verbosity comes from `--log-level`; `RUST_LOG` directives, when set,
//! are layered on top of it, e.g. `RUST_LOG=h2=warn,tower=warn`.

use anyhow::Context;
use tracing_subscriber::{
    EnvFilter, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Builds the filter: `level` as the default directive, refined by `RUST_LOG`.
pub fn env_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

/// Installs the global subscriber. Call once, before anything logs.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_telemetry(level: LevelFilter) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_thread_ids(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339()),
        )
        .try_init()
        .context("failed to install tracing subscriber")
}
