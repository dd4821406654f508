//! Tracing setup for the robot client.
//!
//! Link, reconciliation and runner messages all go through `tracing` with a
//! bracketed component prefix (`[link]`, `[reconcile]`, `[engine]`). This
//! module installs the subscriber that prints them: a console layer always,
//! and a daily-rolling file per client instance when a log directory is set.
//! `RUST_LOG` overrides the configured level, e.g.
//! `RUST_LOG=wwks_core::net=debug` to trace frames on the wire.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. Call once, before the engine starts.
///
/// - `log_level`: filter used when `RUST_LOG` is unset, e.g. `"info"`
/// - `log_dir`: directory for the rolling log file; console only when `None`
/// - `module_name`: file name prefix, normally the configured module name so
///   that several clients can share one directory
pub fn init_logging(log_level: &str, log_dir: Option<&str>, module_name: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_ansi(true);

    let Some(dir) = log_dir else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();
        return;
    };

    let file_layer = fmt::layer()
        .with_writer(tracing_appender::rolling::daily(dir, module_name))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();
}
