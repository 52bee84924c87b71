//! Logging setup for the CLI.
//!
//! Human-readable events go to stderr; the same events are appended to a
//! daily-rolling file under the storage root's `logs/` directory.
//!
//! The level is `info` unless `RUST_LOG` says otherwise. Setting
//! `PRISMAE_DEBUG_LOG=1` forces `debug`.

use std::env;
use std::path::Path;

use fs_err as fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const DEBUG_ENV: &str = "PRISMAE_DEBUG_LOG";
const LOG_FILE_PREFIX: &str = "prismae.log";

fn debug_enabled() -> bool {
    env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false)
}

fn filter() -> EnvFilter {
    if debug_enabled() {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Installs the global subscriber. Keep the returned guard alive until exit
/// so buffered file output is flushed.
pub fn init(logs_dir: Option<&Path>) -> Option<WorkerGuard> {
    let stderr = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let Some(logs_dir) = logs_dir else {
        tracing_subscriber::registry().with(filter()).with(stderr).init();
        return None;
    };
    if let Err(err) = fs::create_dir_all(logs_dir) {
        tracing_subscriber::registry().with(filter()).with(stderr).init();
        tracing::warn!(error = %err, "File logging disabled");
        return None;
    }

    let appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file = fmt::layer().with_writer(writer).with_ansi(false);

    tracing_subscriber::registry()
        .with(filter())
        .with(stderr)
        .with(file)
        .init();
    Some(guard)
}
