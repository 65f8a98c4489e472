//! Tracing configuration and log routing.
//!
//! Logs go to stdout through a compact formatter. A file layer is added when possible:
//! `CIVIDEX_LOG_FILE` names an explicit append target, and without it logs land in
//! `logs/cividex.log`. File writes go through a non-blocking writer so ingestion paths
//! never stall on disk.
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Configure tracing subscribers for stdout and optional file logging.
///
/// `RUST_LOG` controls filtering and defaults to `info`. The worker guard for the
/// non-blocking writer is stashed in a global so it lives for the whole process.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    match configure_file_writer() {
        Some(writer) => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact();
            registry.with(file_layer).init();
        }
        None => registry.init(),
    }
}

fn configure_file_writer() -> Option<NonBlocking> {
    if let Ok(path) = std::env::var("CIVIDEX_LOG_FILE") {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| eprintln!("Failed to open log file {path}: {err}"))
            .ok()?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let _ = LOG_GUARD.set(guard);
        return Some(non_blocking);
    }

    if let Err(err) = std::fs::create_dir_all("logs") {
        eprintln!("Failed to create logs directory: {err}");
        return None;
    }
    let file_appender = tracing_appender::rolling::never("logs", "cividex.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);
    Some(non_blocking)
}
