use std::{fs, path::Path, sync::OnceLock};

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Installs the global tracing subscriber: an `EnvFilter` (default `info`),
/// a stdout layer, and, when `log_dir` is given, a daily-rotated
/// non-blocking file layer. Safe to call more than once; later calls are
/// no-ops if a subscriber is already installed.
pub fn init(log_dir: Option<&Path>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false);
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "tagdb.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false);
            if registry.with(file_layer).try_init().is_ok() {
                let _ = FILE_GUARD.set(guard);
            } else {
                // Subscriber already installed elsewhere; drop the guard so
                // the worker thread exits.
                drop(guard);
            }
        }
        None => {
            let _ = registry.try_init();
        }
    }

    Ok(())
}
