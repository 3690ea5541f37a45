//! Tracing subscriber setup: human-readable stdout output, plus daily
//! rolling files when `LOG_DIR` is set.

use std::io::IsTerminal;
use std::{env, sync::OnceLock};

use tracing_appender::{
    non_blocking,
    non_blocking::NonBlocking,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter,
    fmt::{fmt, time::ChronoLocal, writer::MakeWriterExt},
};

/// Keeps the non-blocking writer alive so buffered lines flush on exit.
static LOG_GUARD: OnceLock<non_blocking::WorkerGuard> = OnceLock::new();

/// sqlx logs every statement at info; keep that opt-in via RUST_LOG.
const DEFAULT_FILTER: &str = "info,sqlx=warn,hyper_util=warn";

pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let builder = fmt()
        .with_env_filter(env_filter)
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(false)
        .with_ansi(std::io::stdout().is_terminal())
        .with_level(true);

    if let Ok(dir) = env::var("LOG_DIR") {
        let stdout = std::io::stdout.with_max_level(tracing::Level::INFO);
        let writer = stdout.and(file_writer(dir));

        // The combined writer also feeds the files: no escape codes.
        builder.with_ansi(false).with_writer(writer).init();
    } else {
        builder.init();
    }

    tracing::info!("logger initialized");
}

/// Daily-rotated `riftcoach.YYYY-MM-DD.log` files, pruned to
/// `LOG_MAX_FILES` when set.
fn file_writer(dir: String) -> NonBlocking {
    let max_files = env::var("LOG_MAX_FILES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok());

    let mut file_builder = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("riftcoach")
        .filename_suffix("log");

    if let Some(n) = max_files {
        file_builder = file_builder.max_log_files(n);
    }

    let file_appender = file_builder.build(&dir).expect("failed to create log file");

    let (file_writer, guard) = non_blocking(file_appender);

    LOG_GUARD.set(guard).expect("LOG_GUARD already set");

    file_writer
}
