//! Tracing subscriber setup
//!
//! Library code only emits `tracing` events. Host binaries call one of the
//! initializers below once at startup; tests call [`init_test_tracing`].
//!
//! - Console: colored, compact format
//! - File (optional): daily rotation, `sqlmux.<date>.log`

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "info,sqlmux_core=debug,sqlmux_connection=debug";

const LOG_PREFIX: &str = "sqlmux";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Install a console-only subscriber
pub fn init_tracing() -> anyhow::Result<()> {
    load_dotenv();

    let console_layer = fmt::layer()
        .with_ansi(true)
        .compact()
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(console_layer)
        .try_init()
        .context("tracing subscriber already installed")
}

/// Install console + daily rolling file layers
///
/// The returned guard flushes the file writer and must be kept alive.
pub fn init_tracing_with_file(logs_dir: &Path) -> anyhow::Result<WorkerGuard> {
    load_dotenv();

    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("failed to create logs directory {}", logs_dir.display()))?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_PREFIX)
        .filename_suffix("log")
        .build(logs_dir)
        .context("failed to create log file appender")?;
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = fmt::layer()
        .with_ansi(true)
        .compact()
        .with_target(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("tracing subscriber already installed")?;

    Ok(guard)
}

/// Subscriber for tests; output is captured by the test harness
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_test_writer()
        .try_init();
}
