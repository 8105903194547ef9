use std::path::PathBuf;
use std::sync::Once;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

static INIT: Once = Once::new();

fn default_filter(verbose: bool) -> EnvFilter {
    let fallback = if verbose { Level::DEBUG } else { Level::INFO };
    EnvFilter::from_default_env().add_directive(fallback.into())
}

/// Initialize stdout logging. The returned guard must be held for the life
/// of the process so buffered lines flush on exit.
pub fn init_logging(verbose: bool) -> WorkerGuard {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    INIT.call_once(|| {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_filter(default_filter(verbose)),
            )
            .init();
    });

    guard
}

/// Initialize stdout logging plus a rolling log file under `log_dir`.
pub fn init_logging_with_dir(verbose: bool, log_dir: PathBuf) -> WorkerGuard {
    std::fs::create_dir_all(&log_dir).expect("Failed to create log directory");

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "collator.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    INIT.call_once(|| {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_filter(default_filter(verbose)),
            )
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file_writer)
                    .with_target(true)
                    .with_ansi(false)
                    .with_filter(default_filter(verbose)),
            )
            .init();
    });

    guard
}
