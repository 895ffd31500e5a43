use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn build_filter(verbose: bool, quiet_level: &str) -> EnvFilter {
    // RUST_LOG wins; otherwise `quiet_level`, or debug for our own crate when verbose
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("info,chorus=debug")
        } else {
            EnvFilter::new(quiet_level)
        }
    })
}

/// Initialize logging to stderr (non-interactive commands).
/// Only warnings unless verbose, so piped output stays clean.
pub fn init_logger(verbose: bool) {
    let _ = tracing_subscriber::registry()
        .with(build_filter(verbose, "warn"))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false)
                .compact(),
        )
        .try_init();
}

/// Initialize logging into a file so the terminal UI is left alone.
/// Falls back to discarding output if the file cannot be opened.
pub fn init_file_logger(path: &Path, verbose: bool) {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => {
            let _ = tracing_subscriber::registry()
                .with(build_filter(verbose, "info"))
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(Mutex::new(file))
                        .with_ansi(false)
                        .with_target(true),
                )
                .try_init();
        }
        Err(_) => {
            let _ = tracing_subscriber::registry()
                .with(build_filter(verbose, "info"))
                .with(tracing_subscriber::fmt::layer().with_writer(io::sink))
                .try_init();
        }
    }
}

/// Progress indicator for startup sequence
pub fn log_progress(step: usize, total: usize, message: impl std::fmt::Display) {
    eprintln!("[{}/{}] -> {}", step, total, message);
}
