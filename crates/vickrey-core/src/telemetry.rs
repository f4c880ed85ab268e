// Tracing subscriber setup shared by every binary.

use std::fs::{File, OpenOptions};
use std::path::Path;

use anyhow::Context;
use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "vickrey=info,warn";

/// Initialize tracing. Logs go to stderr, or are appended to `log_file`
/// (without ANSI colors) when one is given. Appending lets `serve` and one-off
/// commands share a log file.
pub fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true);

    match log_file {
        Some(path) => {
            let file = open_log_file(path)?;
            let subscriber = builder
                .with_writer(file)
                .with_ansi(false)
                .with_thread_ids(true)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .context("failed to set tracing subscriber")?;
        }
        None => {
            let subscriber = builder.with_writer(std::io::stderr).finish();
            tracing::subscriber::set_global_default(subscriber)
                .context("failed to set tracing subscriber")?;
        }
    }

    Ok(())
}

fn open_log_file(path: &Path) -> anyhow::Result<File> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))
}
