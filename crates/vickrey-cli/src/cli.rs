//! Entry point shared by the binary.

use std::path::PathBuf;

use anyhow::Result;

use vickrey_core::telemetry::init_tracing;

use crate::actions::Action;
use crate::commands::{self, ARG_LOG_FILE};
use crate::dispatch;

/// Parse arguments, set up logging and resolve the action to run.
///
/// # Errors
/// Returns an error if logging cannot be initialized or the configuration is
/// invalid.
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    let log_file = matches.get_one::<PathBuf>(ARG_LOG_FILE);
    init_tracing(log_file.map(PathBuf::as_path))?;

    dispatch::handler(&matches)
}
