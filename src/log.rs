//! Structured logging for dagflow.
//!
//! Log levels:
//! - ERROR: Failures that stop an operation
//! - WARN: Recoverable problems, including every coordinator exception
//! - INFO: Lifecycle (start, recovery, finished workflows)
//! - DEBUG: Every transaction and dispatch
//!
//! Debug mode can be enabled with `--debug` or `DAGFLOW_DEBUG=1`.
//! `DAGFLOW_LOG` takes a filter directive and overrides both.

use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::CoordinatorConfig;
use crate::Result;

pub const DEBUG_ENV: &str = "DAGFLOW_DEBUG";
pub const FILTER_ENV: &str = "DAGFLOW_LOG";

pub fn log_path() -> Result<PathBuf> {
    Ok(CoordinatorConfig::dagflow_dir()?.join("dagflow.log"))
}

/// Initialize logging to ~/.dagflow/dagflow.log
pub fn init() {
    init_with_debug(false);
}

/// Initialize logging with explicit debug mode setting.
///
/// Without a home directory logging stays disabled.
pub fn init_with_debug(debug: bool) {
    let debug_enabled = debug || env_flag(std::env::var(DEBUG_ENV).ok().as_deref());
    let filter = filter(debug_enabled, std::env::var(FILTER_ENV).ok().as_deref());

    let Ok(path) = log_path() else {
        return;
    };
    if let Some(dir) = path.parent() {
        let _ = fs::create_dir_all(dir);
    }
    // Truncate file on startup
    let Ok(file) = File::create(&path) else {
        return;
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init();
}

fn env_flag(value: Option<&str>) -> bool {
    value
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn filter(debug: bool, directive: Option<&str>) -> EnvFilter {
    if let Some(Ok(filter)) = directive.map(EnvFilter::try_new) {
        return filter;
    }
    EnvFilter::new(if debug { "debug" } else { "info" })
}
