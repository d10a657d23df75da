//! Logging initialization and configuration.
//!
//! Uses the `tracing` ecosystem: a console layer on stderr (pretty or JSON)
//! and, for validation runs, a plain-text timestamped log file.

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the logging subsystem.
///
/// # Arguments
///
/// * `level` - Default level when `RUST_LOG` is not set.
/// * `json_format` - If true, console logs are structured JSON.
/// * `log_file` - Optional file that receives a plain-text copy of every event.
///
/// # Notes
///
/// - Console output goes to stderr (stdout is reserved for command output)
/// - The RUST_LOG environment variable can override the log level
pub fn init(level: &str, json_format: bool, log_file: Option<File>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_layer = log_file.map(|file| {
        fmt::layer()
            .with_target(false)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    });

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Initialize logging with settings from the rxstates config.
///
/// `log_path` is opened (and its directory created) when given and
/// `logging.file` is enabled. Failure to open it is reported and the run
/// continues with console logging only.
pub fn init_from_config(
    config: &rxstates_core::Config,
    verbose_override: bool,
    json_logs_override: bool,
    log_path: Option<&Path>,
) {
    let level = if verbose_override {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let json_format = json_logs_override || config.logging.format == "json";

    let log_file = log_path
        .filter(|_| config.logging.file)
        .and_then(|path| match open_log_file(path) {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("Warning: cannot write log file {}: {e}", path.display());
                None
            }
        });
    let file_path = log_file.as_ref().and(log_path);

    init(level, json_format, log_file);

    if let Some(path) = file_path {
        tracing::info!("Logging to {}", path.display());
    }
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    File::create(path)
}
