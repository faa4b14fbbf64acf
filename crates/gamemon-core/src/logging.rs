//! File logging for both binaries.
//!
//! The host's stdout carries native-messaging frames, so neither process
//! may log to the console.

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::error::Result;

/// Install a global subscriber writing plain-text lines to `path`.
///
/// The file is truncated on every start. `RUST_LOG` takes precedence over
/// `default_directive` (e.g. `"gamemon=info"`).
pub fn init_file_logging(path: &Path, default_directive: &str) -> Result<()> {
    let file = File::create(path)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_thread_names(true)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e.to_string()))?;

    Ok(())
}
