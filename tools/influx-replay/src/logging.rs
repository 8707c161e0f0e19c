use crate::config::{LogEncoding, LoggingConfig};
use crate::errors::ReplayError;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

pub const STDERR_OUTPUT: &str = "stderr";

/// Install the global subscriber described by `cfg`. `RUST_LOG` takes
/// precedence over `cfg.level`. A subscriber that is already installed is
/// left in place.
pub fn init_logging(cfg: &LoggingConfig) -> Result<(), ReplayError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.level.to_ascii_lowercase()));
    let writer = make_writer(&cfg.output)?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_file(cfg.development)
        .with_line_number(cfg.development)
        .with_target(cfg.development);

    let installed = match cfg.encoding {
        LogEncoding::Json => builder.json().with_current_span(false).try_init(),
        LogEncoding::Console => builder.with_ansi(false).try_init(),
    };
    if installed.is_err() {
        tracing::debug!("global subscriber already installed, keeping it");
    }
    Ok(())
}

fn make_writer(output: &str) -> Result<BoxMakeWriter, ReplayError> {
    if output == STDERR_OUTPUT {
        return Ok(BoxMakeWriter::new(io::stderr));
    }
    let path = Path::new(output);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| ReplayError::Logging(format!("{}: {e}", parent.display())))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ReplayError::Logging(format!("{output}: {e}")))?;
    Ok(BoxMakeWriter::new(Mutex::new(file)))
}
