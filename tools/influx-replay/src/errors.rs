use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("replay file not found: {0}")]
    FileNotFound(String),
    #[error("permission denied opening replay file: {0}")]
    FilePermission(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("replay is not active: activate a replay file before requesting runs")]
    NotActive,
    #[error("replay is already active on {0}")]
    AlreadyActive(String),
    #[error("replay cancelled")]
    Cancelled,
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("logging error: {0}")]
    Logging(String),
}

impl ReplayError {
    /// Classify a failure to open `path` into the activation error taxonomy.
    pub fn from_open(path: &Path, error: io::Error) -> Self {
        let shown = path.display().to_string();
        match error.kind() {
            io::ErrorKind::NotFound => Self::FileNotFound(shown),
            io::ErrorKind::PermissionDenied => Self::FilePermission(shown),
            _ => Self::Io(format!("{shown}: {error}")),
        }
    }
}
