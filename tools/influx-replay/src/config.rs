use crate::errors::ReplayError;
use crate::logging::STDERR_OUTPUT;
use crate::replay::record::DEFAULT_KIND_FIELD;
use crate::replay::sequencer::{Selector, DEFAULT_MARKER};
use crate::runtime::FileSystem;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub replay_file: Option<PathBuf>,
    pub kind: Option<String>,
    pub iterations: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AppConfig {
    pub replay: ReplayConfig,
    pub job: JobConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplayConfig {
    /// Replay file; when unset the live backend is used.
    pub file: Option<PathBuf>,
    pub marker: String,
    pub kind_field: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobConfig {
    pub kind: String,
    pub iterations: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogEncoding {
    Json,
    Console,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub encoding: LogEncoding,
    /// Adds source file and line to every event.
    pub development: bool,
    /// `"stderr"` or a file path to append to.
    pub output: String,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            file: None,
            marker: DEFAULT_MARKER.to_string(),
            kind_field: DEFAULT_KIND_FIELD.to_string(),
        }
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            kind: "capped".to_string(),
            iterations: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            encoding: LogEncoding::Json,
            development: false,
            output: "stderr".to_string(),
        }
    }
}

impl AppConfig {
    pub fn selector(&self) -> Selector {
        Selector::new(self.job.kind.clone()).with_marker(self.replay.marker.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialAppConfig {
    replay: Option<PartialReplayConfig>,
    job: Option<PartialJobConfig>,
    logging: Option<PartialLoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialReplayConfig {
    file: Option<PathBuf>,
    marker: Option<String>,
    kind_field: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialJobConfig {
    kind: Option<String>,
    iterations: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialLoggingConfig {
    level: Option<String>,
    encoding: Option<LogEncoding>,
    development: Option<bool>,
    output: Option<String>,
}

/// Relative paths (`--config`, `replay.file`, `logging.output`) are resolved
/// against `process_cwd`.
pub fn load_config(
    overrides: &CliOverrides,
    process_cwd: &Path,
    fs: &dyn FileSystem,
) -> Result<AppConfig, ReplayError> {
    let mut cfg = AppConfig::default();

    if let Some(path) = &overrides.config_path {
        let file_contents = fs.read_to_string(&absolutize_path(process_cwd, path))?;
        let partial: PartialAppConfig = toml::from_str(&file_contents)
            .map_err(|e| ReplayError::ConfigParse(e.to_string()))?;
        merge_partial_config(&mut cfg, partial);
    }

    apply_cli_overrides(&mut cfg, overrides);

    if let Some(file) = &cfg.replay.file {
        cfg.replay.file = Some(absolutize_path(process_cwd, file));
    }
    if cfg.logging.output != STDERR_OUTPUT && !cfg.logging.output.trim().is_empty() {
        let output = absolutize_path(process_cwd, Path::new(&cfg.logging.output));
        cfg.logging.output = output.display().to_string();
    }
    validate_config(&cfg)?;
    Ok(cfg)
}

fn merge_partial_config(cfg: &mut AppConfig, partial: PartialAppConfig) {
    if let Some(replay) = partial.replay {
        if let Some(file) = replay.file {
            cfg.replay.file = Some(file);
        }
        if let Some(marker) = replay.marker {
            cfg.replay.marker = marker;
        }
        if let Some(kind_field) = replay.kind_field {
            cfg.replay.kind_field = kind_field;
        }
    }

    if let Some(job) = partial.job {
        if let Some(kind) = job.kind {
            cfg.job.kind = kind;
        }
        if let Some(iterations) = job.iterations {
            cfg.job.iterations = iterations;
        }
    }

    if let Some(logging) = partial.logging {
        if let Some(value) = logging.level {
            cfg.logging.level = value;
        }
        if let Some(value) = logging.encoding {
            cfg.logging.encoding = value;
        }
        if let Some(value) = logging.development {
            cfg.logging.development = value;
        }
        if let Some(value) = logging.output {
            cfg.logging.output = value;
        }
    }
}

fn apply_cli_overrides(cfg: &mut AppConfig, overrides: &CliOverrides) {
    if let Some(file) = &overrides.replay_file {
        cfg.replay.file = Some(file.clone());
    }
    if let Some(kind) = &overrides.kind {
        cfg.job.kind = kind.clone();
    }
    if let Some(iterations) = overrides.iterations {
        cfg.job.iterations = iterations;
    }
}

fn absolutize_path(base: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        base.join(value)
    }
}

fn validate_config(cfg: &AppConfig) -> Result<(), ReplayError> {
    if cfg.replay.marker.is_empty() {
        return Err(ReplayError::InvalidConfig(
            "replay.marker must not be empty".to_string(),
        ));
    }

    if cfg.replay.kind_field.trim().is_empty() {
        return Err(ReplayError::InvalidConfig(
            "replay.kind_field must name a json field".to_string(),
        ));
    }

    if cfg.job.iterations == 0 {
        return Err(ReplayError::InvalidConfig(
            "job.iterations must be greater than zero".to_string(),
        ));
    }

    let level = cfg.logging.level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        return Err(ReplayError::InvalidConfig(format!(
            "logging.level must be one of {}, got {:?}",
            LOG_LEVELS.join("|"),
            cfg.logging.level
        )));
    }

    if cfg.logging.output.trim().is_empty() {
        return Err(ReplayError::InvalidConfig(
            "logging.output must be \"stderr\" or a file path".to_string(),
        ));
    }

    Ok(())
}
