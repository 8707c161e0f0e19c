pub mod backend;
pub mod config;
pub mod errors;
pub mod job;
pub mod logging;
pub mod replay;
pub mod runtime;

use backend::{DatumRouter, OfflineBackend};
use clap::{error::ErrorKind, CommandFactory, Parser};
use config::{load_config, CliOverrides};
use errors::ReplayError;
use job::{run_job, summary_line};
use logging::init_logging;
use replay::sequencer::ReplaySequencer;
use runtime::{install_interrupt_handler, CancelSignal, ProductionRuntime};

#[derive(Debug, Clone, Parser)]
#[command(name = "influx-replay")]
#[command(about = "Run the QA job against a replay file of logged results instead of InfluxDB")]
pub struct Cli {
    /// File of JSON log lines to replay instead of querying the live backend
    #[arg(long)]
    pub replay: Option<std::path::PathBuf>,
    #[arg(long)]
    pub config: Option<std::path::PathBuf>,
    /// Kind of record the job asks for
    #[arg(long)]
    pub kind: Option<String>,
    #[arg(long)]
    pub iterations: Option<u32>,
}

pub fn run() -> Result<i32, ReplayError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let cwd = std::env::current_dir().map_err(|e| ReplayError::Io(e.to_string()))?;
    let runtime = ProductionRuntime::new();
    run_with_runtime(&args, &cwd, &runtime, None)
}

/// `cancel` replaces the SIGINT/SIGTERM handler when given.
pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    cwd: &std::path::Path,
    runtime: &ProductionRuntime,
    cancel: Option<CancelSignal>,
) -> Result<i32, ReplayError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                runtime.terminal.write_line(error.to_string().trim_end())?;
                return Ok(0);
            }
            _ => return Err(ReplayError::Cli(error.to_string())),
        },
    };

    let overrides = CliOverrides {
        config_path: cli.config.clone(),
        replay_file: cli.replay.clone(),
        kind: cli.kind.clone(),
        iterations: cli.iterations,
    };
    let cfg = load_config(&overrides, cwd, runtime.file_system.as_ref())?;
    init_logging(&cfg.logging)?;

    let mut sequencer = ReplaySequencer::with_kind_field(cfg.replay.kind_field.clone());
    if let Some(file) = &cfg.replay.file {
        // No fallback to the live backend: a bad replay path aborts startup.
        sequencer.activate(file)?;
    }

    let cancel = match cancel {
        Some(cancel) => cancel,
        None => install_interrupt_handler()?,
    };

    let mut router = DatumRouter::new(sequencer, OfflineBackend);
    let outcome = run_job(&mut router, &cfg.selector(), cfg.job.iterations, &cancel);
    router.close();
    let summary = outcome?;

    runtime.terminal.write_line(&summary_line(&summary))?;
    Ok(0)
}

pub fn render_help() -> String {
    Cli::command().render_long_help().to_string()
}
