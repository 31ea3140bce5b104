#![deny(missing_docs)]
//! Coveralls command-line interface.
//!
//! Publishes coverage results to coveralls.io, writes the job document to a
//! file, or prints it for debugging.

mod transport;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use coveralls_core::{
    Config, ConfigOptions, CoverageReport, CoverallsError, Environment, FileSystem, GitCommand,
    Result, build_report, collect_git_info, format_summary, merge_report_file, read_coverage,
    render_json_pretty, summarize,
};
use log::{debug, error, info};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use transport::{DEFAULT_HOST, JobResponse, JobSubmitter, serialize_report, write_report};

#[derive(Parser, Debug)]
#[command(
    name = "coveralls",
    version,
    about = "Publish coverage results online via coveralls.io",
    long_about = "Builds a Coveralls job document from coverage data and submits it.\n\n\
                  Every source file in the coverage data is uploaded, so make sure \
                  nothing private is tracked."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    #[command(flatten)]
    options: GlobalArgs,
}

#[derive(Args, Clone, Debug)]
struct GlobalArgs {
    /// Provide an alternative service name to submit.
    #[arg(long, value_name = "NAME", global = true)]
    service: Option<String>,
    /// Specify configuration file [default: .coveragerc].
    #[arg(long, value_name = "FILE", global = true)]
    rcfile: Option<PathBuf>,
    /// Write report to file. Doesn't send anything.
    #[arg(long, value_name = "FILE", global = true)]
    output: Option<PathBuf>,
    /// Merge report from file when submitting.
    #[arg(long, value_name = "FILE", global = true)]
    merge: Option<PathBuf>,
    /// Print extra info, always enabled when debugging.
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Coveralls host to submit to.
    #[arg(long, env = "COVERALLS_HOST", default_value = DEFAULT_HOST, global = true)]
    host: String,
    /// Request timeout in seconds.
    #[arg(long, env = "COVERALLS_TIMEOUT", default_value_t = 30, value_name = "SECS", global = true)]
    timeout: u64,
}

#[derive(Subcommand, Clone, Debug, PartialEq, Eq)]
enum Commands {
    /// Build the report and print it without sending anything; forces verbose output.
    Debug,
}

impl Cli {
    fn verbose(&self) -> bool {
        self.options.verbose || self.command == Some(Commands::Debug)
    }
}

/// The terminal action of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Debug,
    Output(PathBuf),
    Submit,
}

impl Mode {
    /// Debug wins over `--output`, which wins over submitting.
    fn select(cli: &Cli) -> Self {
        if cli.command == Some(Commands::Debug) {
            return Self::Debug;
        }
        match cli.options.output.clone() {
            Some(path) => Self::Output(path),
            None => Self::Submit,
        }
    }

    fn token_required(&self) -> bool {
        matches!(self, Self::Submit)
    }
}

/// What a successful run did.
#[derive(Debug)]
enum Outcome {
    DryRun(CoverageReport),
    Written(PathBuf),
    Submitted(JobResponse),
}

/// Collaborators a run depends on.
struct Services<'a, F, G, S> {
    fs: &'a F,
    git: &'a G,
    env: &'a dyn Environment,
    submitter: &'a S,
    root: PathBuf,
}

#[cfg(not(test))]
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    use coveralls_core::{ProcessEnvironment, StdFileSystem, SystemGit};
    use std::time::Duration;
    use transport::ReqwestSubmitter;

    let cli = Cli::parse();
    init_logging(cli.verbose());

    let submitter = match ReqwestSubmitter::new(
        &cli.options.host,
        Duration::from_secs(cli.options.timeout),
    ) {
        Ok(submitter) => submitter,
        Err(err) => return exit_with(Err(err)),
    };
    let root = match std::env::current_dir() {
        Ok(root) => root,
        Err(err) => return exit_with(Err(err.into())),
    };
    let services = Services {
        fs: &StdFileSystem::new(),
        git: &SystemGit,
        env: &ProcessEnvironment,
        submitter: &submitter,
        root,
    };

    tokio::select! {
        biased;
        _ = tokio::signal::ctrl_c() => {
            info!("Aborted");
            ExitCode::SUCCESS
        }
        result = run(&cli, &services) => exit_with(result.and_then(|outcome| present(&outcome)).map(|_| ())),
    }
}

#[cfg(test)]
fn main() {}

#[cfg_attr(test, allow(dead_code))]
fn init_logging(verbose: bool) {
    use std::io::Write;

    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Warn)
        .filter_module("coveralls", level)
        .filter_module("coveralls_core", level)
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();
}

#[cfg_attr(test, allow(dead_code))]
fn exit_with(result: Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            if let CoverallsError::Transport {
                response: Some(body),
                ..
            } = &err
            {
                error!("response: {body}");
            }
            ExitCode::from(err.exit_code())
        }
    }
}

async fn run<F: FileSystem, G: GitCommand, S: JobSubmitter>(
    cli: &Cli,
    services: &Services<'_, F, G, S>,
) -> Result<Outcome> {
    let mode = Mode::select(cli);
    let report = prepare_report(cli, &mode, services)?;

    match mode {
        Mode::Debug => {
            info!("Testing coveralls...");
            Ok(Outcome::DryRun(report))
        }
        Mode::Output(path) => {
            info!("Write coverage report to file...");
            let path = resolve_path(&services.root, &path);
            write_report(services.fs, &path, &report)?;
            Ok(Outcome::Written(path))
        }
        Mode::Submit => {
            info!("Submitting coverage to coveralls.io...");
            let json = serialize_report(&report)?;
            let response = services.submitter.submit(&json).await?;
            Ok(Outcome::Submitted(response))
        }
    }
}

/// Print or log the result of a successful run.
///
/// Returns the lines logged at info level.
fn present(outcome: &Outcome) -> Result<Vec<String>> {
    let lines = match outcome {
        Outcome::DryRun(report) => {
            println!("{}", render_report_pretty(report)?);
            Vec::new()
        }
        Outcome::Written(path) => {
            debug!("report written to {}", path.display());
            Vec::new()
        }
        Outcome::Submitted(response) => {
            debug!("{response:?}");
            vec![
                "Coverage submitted!".to_string(),
                response.message.clone(),
                response.url.clone(),
            ]
        }
    };
    for line in &lines {
        info!("{line}");
    }
    Ok(lines)
}

/// Resolve configuration, read coverage, build the report and apply any merge.
fn prepare_report<F: FileSystem, G: GitCommand, S>(
    cli: &Cli,
    mode: &Mode,
    services: &Services<'_, F, G, S>,
) -> Result<CoverageReport> {
    let options = ConfigOptions {
        token_required: mode.token_required(),
        rcfile: cli.options.rcfile.clone(),
        service_name: cli.options.service.clone(),
        root: services.root.clone(),
    };
    let config = Config::resolve(&options, services.fs, services.env)?;
    debug!(
        "service {} reading coverage from {}",
        config.service_name,
        config.data_file.display()
    );

    let data = read_coverage(
        services.fs,
        &config.data_file,
        &config.root,
        &config.exclusions,
    )?;
    let git = collect_git_info(
        services.git,
        &config.root,
        config.ci.branch.as_deref(),
        services.env,
    );
    let mut report = build_report(&config, git, &data, services.fs, Utc::now())?;

    if let Some(path) = cli.options.merge.as_ref() {
        let path = resolve_path(&services.root, path);
        let merged = merge_report_file(&mut report, services.fs, &path)?;
        debug!("merged {merged} source files from {}", path.display());
    }

    debug!("{}", format_summary(&summarize(&report)));
    Ok(report)
}

fn render_report_pretty(report: &CoverageReport) -> Result<String> {
    render_json_pretty(report)
        .map_err(|err| CoverallsError::Unexpected(format!("report serialization failed: {err}")))
}

fn resolve_path(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
