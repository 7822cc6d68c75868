//! toolsetup - installs and checks the tooling a deployment machine needs.
//!
//! Usage:
//!   toolsetup setup [--plan FILE] [--yes]    Install every missing tool
//!   toolsetup check [--plan FILE]            Report which tools are missing
//!   toolsetup run -- PROGRAM [ARGS...]       Run a single command

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_pipeline_tools::{
    Answer, CommandSpec, DEFAULT_SUDO, ExecOptions, Executor, InstallPlan, InstallReport, Platform,
    Sequencer, SequencerConfig, StdinMode, ToolOutcome, prompt_yes_no,
};
use tracing::{error, info};

/// toolsetup - installs and checks deployment tooling
#[derive(Parser)]
#[command(name = "toolsetup")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install every tool of the plan that is not yet present
    Setup {
        /// JSON install plan (default: built-in plan for this platform)
        #[arg(long, value_name = "FILE")]
        plan: Option<PathBuf>,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,

        /// Deadline for every single command, in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// sudo used by the built-in Linux plan
        #[arg(long, value_name = "PATH", default_value = DEFAULT_SUDO)]
        sudo: String,
    },

    /// Report which tools of the plan are missing, without installing anything
    Check {
        /// JSON install plan (default: built-in plan for this platform)
        #[arg(long, value_name = "FILE")]
        plan: Option<PathBuf>,
    },

    /// Run a single command and exit with its exit code
    Run {
        /// Deadline in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// The program followed by its arguments
        #[arg(required = true, last = true, value_name = "COMMAND")]
        command: Vec<String>,
    },
}

type CliResult = Result<ExitCode, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Setup {
            plan,
            yes,
            timeout,
            sudo,
        } => setup(plan, yes, timeout, &sudo).await,
        Commands::Check { plan } => check(plan).await,
        Commands::Run { timeout, command } => run(timeout, command).await,
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "toolsetup failed");
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn exec_options(timeout: Option<u64>) -> ExecOptions {
    match timeout {
        Some(secs) => ExecOptions::default().timeout(Duration::from_secs(secs)),
        None => ExecOptions::default(),
    }
}

fn load_plan(path: Option<PathBuf>, sudo: &str) -> Result<InstallPlan, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        info!(path = %path.display(), "Loading install plan");
        return Ok(InstallPlan::from_json_file(path)?);
    }

    let platform = Platform::detect();
    InstallPlan::for_platform(&platform, sudo).ok_or_else(|| {
        format!(
            "No built-in install plan for platform '{}', pass one with --plan",
            platform.as_str()
        )
        .into()
    })
}

fn print_report(report: &InstallReport) {
    for tool in &report.tools {
        match tool.outcome {
            ToolOutcome::AlreadySatisfied => println!("{}: already installed", tool.tool),
            ToolOutcome::Installed { steps } => {
                println!("{}: installed ({steps} steps)", tool.tool)
            }
            ToolOutcome::Missing => println!("{}: missing", tool.tool),
        }
    }
}

async fn setup(plan: Option<PathBuf>, yes: bool, timeout: Option<u64>, sudo: &str) -> CliResult {
    let plan = load_plan(plan, sudo)?;
    let sequencer = Sequencer::new(SequencerConfig::new(plan).exec_options(exec_options(timeout)));

    if !yes {
        let report = sequencer.check().await;
        let missing: Vec<&str> = report.missing().collect();
        if missing.is_empty() {
            print_report(&report);
            return Ok(ExitCode::SUCCESS);
        }

        println!("Missing tools: {}", missing.join(", "));
        let answer = prompt_yes_no(
            std::io::stdin().lock(),
            std::io::stdout(),
            "Install missing tools?",
        )?;
        match answer {
            Answer::Yes => {}
            Answer::No => {
                println!("Nothing installed");
                return Ok(ExitCode::SUCCESS);
            }
            Answer::Invalid => {
                eprintln!("Invalid answer, expected 'yes' or 'no'");
                return Ok(ExitCode::from(2));
            }
        }
    }

    match sequencer.run().await {
        Ok(report) => {
            print_report(&report);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("{err}");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn check(plan: Option<PathBuf>) -> CliResult {
    let plan = load_plan(plan, DEFAULT_SUDO)?;
    let report = Sequencer::new(SequencerConfig::new(plan)).check().await;
    print_report(&report);

    match report.missing().next() {
        Some(_) => Ok(ExitCode::FAILURE),
        None => Ok(ExitCode::SUCCESS),
    }
}

async fn run(timeout: Option<u64>, command: Vec<String>) -> CliResult {
    let spec = CommandSpec::try_from(command)?;
    let executor = Executor::with_options(exec_options(timeout).stdin(StdinMode::Inherit));
    let result = executor.execute(&spec).await;

    if !result.stdout.is_empty() {
        println!("{}", result.stdout);
    }
    if !result.stderr.is_empty() {
        eprintln!("{}", result.stderr);
    }
    if result.timed_out {
        eprintln!("Timed out running '{spec}'");
    }

    Ok(ExitCode::from(process_exit_code(result.exit_code)))
}

/// Signal terminations (negative codes) are reported like a shell does, as `128 + signum`.
fn process_exit_code(code: i32) -> u8 {
    let code = match code {
        0..=255 => code,
        -127..=-1 => 128 - code,
        _ => 1,
    };
    u8::try_from(code).unwrap_or(1)
}
