//! Thin command-line front end for mutation harness binaries.
//!
//! A harness registers its mutants and tests, then hands over to
//! [`main_with`]:
//!
//! ```rust,no_run
//! use kitchensink_mutation::cli;
//! use kitchensink_mutation::mutation::{InProcessSuite, MutationRegistry};
//!
//! fn main() -> std::process::ExitCode {
//!     let registry = MutationRegistry::new();
//!     let suite = InProcessSuite::new().test("tests/smoke.rs", "smoke", || {});
//!     cli::main_with(registry, suite)
//! }
//! ```

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::mutation::{
    InProcessSuite, MutantSelection, MutationConfig, MutationRegistry, MutationReport,
    MutationRunError, ReportFormat, SubstitutionController, TestExecutor, TestOutcome, TestSelector, render_report,
    run_session,
};

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "kitchensink-mutate")]
#[command(about = "Run a test suite normally or once per declared mutant")]
pub struct Cli {
    /// Run mode.
    #[arg(long, value_enum, default_value = "test")]
    pub mode: RunMode,
    /// Test file or test-name pattern to run.
    #[arg(long)]
    pub tests: Option<String>,
    /// Mutant-definitions file (JSON).
    #[arg(long)]
    pub mutants: Option<PathBuf>,
    /// Optional substring filter over mutant target and id.
    #[arg(long)]
    pub filter: Option<String>,
    /// Optional per-test timeout in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,
    /// Report format for mutate mode.
    #[arg(long, value_enum, default_value = "md")]
    pub format: OutputFormat,
}

/// What the harness should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RunMode {
    /// Plain test pass, no mutant active.
    Test,
    /// Run the tests once per registered mutant.
    Mutate,
}

/// Report output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Markdown
    Md,
    /// JSON
    Json,
    /// JUnit XML
    Junit,
}

impl From<OutputFormat> for ReportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Md => Self::Markdown,
            OutputFormat::Json => Self::Json,
            OutputFormat::Junit => Self::Junit,
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A harness may already have installed a subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Parse process arguments, run, and map failures to an exit code.
pub fn main_with(registry: MutationRegistry, suite: InProcessSuite) -> ExitCode {
    init_tracing();
    match run_from(std::env::args_os(), registry, suite) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Parse `args` (program name first) and run. Returns `true` on success.
pub fn run_from<I, T>(args: I, registry: MutationRegistry, suite: InProcessSuite) -> Result<bool>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::try_parse_from(args)?;
    run(cli, registry, suite)
}

/// Run an already parsed command line. Returns `true` on success.
///
/// Test mode fails when any test fails; mutate mode fails when any mutant's
/// run failed or the session was interrupted. Surviving mutants alone do not
/// fail.
pub fn run(cli: Cli, mut registry: MutationRegistry, mut suite: InProcessSuite) -> Result<bool> {
    if let Some(timeout_secs) = cli.timeout_secs {
        suite = suite.with_timeout(Duration::from_secs(timeout_secs));
    }

    let selection = cli
        .mutants
        .as_deref()
        .map(|path| {
            MutantSelection::load(path)
                .with_context(|| format!("loading mutant definitions from {}", path.display()))
        })
        .transpose()?;
    let selector = cli
        .tests
        .as_deref()
        .map(TestSelector::parse)
        .or_else(|| selection.as_ref().and_then(MutantSelection::test_selector));

    match cli.mode {
        RunMode::Test => run_tests(&suite, selector.unwrap_or_else(TestSelector::all)),
        RunMode::Mutate => {
            if let Some(selector) = selector {
                registry.link_targets_to_tests(selector);
            }
            let mut config = MutationConfig::default().with_interrupt_handler(true);
            if let Some(filter) = cli.filter {
                config = config.with_filter(filter);
            }
            if let Some(selection) = selection {
                config = config.with_selection(selection);
            }

            let controller = SubstitutionController::new(&registry);
            match run_session(&controller, &suite, &config) {
                Ok(report) => {
                    println!("{}", render_report(&report, cli.format.into()));
                    Ok(session_succeeded(&report))
                }
                Err(MutationRunError::ExecutorPanicked {
                    mutant,
                    message,
                    partial,
                }) => {
                    println!("{}", render_report(&partial, cli.format.into()));
                    eprintln!("error: test executor panicked while {mutant} was active: {message}");
                    Ok(false)
                }
                Err(err) => Err(err.into()),
            }
        }
    }
}

fn session_succeeded(report: &MutationReport) -> bool {
    !report.has_run_failures() && !report.interrupted
}

fn run_tests(suite: &InProcessSuite, selector: TestSelector) -> Result<bool> {
    let results = suite.run(&selector)?;
    let mut failed = 0;
    for result in &results {
        match result.outcome {
            TestOutcome::Pass => println!("test {} ... ok", result.name),
            TestOutcome::Fail => {
                failed += 1;
                println!("test {} ... FAILED", result.name);
            }
        }
    }
    println!(
        "\ntest result: {}. {} passed; {} failed",
        if failed == 0 { "ok" } else { "FAILED" },
        results.len() - failed,
        failed
    );
    Ok(failed == 0)
}
