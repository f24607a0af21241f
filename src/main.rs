#![warn(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::uninlined_format_args
)]

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use robogo::actions::ActionRegistry;
use robogo::engine::case::RunOptions;
use robogo::engine::shutdown::{DEFAULT_GRACE, SIGNAL_EXIT_CODE, Shutdown};
use robogo::engine::suite::run_suite;
use robogo::model::{ParallelConfig, SuiteResult, TestCase};
use robogo::parser::{self, Document};
use robogo::report;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

/// Robogo: declarative integration-test automation.
#[derive(Parser, Debug)]
#[command(name = "robogo")]
#[command(version)]
#[command(about = "Run declarative integration-test cases and suites", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one or more test case / suite documents
    Run {
        /// Paths to YAML documents
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Fan suite cases out onto a bounded worker pool
        #[arg(long)]
        parallel: bool,

        /// Worker pool size (implies --parallel)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Log the variable snapshot after every step
        #[arg(long)]
        debug_vars: bool,

        /// Suppress the console report
        #[arg(long)]
        silent: bool,

        /// Load KEY=VALUE pairs from this file before running
        #[arg(long)]
        env: Option<PathBuf>,

        /// Write the machine-readable JSON report to this path
        #[arg(long)]
        report_json: Option<PathBuf>,

        /// Write a JUnit XML report to this path
        #[arg(long)]
        report_junit: Option<PathBuf>,
    },

    /// List registered actions with their descriptions
    List,

    /// Print action names starting with the given prefix
    Completions {
        #[arg(default_value = "")]
        prefix: String,
    },
}

/// One runnable unit: a standalone case wrapped as a single-case suite, or
/// a resolved suite document.
struct RunUnit {
    name: String,
    cases: Vec<TestCase>,
    parallel: ParallelConfig,
}

fn init_tracing(silent: bool) {
    let default_filter = if silent { "error" } else { "info" };
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn load_units(paths: &[PathBuf]) -> Result<Vec<RunUnit>> {
    let mut units = Vec::with_capacity(paths.len());
    for path in paths {
        let base_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        match parser::load_document(path)? {
            Document::Case(case) => units.push(RunUnit {
                name: case.name.clone(),
                cases: vec![case],
                parallel: ParallelConfig::default(),
            }),
            Document::Suite(suite) => {
                let loaded = parser::resolve_suite(suite, &base_dir)?;
                units.push(RunUnit {
                    name: loaded.name,
                    cases: loaded.cases,
                    parallel: loaded.parallel,
                });
            }
        }
    }
    Ok(units)
}

#[allow(clippy::too_many_arguments)]
async fn run_command(
    paths: Vec<PathBuf>,
    parallel: bool,
    concurrency: Option<usize>,
    debug_vars: bool,
    silent: bool,
    env: Option<PathBuf>,
    report_json: Option<PathBuf>,
    report_junit: Option<PathBuf>,
) -> Result<i32> {
    // .env in the working directory first, then an explicit file; the
    // process environment always wins over both.
    let default_env = Path::new(".env");
    if default_env.is_file() {
        robogo::envfile::load_env_file(default_env)?;
    }
    if let Some(env_path) = &env {
        robogo::envfile::load_env_file(env_path)?;
    }

    if let Some(limit) = concurrency {
        if limit < 1 {
            bail!("--concurrency must be at least 1");
        }
    }

    let mut units = load_units(&paths)?;
    for unit in &mut units {
        if parallel || concurrency.is_some() {
            unit.parallel.enabled = true;
        }
        if let Some(limit) = concurrency {
            unit.parallel.max_concurrency = limit;
        }
    }

    let shutdown = Shutdown::new();
    shutdown.listen_for_signals();
    let token = shutdown.token();
    let registry = Arc::new(ActionRegistry::with_builtins());

    let work = async move {
        let mut results: Vec<SuiteResult> = Vec::with_capacity(units.len());
        for unit in units {
            let options = RunOptions {
                debug_vars,
                ..RunOptions::default()
            };
            let result = run_suite(
                &unit.name,
                unit.cases,
                &unit.parallel,
                Arc::clone(&registry),
                token.child_token(),
                options,
            )
            .await;
            results.push(result);
        }
        results
    };

    let results = shutdown.supervise(DEFAULT_GRACE, work).await;

    let exit_code = match &results {
        Some(results) => {
            if !silent {
                for suite in results {
                    report::console::print_suite(suite);
                }
            }
            if let Some(path) = &report_json {
                report::json::write_to(results, path)?;
                info!(path = %path.display(), "JSON report written");
            }
            if let Some(path) = &report_junit {
                report::junit::write_to(results, path)?;
                info!(path = %path.display(), "JUnit report written");
            }
            if results.iter().all(|suite| suite.totals.failed == 0) {
                0
            } else {
                1
            }
        }
        None => 1,
    };

    shutdown.run_hooks();
    if shutdown.signalled() {
        return Ok(SIGNAL_EXIT_CODE);
    }
    Ok(exit_code)
}

fn list_command() {
    let registry = ActionRegistry::with_builtins();
    let width = registry
        .names()
        .iter()
        .map(String::len)
        .max()
        .unwrap_or(0);
    for (name, description) in registry.descriptions() {
        println!("{name:width$}  {description}");
    }
}

fn completions_command(prefix: &str) {
    let registry = ActionRegistry::with_builtins();
    for name in registry.completions(prefix) {
        println!("{name}");
    }
}

async fn real_main() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            paths,
            parallel,
            concurrency,
            debug_vars,
            silent,
            env,
            report_json,
            report_junit,
        } => {
            init_tracing(silent);
            run_command(
                paths,
                parallel,
                concurrency,
                debug_vars,
                silent,
                env,
                report_json,
                report_junit,
            )
            .await
        }
        Commands::List => {
            init_tracing(true);
            list_command();
            Ok(0)
        }
        Commands::Completions { prefix } => {
            init_tracing(true);
            completions_command(&prefix);
            Ok(0)
        }
    }
}

#[tokio::main]
async fn main() {
    let code = match real_main().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            1
        }
    };
    std::process::exit(code);
}
