//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - installs the tracing subscriber
//! - runs the analysis pipeline
//! - prints reports/plots
//! - writes optional exports

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{AnalyzeArgs, Cli, Command, FitArgs, SelectArgs};
use crate::error::AppError;

pub mod pipeline;

/// Environment variable holding an `EnvFilter` directive (overrides -q/-v).
pub const LOG_ENV: &str = "CANDY_LOG";

/// Entry point for the `candy` binary.
pub fn run() -> Result<(), AppError> {
    // `candy` and `candy --seed 1` behave like `candy analyze ...`.
    let argv = rewrite_args(std::env::args().collect());
    let cli = Cli::parse_from(argv);
    init_tracing(cli.quiet, cli.verbose);

    match cli.command {
        Command::Analyze(args) => handle_analyze(args),
        Command::Fit(args) => handle_fit(args),
        Command::Select(args) => handle_select(args),
    }
}

/// Install a stderr `fmt` subscriber. Calling it twice is harmless.
pub fn init_tracing(quiet: bool, verbose: bool) {
    let default = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn handle_analyze(args: AnalyzeArgs) -> Result<(), AppError> {
    let config = args.to_config();
    let output = pipeline::run_analysis(&config)?;

    println!("{}", crate::report::format_analysis(&output, &config));

    if let Some(path) = &config.export_report {
        crate::io::export::write_report_json(path, &output, &config)?;
    }
    Ok(())
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = args.to_config();
    let output = pipeline::run_fit(&config, args.variant, args.prior, args.formula)?;

    println!("{}", crate::report::format_fit(&output, &config));

    if let Some(path) = &config.export_draws {
        crate::io::export::write_draws_csv(path, &output.model.fit.posterior)?;
    }
    Ok(())
}

fn handle_select(args: SelectArgs) -> Result<(), AppError> {
    let config = args.to_config();
    let output = pipeline::run_select(&config, args.variant)?;

    println!("{}", crate::report::format_select(&output, &config));
    Ok(())
}

/// Rewrite argv so `candy` defaults to `candy analyze`.
///
/// Rules:
/// - `candy`                          -> `candy analyze`
/// - `candy --seed 1 ...`             -> `candy analyze --seed 1 ...`
/// - `candy -q/-v [subcommand] ...`   -> global flags stay in front
/// - `candy --help/--version/-h/-V`   -> unchanged
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let is_global = |a: &str| matches!(a, "-q" | "--quiet" | "-v" | "--verbose");
    let first = argv.iter().skip(1).position(|a| !is_global(a)).map(|p| p + 1);

    let Some(pos) = first else {
        argv.push("analyze".to_string());
        return argv;
    };

    let arg = argv[pos].as_str();
    let is_top_level_help_or_version = matches!(arg, "-h" | "--help" | "-V" | "--version" | "help");
    let is_subcommand = matches!(arg, "analyze" | "fit" | "select");
    if is_top_level_help_or_version || is_subcommand {
        return argv;
    }

    if arg.starts_with('-') {
        argv.insert(pos, "analyze".to_string());
    }
    argv
}
