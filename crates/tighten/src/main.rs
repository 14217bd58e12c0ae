//! `tighten` command-line driver
//!
//! Loads a JSON-serialized program, runs the concrete-type analysis to its fixed
//! point, and prints the converged slot types.

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tighten_core::{AnalysisConfig, AnalysisReport, Program, ScopeReport, TightenTypes, WorklistOrder};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

/// Concrete-type flow analysis
#[derive(Parser, Debug)]
#[command(name = "tighten")]
#[command(version, about = "Compute the concrete types every slot of a program may hold", long_about = None)]
struct Cli {
    /// Program to analyze (JSON program model)
    #[arg(value_name = "PROGRAM")]
    program: PathBuf,

    /// Analysis configuration (TOML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Ceiling on fixed-point passes
    #[arg(long, value_name = "N")]
    max_iterations: Option<usize>,

    /// Worklist replay order: discovery or reverse
    #[arg(long, value_name = "ORDER")]
    order: Option<WorklistOrder>,

    /// Also print instance property scopes
    #[arg(long)]
    instances: bool,

    /// Emit the report as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            eprintln!("{} {:#}", "error:".red().bold(), err);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "tighten=debug,tighten_core=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let source = std::fs::read_to_string(&cli.program)
        .with_context(|| format!("failed to read program {}", cli.program.display()))?;
    let program =
        Program::from_json(&source).with_context(|| format!("invalid program model in {}", cli.program.display()))?;
    debug!(
        functions = program.functions.len(),
        shapes = program.shapes.len(),
        "loaded program"
    );

    let analysis = TightenTypes::analyze(&program, config).context("analysis failed")?;
    let report = analysis.report();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, cli.instances);
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<AnalysisConfig> {
    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => AnalysisConfig::default(),
    };
    if let Some(max_iterations) = cli.max_iterations {
        config = config.with_max_iterations(max_iterations);
    }
    if let Some(order) = cli.order {
        config = config.with_order(order);
    }
    Ok(config)
}

fn read_config(path: &Path) -> Result<AnalysisConfig> {
    AnalysisConfig::from_file(path).with_context(|| format!("failed to load config {}", path.display()))
}

fn print_report(report: &AnalysisReport, instances: bool) {
    for scope in report.scopes.iter().filter(|scope| instances || scope.kind != "instance") {
        print_scope(scope);
    }
    println!(
        "{} {} passes, {} actions, {} allocated",
        "converged:".green().bold(),
        report.passes,
        report.actions,
        report.allocated.len()
    );
}

fn print_scope(scope: &ScopeReport) {
    println!("{} {}", scope.name.bold(), format!("[{}]", scope.kind).dimmed());
    for slot in &scope.slots {
        let ty = match slot.ty.as_str() {
            "ALL" => slot.ty.yellow(),
            "NONE" => slot.ty.dimmed(),
            _ => slot.ty.normal(),
        };
        println!("  {} {}", format!("{}:", slot.name).cyan(), ty);
    }
}
