use std::{path::PathBuf, process::ExitCode};

use anyhow::Context;
use clap::Parser;
use log::{error, LevelFilter};
use regex::Regex;

use asmdiff::diff::{self, DiffOptions};

/// Exit code signalled when the size regression threshold is exceeded.
const REGRESSION_EXIT_CODE: u8 = 3;

#[derive(Parser)]
#[command(name = "asmdiff", version, about = "Compares .NET assemblies")]
struct Args {
    /// First assembly to compare
    assembly1: PathBuf,

    /// Second assembly to compare
    assembly2: PathBuf,

    /// Compare method body sizes
    #[arg(short = 'b', long)]
    method_body_sizes: bool,

    /// Compare metadata sizes
    #[arg(short = 'm', long)]
    metadata_sizes: bool,

    /// Process only types matching regex PATTERN; the last occurrence wins
    #[arg(
        short = 't',
        long = "type",
        value_name = "PATTERN",
        overrides_with = "type_pattern"
    )]
    type_pattern: Option<String>,

    /// Report an error when the uncompressed size grows by more than BYTES
    #[arg(short = 's', long = "test-size-regression", value_name = "BYTES")]
    size_regression: Option<i64>,

    /// Output information about progress during the run
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(if args.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        })
        .init();

    match run(&args) {
        Ok(code) => code,
        Err(error) => {
            error!("{error:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> anyhow::Result<ExitCode> {
    let type_filter = args
        .type_pattern
        .as_deref()
        .map(Regex::new)
        .transpose()
        .context("Invalid type pattern")?;

    let options = DiffOptions {
        compare_metadata: args.metadata_sizes,
        compare_method_bodies: args.method_body_sizes,
        type_filter,
    };

    println!(
        "Compare {} with {}",
        args.assembly1.display(),
        args.assembly2.display()
    );

    let result = diff::compare(&args.assembly1, &args.assembly2, &options).with_context(|| {
        format!(
            "Unable to compare {} with {}",
            args.assembly1.display(),
            args.assembly2.display()
        )
    })?;

    for line in result.report.lines() {
        println!("{line}");
    }
    for line in result.summary.lines() {
        println!("{line}");
    }

    if let Some(threshold) = args.size_regression {
        if let Some(message) = result.summary.regression(threshold) {
            error!("{message}");
            return Ok(ExitCode::from(REGRESSION_EXIT_CODE));
        }
    }

    Ok(ExitCode::SUCCESS)
}
