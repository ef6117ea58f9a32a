//! protorun CLI.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use protorun::config::RunConfig;
use protorun::exit_codes;
use protorun::logging;
use protorun::report::REPORT_FILE;
use protorun::run::{RunRequest, run};
use protorun::select::Selection;

#[derive(Parser)]
#[command(
    name = "protorun",
    version,
    about = "Run a protocol test suite against a staged overlay tree"
)]
struct Cli {
    /// Destination directory for the composed tree; must not exist or be empty.
    destination: PathBuf,

    /// Base tree to stage.
    #[arg(long)]
    base: PathBuf,

    /// Overlay trees layered over the whole base, in order.
    #[arg(short = 'O', long = "overlay", value_name = "DIR")]
    overlays: Vec<PathBuf>,

    /// Overlay input directories merged into <DESTINATION>/inputs.
    #[arg(short = 'i', long = "inputs", value_name = "DIR")]
    input_overlays: Vec<PathBuf>,

    /// Overlay protocol directories merged into <DESTINATION>/protocols.
    #[arg(short = 'p', long = "protocols", value_name = "DIR")]
    protocol_overlays: Vec<PathBuf>,

    /// Skip source paths containing this motif while staging.
    #[arg(short = 'I', long = "ignore", value_name = "MOTIF")]
    ignore: Vec<String>,

    /// Select protocols whose name starts with this prefix.
    #[arg(long, conflicts_with_all = ["filter", "only"])]
    prefix: Option<String>,

    /// Select protocols whose name matches this regular expression.
    #[arg(long, conflicts_with = "only")]
    filter: Option<String>,

    /// Select exactly these protocols by name.
    #[arg(long, value_name = "NAME")]
    only: Vec<String>,

    /// Number of protocols to run concurrently.
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Abort the whole run after this many seconds.
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,

    /// TOML configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    logging::init();
    match run_cli() {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("{:#}", err);
            ExitCode::from(exit_codes::SETUP as u8)
        }
    }
}

fn run_cli() -> Result<i32> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    if let Some(jobs) = cli.jobs {
        config.jobs = jobs;
    }
    if let Some(secs) = cli.timeout_secs {
        config.run_timeout_secs = secs;
    }
    config.validate().context("validate configuration")?;

    let request = RunRequest {
        base: cli.base.clone(),
        overlays: cli.overlays.clone(),
        input_overlays: cli.input_overlays.clone(),
        protocol_overlays: cli.protocol_overlays.clone(),
        ignore: cli.ignore.clone(),
        selection: selection_from_cli(&cli)?,
    };

    let excerpt_limit = config.excerpt_limit_bytes;
    let report = run(&cli.destination, &request, config)?;
    print!("{}", report.render_text(excerpt_limit));
    report.write_json(&cli.destination.join(REPORT_FILE))?;
    Ok(report.exit_code())
}

fn selection_from_cli(cli: &Cli) -> Result<Selection> {
    if !cli.only.is_empty() {
        return Ok(Selection::Explicit(cli.only.clone()));
    }
    if let Some(pattern) = &cli.filter {
        let pattern = regex::Regex::new(pattern)
            .with_context(|| format!("invalid --filter pattern {pattern}"))?;
        return Ok(Selection::Pattern(pattern));
    }
    if let Some(prefix) = &cli.prefix {
        return Ok(Selection::Prefix(prefix.clone()));
    }
    Ok(Selection::All)
}
