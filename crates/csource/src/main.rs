use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use csource::{GenerateError, GenerateStats, Options, SyscallTable, Topology};
use csource_contracts::CSOURCE_REPORT_SCHEMA_VERSION;

#[derive(Parser)]
#[command(name = "csource")]
#[command(about = "Translate a binary execution program into a standalone C reproducer.", long_about = None)]
struct Cli {
    /// Binary execution program.
    #[arg(long)]
    prog: PathBuf,
    /// Call table JSON (csource.calls schema).
    #[arg(long)]
    calls: PathBuf,
    #[arg(long)]
    threaded: bool,
    /// Add a second, less staggered wave of threads. Implies --threaded.
    #[arg(long)]
    collide: bool,
    /// Write the source here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Print a JSON report on stdout.
    #[arg(long)]
    report_json: bool,
}

#[derive(Debug, Serialize)]
struct CSourceReport {
    schema_version: &'static str,
    ok: bool,
    options: Options,
    topology: Topology,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<GenerateStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ReportError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    out: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
}

#[derive(Debug, Serialize)]
struct ReportError {
    kind: csource::GenerateErrorKind,
    message: String,
}

impl From<&GenerateError> for ReportError {
    fn from(err: &GenerateError) -> Self {
        Self {
            kind: err.kind,
            message: err.message.clone(),
        }
    }
}

fn main() -> std::process::ExitCode {
    init_logging();
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            std::process::ExitCode::from(2)
        }
    }
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn try_main() -> Result<std::process::ExitCode> {
    let cli = Cli::parse();

    let exec = std::fs::read(&cli.prog)
        .with_context(|| format!("read execution program: {}", cli.prog.display()))?;
    let table = SyscallTable::load(&cli.calls)?;
    let options = Options {
        threaded: cli.threaded,
        collide: cli.collide,
    };

    let result = csource::write_program_with_meta(&exec, &table, &options);

    let mut report = CSourceReport {
        schema_version: CSOURCE_REPORT_SCHEMA_VERSION,
        ok: result.is_ok(),
        options,
        topology: options.topology(),
        stats: None,
        error: None,
        out: cli.out.as_ref().map(|p| p.display().to_string()),
        source: None,
    };

    let code = match result {
        Ok(output) => {
            report.stats = Some(output.stats);
            match &cli.out {
                Some(path) => std::fs::write(path, output.source.as_bytes())
                    .with_context(|| format!("write C source: {}", path.display()))?,
                None if !cli.report_json => print!("{}", output.source),
                None => report.source = Some(output.source),
            }
            std::process::ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(kind = ?err.kind, "generation failed");
            if !cli.report_json {
                eprintln!("{err}");
            }
            report.error = Some(ReportError::from(&err));
            std::process::ExitCode::from(1)
        }
    };

    if cli.report_json {
        println!("{}", serde_json::to_string(&report)?);
    }
    Ok(code)
}
