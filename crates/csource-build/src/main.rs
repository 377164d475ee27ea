use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use csource::{GenerateError, GenerateStats, Options, SyscallTable, Topology};
use csource_build::{BuildConfig, BuildFailure};
use csource_contracts::CSOURCE_BUILD_REPORT_SCHEMA_VERSION;

#[derive(Parser)]
#[command(name = "csource-build")]
#[command(about = "Generate a C reproducer from an execution program and compile it statically.", long_about = None)]
struct Cli {
    #[arg(long)]
    prog: PathBuf,
    /// Call table JSON (csource.calls schema).
    #[arg(long)]
    calls: PathBuf,
    #[arg(long)]
    threaded: bool,
    /// Implies --threaded.
    #[arg(long)]
    collide: bool,
    /// Copy the built binary here. Without it the scratch binary is left in place.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Keep the generated source next to the scratch files (overrides CSOURCE_KEEP_SOURCE).
    #[arg(long)]
    keep_source: bool,
    #[arg(long)]
    report_json: bool,
}

#[derive(Debug, Serialize)]
struct BuildReport {
    schema_version: &'static str,
    ok: bool,
    options: Options,
    topology: Topology,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<GenerateStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ReportError>,
}

#[derive(Debug, Serialize)]
struct ReportError {
    kind: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    compiler_output: Option<String>,
}

fn main() -> ExitCode {
    init_logging();
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(2)
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

/// Classifies failures that are the program's fault rather than the environment's.
fn report_error(err: &anyhow::Error) -> Option<ReportError> {
    if let Some(fault) = err.downcast_ref::<GenerateError>() {
        return Some(ReportError {
            kind: "generate",
            message: fault.to_string(),
            compiler_output: None,
        });
    }
    err.downcast_ref::<BuildFailure>().map(|fail| ReportError {
        kind: "build_failure",
        message: format!("compiler exited with status {}", fail.exit_status),
        compiler_output: Some(fail.output.clone()),
    })
}

fn try_main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let exec = std::fs::read(&cli.prog)
        .with_context(|| format!("read execution program: {}", cli.prog.display()))?;
    let table = SyscallTable::load(&cli.calls)?;
    let options = Options {
        threaded: cli.threaded,
        collide: cli.collide,
    };
    let mut config = BuildConfig::from_env();
    config.keep_source |= cli.keep_source;

    let mut report = BuildReport {
        schema_version: CSOURCE_BUILD_REPORT_SCHEMA_VERSION,
        ok: false,
        options,
        topology: options.topology(),
        stats: None,
        bin: None,
        source_path: None,
        error: None,
    };

    let code = match csource_build::generate_and_build(&exec, &table, &options, &config) {
        Ok(built) => {
            let bin = match &cli.out {
                Some(dst) => {
                    std::fs::copy(&built.bin, dst).with_context(|| {
                        format!("copy {} to {}", built.bin.display(), dst.display())
                    })?;
                    let _ = std::fs::remove_file(&built.bin);
                    dst.clone()
                }
                None => built.bin,
            };
            if !cli.report_json {
                println!("{}", bin.display());
            }
            report.ok = true;
            report.stats = Some(built.stats);
            report.bin = Some(bin.display().to_string());
            report.source_path = built.source_path.map(|p| p.display().to_string());
            ExitCode::SUCCESS
        }
        Err(err) => {
            let Some(reported) = report_error(&err) else {
                return Err(err);
            };
            tracing::error!(kind = reported.kind, "build failed");
            if !cli.report_json {
                eprintln!("{err}");
            }
            report.error = Some(reported);
            ExitCode::from(1)
        }
    };

    if cli.report_json {
        println!("{}", serde_json::to_string(&report)?);
    }
    Ok(code)
}
