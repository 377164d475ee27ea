//! Compiles generated reproducers into static native binaries.
//!
//! The C source produced by `csource` is written to a scratch file and handed to the host
//! compiler in C++ mode. Scratch files live in the system temp directory and are owned by the
//! caller once returned.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};

use csource::{CallTable, GenerateStats, Options};

const SOURCE_PREFIX: &str = "syz-prog";
const BINARY_PREFIX: &str = "syzkaller";

/// Flags that precede the source path.
const CC_LEAD_FLAGS: &[&str] = &["-x", "c++", "-std=gnu++11"];
/// Flags that follow `-o <bin>`.
const CC_TAIL_FLAGS: &[&str] = &["-lpthread", "-static", "-O1", "-g"];

/// The scratch source file could not be created or filled.
#[derive(Debug)]
pub struct TempFileError {
    pub source: std::io::Error,
}

impl std::fmt::Display for TempFileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to create temp file: {}", self.source)
    }
}

impl std::error::Error for TempFileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// The compiler ran and rejected the program.
#[derive(Debug)]
pub struct BuildFailure {
    pub exit_status: i32,
    /// Combined compiler stdout and stderr.
    pub output: String,
    /// The source that failed to build, read back from disk.
    pub source: String,
}

impl std::fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "failed to build program (exit status {})", self.exit_status)?;
        writeln!(f, "--- source ---")?;
        f.write_str(&self.source)?;
        if !self.source.ends_with('\n') {
            writeln!(f)?;
        }
        writeln!(f, "--- compiler output ---")?;
        f.write_str(&self.output)
    }
}

impl std::error::Error for BuildFailure {}

/// Writes `data` to a fresh scratch file that outlives this call.
pub fn write_temp_file(data: &[u8]) -> Result<PathBuf, TempFileError> {
    let mut file = tempfile::Builder::new()
        .prefix(SOURCE_PREFIX)
        .tempfile()
        .map_err(|source| TempFileError { source })?;
    // Dropping `file` on an error path removes the partial file.
    file.write_all(data)
        .and_then(|()| file.flush())
        .map_err(|source| TempFileError { source })?;
    file.into_temp_path()
        .keep()
        .map_err(|err| TempFileError { source: err.error })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    pub cc: OsString,
    /// Extra flags appended after the fixed ones.
    pub cc_args: Vec<String>,
    /// Keep the scratch source after `generate_and_build`.
    pub keep_source: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            cc: OsString::from("gcc"),
            cc_args: Vec::new(),
            keep_source: false,
        }
    }
}

impl BuildConfig {
    /// Reads `CSOURCE_CC`, `CSOURCE_CC_ARGS` and `CSOURCE_KEEP_SOURCE`.
    pub fn from_env() -> Self {
        let cc = std::env::var_os("CSOURCE_CC")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| OsString::from("gcc"));
        let cc_args = std::env::var("CSOURCE_CC_ARGS")
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        let keep_source = std::env::var("CSOURCE_KEEP_SOURCE")
            .map(|v| {
                let v = v.trim().to_ascii_lowercase();
                !(v.is_empty() || v == "0" || v == "false" || v == "no" || v == "off")
            })
            .unwrap_or(false);
        Self {
            cc,
            cc_args,
            keep_source,
        }
    }
}

/// Compiles `src_path` into a static binary at a fresh scratch path.
///
/// A compiler that exits non-zero yields a [`BuildFailure`] inside the returned error; a
/// compiler that cannot be spawned yields a plain I/O error.
pub fn build(src_path: &Path, config: &BuildConfig) -> Result<PathBuf> {
    let bin = tempfile::Builder::new()
        .prefix(BINARY_PREFIX)
        .tempfile()
        .map_err(|source| TempFileError { source })?
        .into_temp_path();

    let mut cmd = Command::new(&config.cc);
    cmd.args(CC_LEAD_FLAGS);
    cmd.arg(src_path);
    cmd.arg("-o");
    cmd.arg(&*bin);
    cmd.args(CC_TAIL_FLAGS);
    cmd.args(&config.cc_args);

    tracing::info!(
        cc = %config.cc.to_string_lossy(),
        src = %src_path.display(),
        bin = %bin.display(),
        "invoking compiler"
    );
    let out = cmd
        .output()
        .with_context(|| format!("invoke cc: {:?}", config.cc))?;

    if !out.status.success() {
        let exit_status = out.status.code().unwrap_or(1);
        let mut combined = out.stdout;
        combined.extend_from_slice(&out.stderr);
        let source = std::fs::read_to_string(src_path)
            .with_context(|| format!("read back C source: {}", src_path.display()))?;
        tracing::error!(exit_status, src = %src_path.display(), "compiler rejected program");
        // `bin` is dropped here, removing whatever the compiler left behind.
        return Err(BuildFailure {
            exit_status,
            output: String::from_utf8_lossy(&combined).into_owned(),
            source,
        }
        .into());
    }

    let bin = bin
        .keep()
        .map_err(|err| TempFileError { source: err.error })?;
    tracing::debug!(bin = %bin.display(), "compiler succeeded");
    Ok(bin)
}

#[derive(Debug, Clone)]
pub struct BuiltProgram {
    pub bin: PathBuf,
    /// Present only when the config asks to keep it.
    pub source_path: Option<PathBuf>,
    pub stats: GenerateStats,
}

/// Generates, writes and compiles one reproducer.
pub fn generate_and_build<T>(
    exec: &[u8],
    table: &T,
    options: &Options,
    config: &BuildConfig,
) -> Result<BuiltProgram>
where
    T: CallTable + ?Sized,
{
    let output = csource::write_program_with_meta(exec, table, options)?;
    let src_path = write_temp_file(output.source.as_bytes())?;

    let built = build(&src_path, config);
    let source_path = if config.keep_source {
        Some(src_path)
    } else {
        let _ = std::fs::remove_file(&src_path);
        None
    };

    Ok(BuiltProgram {
        bin: built?,
        source_path,
        stats: output.stats,
    })
}
