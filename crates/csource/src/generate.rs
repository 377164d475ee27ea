use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::assemble;
use crate::calls::CallTable;
use crate::emit;
use crate::exec;
use crate::macros;

/// Selects the execution topology of the generated program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    /// Run every call fragment on its own thread.
    pub threaded: bool,
    /// Spawn a second, less staggered wave of threads to provoke races.
    /// Implies `threaded`.
    pub collide: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    Sequential,
    Threaded,
    Collision,
}

impl Options {
    pub fn topology(&self) -> Topology {
        match (self.threaded, self.collide) {
            (false, false) => Topology::Sequential,
            (_, true) => Topology::Collision,
            (true, false) => Topology::Threaded,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerateErrorKind {
    /// The stream ended (or was malformed) in the middle of an instruction.
    DecodeIntegrity,
    /// An argument type tag outside `{const, result, data}`.
    UnknownArgumentType,
    /// An instruction tag that names no entry of the call table.
    UnknownCall,
}

impl GenerateErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerateErrorKind::DecodeIntegrity => "decode integrity fault",
            GenerateErrorKind::UnknownArgumentType => "unknown argument type",
            GenerateErrorKind::UnknownCall => "unknown call",
        }
    }
}

/// A fatal generation fault.
///
/// Execution programs come from a trusted, versioned encoder, so every fault means the
/// encoder and this decoder disagree about the format. Nothing is ever retried and no
/// partial source is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateError {
    pub kind: GenerateErrorKind,
    pub message: String,
}

impl GenerateError {
    pub fn new(kind: GenerateErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

impl Display for GenerateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for GenerateError {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GenerateStats {
    pub calls: usize,
    pub fragments: usize,
    pub result_slots: usize,
    pub macros: usize,
}

#[derive(Debug, Clone)]
pub struct CSourceOutput {
    pub source: String,
    pub stats: GenerateStats,
}

pub fn write_program<T>(exec: &[u8], table: &T, options: &Options) -> Result<String, GenerateError>
where
    T: CallTable + ?Sized,
{
    write_program_with_meta(exec, table, options).map(|out| out.source)
}

pub fn write_program_with_meta<T>(
    exec: &[u8],
    table: &T,
    options: &Options,
) -> Result<CSourceOutput, GenerateError>
where
    T: CallTable + ?Sized,
{
    let instrs = exec::decode(exec, table)?;
    let macro_table = macros::build_macro_table(&instrs, table);
    let calls = emit::generate_calls(&instrs);
    let topology = options.topology();
    let source = assemble::assemble(&macro_table, &calls, topology);

    let stats = GenerateStats {
        calls: instrs
            .iter()
            .filter(|i| matches!(i, exec::Instr::Call { .. }))
            .count(),
        fragments: calls.fragments.len(),
        result_slots: calls.result_slots,
        macros: macro_table.len(),
    };
    tracing::debug!(
        ?topology,
        calls = stats.calls,
        fragments = stats.fragments,
        result_slots = stats.result_slots,
        macros = stats.macros,
        source_bytes = source.len(),
        "generated C source"
    );
    Ok(CSourceOutput { source, stats })
}
