use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use csource_contracts::CALL_TABLE_SCHEMA_VERSION;

use crate::validate;

/// Metadata for one entry of the upstream call table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallMeta {
    /// Full variant name, e.g. `open$dir`.
    pub name: String,
    /// Kernel entry point, e.g. `open`. Used as `SYS_<call_name>`.
    pub call_name: String,
    pub nr: u64,
}

impl CallMeta {
    pub fn new(name: impl Into<String>, nr: u64) -> Self {
        let name = name.into();
        let call_name = match name.split_once('$') {
            Some((base, _)) => base.to_string(),
            None => name.clone(),
        };
        Self {
            name,
            call_name,
            nr,
        }
    }
}

/// Call metadata lookup supplied by the component that produced the execution program.
pub trait CallTable {
    /// Looks up the call named by a syscall instruction tag.
    fn call(&self, index: u64) -> Option<&CallMeta>;

    /// Number to `#define` for a call whose `SYS_` constant the target headers lack.
    ///
    /// `None` means the headers already define `SYS_<call_name>`.
    fn unknown_nr(&self, call_name: &str) -> Option<u64>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyscallTable {
    calls: Vec<CallMeta>,
    unknown_nrs: BTreeMap<String, u64>,
}

impl SyscallTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a call and returns its instruction tag.
    pub fn push(&mut self, name: impl Into<String>, nr: u64) -> u64 {
        self.calls.push(CallMeta::new(name, nr));
        (self.calls.len() - 1) as u64
    }

    pub fn with_unknown_nr(mut self, call_name: impl Into<String>, nr: u64) -> Self {
        self.unknown_nrs.insert(call_name.into(), nr);
        self
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn calls(&self) -> &[CallMeta] {
        &self.calls
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, CallTableError> {
        let doc: CallTableDoc = serde_json::from_slice(bytes).map_err(|e| CallTableError {
            message: format!("parse call table JSON: {e}"),
        })?;
        if doc.schema_version != CALL_TABLE_SCHEMA_VERSION {
            return Err(CallTableError {
                message: format!(
                    "unsupported call table schema_version: expected {CALL_TABLE_SCHEMA_VERSION:?} got {:?}",
                    doc.schema_version
                ),
            });
        }

        let mut table = SyscallTable::new();
        for (idx, entry) in doc.calls.into_iter().enumerate() {
            validate::validate_variant_name(&entry.name).map_err(|message| CallTableError {
                message: format!("calls[{idx}]: {message}"),
            })?;
            table.push(entry.name, entry.nr);
        }
        for (call_name, nr) in doc.unknown_nrs {
            validate::validate_call_name(&call_name).map_err(|message| CallTableError {
                message: format!("unknown_nrs: {message}"),
            })?;
            table.unknown_nrs.insert(call_name, nr);
        }
        Ok(table)
    }

    pub fn load(path: &Path) -> Result<Self, CallTableError> {
        let bytes = std::fs::read(path).map_err(|e| CallTableError {
            message: format!("read call table {}: {e}", path.display()),
        })?;
        Self::from_json(&bytes)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let doc = CallTableDoc {
            schema_version: CALL_TABLE_SCHEMA_VERSION.to_string(),
            calls: self
                .calls
                .iter()
                .map(|c| CallEntryDoc {
                    name: c.name.clone(),
                    nr: c.nr,
                })
                .collect(),
            unknown_nrs: self.unknown_nrs.clone(),
        };
        serde_json::to_value(doc).unwrap_or(serde_json::Value::Null)
    }
}

impl CallTable for SyscallTable {
    fn call(&self, index: u64) -> Option<&CallMeta> {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.calls.get(index))
    }

    fn unknown_nr(&self, call_name: &str) -> Option<u64> {
        self.unknown_nrs.get(call_name).copied()
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CallTableDoc {
    schema_version: String,
    calls: Vec<CallEntryDoc>,
    #[serde(default)]
    unknown_nrs: BTreeMap<String, u64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CallEntryDoc {
    name: String,
    nr: u64,
}

/// The call table document could not be read or is malformed.
#[derive(Debug, Clone)]
pub struct CallTableError {
    pub message: String,
}

impl std::fmt::Display for CallTableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CallTableError {}
