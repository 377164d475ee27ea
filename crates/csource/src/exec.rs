//! Decoder for the binary execution program.
//!
//! The stream is a flat sequence of little-endian 64-bit words with no length prefixes and
//! no self-description: every field is found by position alone. Instruction tags are counted
//! down from `u64::MAX`; any tag that is not one of the reserved markers is an index into the
//! call table.

use crate::calls::{CallMeta, CallTable};
use crate::generate::{GenerateError, GenerateErrorKind};

pub const INSTR_EOF: u64 = !0;
pub const INSTR_COPYIN: u64 = !1;
pub const INSTR_COPYOUT: u64 = !2;
pub const INSTR_SETPAD: u64 = !3;
pub const INSTR_CHECKPAD: u64 = !4;

pub const ARG_CONST: u64 = 0;
pub const ARG_RESULT: u64 = 1;
pub const ARG_DATA: u64 = 2;

/// Upper bound on syscall arguments; the emitter pads every call to this many.
pub const MAX_ARGS: usize = 6;

const WORD: usize = 8;

/// Cursor over an execution program. Only ever moves forward.
pub struct ExecReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ExecReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    /// Pops the next little-endian word.
    pub fn next_word(&mut self) -> Result<u64, GenerateError> {
        let b = self.take(WORD)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Pops `size` bytes of inline data plus the zero padding that aligns the stream back
    /// to a word boundary. Returns only the data bytes.
    pub fn take_padded(&mut self, size: u64) -> Result<&'a [u8], GenerateError> {
        let padded = size
            .checked_add(WORD as u64 - 1)
            .map(|n| n / WORD as u64 * WORD as u64)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| {
                GenerateError::new(
                    GenerateErrorKind::DecodeIntegrity,
                    format!(
                        "inline data size {size} at offset {} does not fit in memory",
                        self.offset
                    ),
                )
            })?;
        let chunk = self.take(padded)?;
        // `size <= padded` and `padded` fit in usize, so this cannot truncate.
        Ok(&chunk[..size as usize])
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], GenerateError> {
        let slice = self
            .offset
            .checked_add(len)
            .and_then(|end| self.bytes.get(self.offset..end))
            .ok_or_else(|| {
                GenerateError::new(
                    GenerateErrorKind::DecodeIntegrity,
                    format!(
                        "exec program overflow: need {len} bytes at offset {} but only {} remain",
                        self.offset,
                        self.remaining()
                    ),
                )
            })?;
        self.offset += len;
        Ok(slice)
    }
}

/// `r[slot] / div + add`; a zero `div` or `add` means the operation is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultRef {
    pub slot: u64,
    pub div: u64,
    pub add: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Const(u64),
    Result(ResultRef),
    /// Raw bytes; copy-in only.
    Data(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallArg {
    pub size: u64,
    pub value: ArgValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instr<'t> {
    CopyIn {
        addr: u64,
        size: u64,
        value: ArgValue,
    },
    CopyOut {
        addr: u64,
        size: u64,
    },
    SetPad {
        addr: u64,
        size: u64,
    },
    CheckPad {
        addr: u64,
        size: u64,
    },
    Call {
        index: u64,
        meta: &'t CallMeta,
        args: Vec<CallArg>,
    },
}

/// Decodes instructions up to the end-of-program marker.
///
/// Bytes following the marker are ignored. Any fault aborts the whole decode.
pub fn decode<'t, T>(exec: &[u8], table: &'t T) -> Result<Vec<Instr<'t>>, GenerateError>
where
    T: CallTable + ?Sized,
{
    let mut r = ExecReader::new(exec);
    let mut instrs = Vec::new();
    loop {
        let at = r.offset();
        let instr = match r.next_word()? {
            INSTR_EOF => break,
            INSTR_COPYIN => {
                let addr = r.next_word()?;
                let typ = r.next_word()?;
                let size = r.next_word()?;
                let value = read_arg_value(&mut r, typ, size, true)?;
                Instr::CopyIn { addr, size, value }
            }
            INSTR_COPYOUT => {
                let addr = r.next_word()?;
                let size = r.next_word()?;
                Instr::CopyOut { addr, size }
            }
            INSTR_SETPAD => {
                let addr = r.next_word()?;
                let size = r.next_word()?;
                Instr::SetPad { addr, size }
            }
            INSTR_CHECKPAD => {
                let addr = r.next_word()?;
                let size = r.next_word()?;
                Instr::CheckPad { addr, size }
            }
            index => {
                let meta = table.call(index).ok_or_else(|| {
                    GenerateError::new(
                        GenerateErrorKind::UnknownCall,
                        format!("instruction tag {index:#x} at offset {at} is not in the call table"),
                    )
                })?;
                let nargs = r.next_word()?;
                if nargs > MAX_ARGS as u64 {
                    return Err(GenerateError::new(
                        GenerateErrorKind::DecodeIntegrity,
                        format!(
                            "call {} at offset {at} has {nargs} arguments (max {MAX_ARGS})",
                            meta.name
                        ),
                    ));
                }
                let mut args = Vec::with_capacity(nargs as usize);
                for _ in 0..nargs {
                    let typ = r.next_word()?;
                    let size = r.next_word()?;
                    let value = read_arg_value(&mut r, typ, size, false)?;
                    args.push(CallArg { size, value });
                }
                Instr::Call { index, meta, args }
            }
        };
        tracing::trace!(offset = at, ?instr, "decoded instruction");
        instrs.push(instr);
    }
    Ok(instrs)
}

fn read_arg_value(
    r: &mut ExecReader<'_>,
    typ: u64,
    size: u64,
    allow_data: bool,
) -> Result<ArgValue, GenerateError> {
    match typ {
        ARG_CONST => Ok(ArgValue::Const(r.next_word()?)),
        ARG_RESULT => {
            let slot = r.next_word()?;
            let div = r.next_word()?;
            let add = r.next_word()?;
            Ok(ArgValue::Result(ResultRef { slot, div, add }))
        }
        ARG_DATA if allow_data => Ok(ArgValue::Data(r.take_padded(size)?.to_vec())),
        ARG_DATA => Err(GenerateError::new(
            GenerateErrorKind::UnknownArgumentType,
            format!(
                "inline data is not a valid syscall argument (offset {})",
                r.offset()
            ),
        )),
        other => Err(GenerateError::new(
            GenerateErrorKind::UnknownArgumentType,
            format!(
                "bad argument type {other:#x} before offset {}",
                r.offset()
            ),
        )),
    }
}
