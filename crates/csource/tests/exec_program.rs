#![allow(dead_code)]

//! Encoder for hand-written execution programs.

use csource::exec::{
    ARG_CONST, ARG_DATA, ARG_RESULT, INSTR_CHECKPAD, INSTR_COPYIN, INSTR_COPYOUT, INSTR_EOF,
    INSTR_SETPAD,
};

#[derive(Debug, Clone, Copy)]
pub enum Arg {
    Const(u64),
    Result { slot: u64, div: u64, add: u64 },
}

pub fn res(slot: u64) -> Arg {
    Arg::Result {
        slot,
        div: 0,
        add: 0,
    }
}

#[derive(Debug, Default, Clone)]
pub struct ExecBuilder {
    bytes: Vec<u8>,
}

impl ExecBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn word(mut self, w: u64) -> Self {
        self.bytes.extend_from_slice(&w.to_le_bytes());
        self
    }

    fn arg(self, size: u64, arg: Arg) -> Self {
        match arg {
            Arg::Const(v) => self.word(ARG_CONST).word(size).word(v),
            Arg::Result { slot, div, add } => {
                self.word(ARG_RESULT).word(size).word(slot).word(div).word(add)
            }
        }
    }

    pub fn call(self, index: u64, args: &[Arg]) -> Self {
        let mut b = self.word(index).word(args.len() as u64);
        for &a in args {
            b = b.arg(8, a);
        }
        b
    }

    pub fn copyin_const(self, addr: u64, size: u64, value: u64) -> Self {
        self.word(INSTR_COPYIN)
            .word(addr)
            .word(ARG_CONST)
            .word(size)
            .word(value)
    }

    pub fn copyin_result(self, addr: u64, size: u64, slot: u64, div: u64, add: u64) -> Self {
        self.word(INSTR_COPYIN)
            .word(addr)
            .word(ARG_RESULT)
            .word(size)
            .word(slot)
            .word(div)
            .word(add)
    }

    pub fn copyin_data(self, addr: u64, data: &[u8]) -> Self {
        let mut b = self
            .word(INSTR_COPYIN)
            .word(addr)
            .word(ARG_DATA)
            .word(data.len() as u64);
        b.bytes.extend_from_slice(data);
        while b.bytes.len() % 8 != 0 {
            b.bytes.push(0);
        }
        b
    }

    pub fn copyout(self, addr: u64, size: u64) -> Self {
        self.word(INSTR_COPYOUT).word(addr).word(size)
    }

    pub fn setpad(self, addr: u64, size: u64) -> Self {
        self.word(INSTR_SETPAD).word(addr).word(size)
    }

    pub fn checkpad(self, addr: u64, size: u64) -> Self {
        self.word(INSTR_CHECKPAD).word(addr).word(size)
    }

    /// Bytes so far, without the end marker.
    pub fn unterminated(self) -> Vec<u8> {
        self.bytes
    }

    pub fn eof(self) -> Vec<u8> {
        self.word(INSTR_EOF).bytes
    }
}
