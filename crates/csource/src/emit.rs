//! Turns decoded instructions into per-call source fragments.
//!
//! A fragment holds one syscall statement together with the copy-in statements that set up
//! its pointer arguments and the copy-out statements that read results back. The decoder sees
//! those as separate top-level instructions, so the emitter groups them: a copy-in, set-pad or
//! syscall arriving after a syscall has been emitted closes the current fragment.

use crate::exec::{ArgValue, CallArg, Instr, ResultRef, MAX_ARGS};

const INDENT: &str = "\t";

/// One line of generated C. `depth` is relative to the fragment's placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stmt {
    pub depth: usize,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub stmts: Vec<Stmt>,
}

impl Fragment {
    /// Renders every statement indented by `base_depth` tabs plus its own depth.
    pub fn render(&self, base_depth: usize) -> String {
        let mut out = String::new();
        for stmt in &self.stmts {
            for _ in 0..base_depth + stmt.depth {
                out.push_str(INDENT);
            }
            out.push_str(&stmt.text);
            out.push('\n');
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Calls {
    /// One fragment per syscall, in decode order.
    pub fragments: Vec<Fragment>,
    /// Number of `r[]` slots assigned: one per syscall and one per copy-out.
    pub result_slots: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// No syscall emitted since the last flush.
    Idle,
    /// A syscall has been emitted into `pending`.
    Buffering,
}

struct Emitter {
    fragments: Vec<Fragment>,
    pending: Vec<Stmt>,
    state: State,
    next_slot: u64,
    last_call_slot: u64,
}

pub fn generate_calls(instrs: &[Instr<'_>]) -> Calls {
    let mut emitter = Emitter {
        fragments: Vec::new(),
        pending: Vec::new(),
        state: State::Idle,
        next_slot: 0,
        last_call_slot: 0,
    };
    for instr in instrs {
        emitter.emit_instr(instr);
    }
    emitter.flush();
    if !emitter.pending.is_empty() {
        tracing::debug!(
            dropped = emitter.pending.len(),
            "statements after the last syscall belong to no fragment"
        );
    }
    Calls {
        fragments: emitter.fragments,
        result_slots: emitter.next_slot as usize,
    }
}

impl Emitter {
    fn line(&mut self, depth: usize, text: String) {
        self.pending.push(Stmt { depth, text });
    }

    fn flush(&mut self) {
        if self.state == State::Buffering {
            self.state = State::Idle;
            self.fragments.push(Fragment {
                stmts: std::mem::take(&mut self.pending),
            });
        }
    }

    fn emit_instr(&mut self, instr: &Instr<'_>) {
        match instr {
            Instr::CopyIn { addr, size, value } => {
                self.flush();
                let text = match value {
                    ArgValue::Const(v) => {
                        let ty = uint_type(*size);
                        format!("*({ty}*)0x{addr:x} = ({ty})0x{v:x};")
                    }
                    ArgValue::Result(r) => {
                        let ty = uint_type(*size);
                        format!("*({ty}*)0x{addr:x} = {};", self.result_ref(r))
                    }
                    ArgValue::Data(data) => {
                        format!(
                            "memcpy((void*)0x{addr:x}, \"{}\", {size});",
                            escape_data(data)
                        )
                    }
                };
                self.line(0, text);
            }
            Instr::CopyOut { addr, size } => {
                let slot = self.next_slot;
                self.next_slot += 1;
                let last = self.last_call_slot;
                self.line(0, format!("if (r[{last}] != -1)"));
                self.line(
                    1,
                    format!("r[{slot}] = *({}*)0x{addr:x};", uint_type(*size)),
                );
            }
            Instr::SetPad { .. } => self.flush(),
            Instr::CheckPad { .. } => {}
            Instr::Call { meta, args, .. } => {
                self.flush();
                let slot = self.next_slot;
                let mut text = format!("r[{slot}] = syscall(SYS_{}", meta.call_name);
                for arg in args {
                    text.push_str(", ");
                    text.push_str(&self.call_arg(arg));
                }
                for _ in args.len()..MAX_ARGS {
                    text.push_str(", 0");
                }
                text.push_str(");");
                self.line(0, text);
                self.next_slot += 1;
                self.last_call_slot = slot;
                self.state = State::Buffering;
            }
        }
    }

    fn call_arg(&self, arg: &CallArg) -> String {
        match &arg.value {
            ArgValue::Const(v) => const_arg_expr(*v),
            ArgValue::Result(r) => self.result_ref(r),
            // Rejected by the decoder.
            ArgValue::Data(_) => "0".to_string(),
        }
    }

    fn result_ref(&self, r: &ResultRef) -> String {
        if r.slot >= self.next_slot {
            tracing::warn!(
                slot = r.slot,
                assigned = self.next_slot,
                "result reference to a slot that is not assigned yet"
            );
        }
        result_ref_expr(r)
    }
}

/// `r[slot]`, `r[slot]/div`, `r[slot]+add` or `r[slot]/div+add`.
pub fn result_ref_expr(r: &ResultRef) -> String {
    let mut out = format!("r[{}]", r.slot);
    if r.div != 0 {
        out.push_str(&format!("/{}", r.div));
    }
    if r.add != 0 {
        out.push_str(&format!("+{}", r.add));
    }
    out
}

pub fn const_arg_expr(v: u64) -> String {
    format!("0x{v:x}ul")
}

/// Hex-escapes every byte for a C string literal.
pub fn escape_data(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 4);
    for &b in bytes {
        out.push_str(&format!("\\x{b:02x}"));
    }
    out
}

fn uint_type(size: u64) -> String {
    format!("uint{}_t", size.saturating_mul(8))
}
