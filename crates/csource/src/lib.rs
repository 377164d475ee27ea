pub mod assemble;
pub mod calls;
pub mod emit;
pub mod exec;
pub mod generate;
pub mod macros;
pub mod validate;

pub use calls::{CallMeta, CallTable, CallTableError, SyscallTable};
pub use generate::{
    write_program, write_program_with_meta, CSourceOutput, GenerateError, GenerateErrorKind,
    GenerateStats, Options, Topology,
};
