//! Domain-specific error types.
//!
//! Only fatal conditions live here. Path-local problems (a bad jump target,
//! a forbidden loop re-entry) are logged by the interpreter and the branch is
//! dropped; they never surface as an `Err`.

use thiserror::Error;

/// Errors from the bytecode loader.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("invalid hex input: {0}")]
    InvalidHex(String),

    #[error("empty bytecode")]
    EmptyBytecode,

    #[error("bytecode too large ({0} bytes, max {1})")]
    BytecodeTooLarge(usize, usize),
}

/// Errors from the symbolic stack.
#[derive(Debug, Error)]
pub enum StackError {
    #[error("stack underflow: needed {needed} items, have {have}")]
    Underflow { needed: usize, have: usize },

    #[error("stack overflow: depth {0} exceeds 1024")]
    Overflow(usize),

    #[error("dup{0} out of range (stack depth {1})")]
    DupOutOfRange(usize, usize),

    #[error("swap{0} out of range (stack depth {1})")]
    SwapOutOfRange(usize, usize),
}

/// Fatal interpreter faults. Any of these aborts the current run.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("execution ran past the end of the code at pc {0:#x}")]
    CodeOverrun(usize),

    #[error("opcode {name} at pc {pc:#x} declares {outs} outputs")]
    TooManyOutputs { name: &'static str, pc: usize, outs: u8 },

    #[error("stack fault at pc {pc:#x}: {source}")]
    Stack {
        pc: usize,
        #[source]
        source: StackError,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Failures of the variable-resolution layer.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    #[error("unsupported {space} addressing pattern: {expr}")]
    Unsupported { space: &'static str, expr: String },

    #[error("address resolution exceeded depth {0}")]
    TooDeep(usize),
}

/// Errors surfaced by the dependency-tree builder and the scanner.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Vm(#[from] VmError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("checkpoint {0} is not recorded in this exploration")]
    UnknownCheckpoint(usize),
}

/// Maximum allowed bytecode size (24 KB, the EVM contract limit).
pub const MAX_BYTECODE_SIZE: usize = 24_576;
/// Maximum EVM stack depth.
pub const MAX_STACK_DEPTH: usize = 1024;
/// Nesting limit for address decomposition.
pub const MAX_RESOLVE_DEPTH: usize = 64;
