//! EVM opcode definitions.
//!
//! Each opcode carries its byte value, mnemonic, the stack items it pops and
//! pushes, and the number of immediate bytes that follow it in the code. The
//! table is built once per process and shared read-only by every execution
//! path.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Information about a single opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    pub byte: u8,
    pub name: &'static str,
    /// Number of stack items consumed.
    pub pops: u8,
    /// Number of stack items produced.
    pub pushes: u8,
    /// If this is a `PUSHn`, the number of immediate bytes.
    pub immediate_bytes: u8,
}

impl OpcodeInfo {
    /// Stack diff = pushes − pops  (may be negative).
    pub fn stack_diff(&self) -> i16 {
        self.pushes as i16 - self.pops as i16
    }

    pub fn is_push(&self) -> bool {
        (0x5F..=0x7F).contains(&self.byte)
    }

    /// `n` for `DUPn`.
    pub fn dup_depth(&self) -> Option<usize> {
        (0x80..=0x8F).contains(&self.byte).then(|| (self.byte - 0x7F) as usize)
    }

    /// `n` for `SWAPn`.
    pub fn swap_depth(&self) -> Option<usize> {
        (0x90..=0x9F).contains(&self.byte).then(|| (self.byte - 0x8F) as usize)
    }

    /// Opcodes that end an execution path.
    pub fn is_terminal(&self) -> bool {
        matches!(self.byte, 0x00 | 0xF3 | 0xFD | 0xFE | 0xFF)
    }

    /// `CALL` and `CALLCODE`, the two call variants that can move value and
    /// therefore produce a checkpoint.
    pub fn is_value_call(&self) -> bool {
        matches!(self.byte, 0xF1 | 0xF2)
    }
}

/// Undefined bytes execute as `INVALID`.
pub static INVALID: OpcodeInfo = OpcodeInfo { byte: 0xFE, name: "INVALID", pops: 0, pushes: 0, immediate_bytes: 0 };

/// Build the full opcode table (byte → info).
pub fn build_opcode_table() -> HashMap<u8, OpcodeInfo> {
    let mut m: HashMap<u8, OpcodeInfo> = HashMap::new();

    macro_rules! op {
        ($byte:expr, $name:expr, $pops:expr, $pushes:expr) => {
            m.insert($byte, OpcodeInfo {
                byte: $byte,
                name: $name,
                pops: $pops,
                pushes: $pushes,
                immediate_bytes: 0,
            });
        };
    }

    // -- Stop and Arithmetic -----------------------------------------------
    op!(0x00, "STOP",         0, 0);
    op!(0x01, "ADD",          2, 1);
    op!(0x02, "MUL",          2, 1);
    op!(0x03, "SUB",          2, 1);
    op!(0x04, "DIV",          2, 1);
    op!(0x05, "SDIV",         2, 1);
    op!(0x06, "MOD",          2, 1);
    op!(0x07, "SMOD",         2, 1);
    op!(0x08, "ADDMOD",       3, 1);
    op!(0x09, "MULMOD",       3, 1);
    op!(0x0A, "EXP",          2, 1);
    op!(0x0B, "SIGNEXTEND",   2, 1);

    // -- Comparison and Bitwise Logic --------------------------------------
    op!(0x10, "LT",           2, 1);
    op!(0x11, "GT",           2, 1);
    op!(0x12, "SLT",          2, 1);
    op!(0x13, "SGT",          2, 1);
    op!(0x14, "EQ",           2, 1);
    op!(0x15, "ISZERO",       1, 1);
    op!(0x16, "AND",          2, 1);
    op!(0x17, "OR",           2, 1);
    op!(0x18, "XOR",          2, 1);
    op!(0x19, "NOT",          1, 1);
    op!(0x1A, "BYTE",         2, 1);
    op!(0x1B, "SHL",          2, 1);
    op!(0x1C, "SHR",          2, 1);
    op!(0x1D, "SAR",          2, 1);

    // -- SHA3 --------------------------------------------------------------
    op!(0x20, "SHA3",         2, 1);

    // -- Environment Information -------------------------------------------
    op!(0x30, "ADDRESS",        0, 1);
    op!(0x31, "BALANCE",        1, 1);
    op!(0x32, "ORIGIN",         0, 1);
    op!(0x33, "CALLER",         0, 1);
    op!(0x34, "CALLVALUE",      0, 1);
    op!(0x35, "CALLDATALOAD",   1, 1);
    op!(0x36, "CALLDATASIZE",   0, 1);
    op!(0x37, "CALLDATACOPY",   3, 0);
    op!(0x38, "CODESIZE",       0, 1);
    op!(0x39, "CODECOPY",       3, 0);
    op!(0x3A, "GASPRICE",       0, 1);
    op!(0x3B, "EXTCODESIZE",    1, 1);
    op!(0x3C, "EXTCODECOPY",    4, 0);
    op!(0x3D, "RETURNDATASIZE", 0, 1);
    op!(0x3E, "RETURNDATACOPY", 3, 0);
    op!(0x3F, "EXTCODEHASH",    1, 1);

    // -- Block Information -------------------------------------------------
    op!(0x40, "BLOCKHASH",    1, 1);
    op!(0x41, "COINBASE",     0, 1);
    op!(0x42, "TIMESTAMP",    0, 1);
    op!(0x43, "NUMBER",       0, 1);
    op!(0x44, "DIFFICULTY",   0, 1);  // prevrandao post-Paris
    op!(0x45, "GASLIMIT",     0, 1);
    op!(0x46, "CHAINID",      0, 1);
    op!(0x47, "SELFBALANCE",  0, 1);
    op!(0x48, "BASEFEE",      0, 1);
    op!(0x49, "BLOBHASH",     1, 1);
    op!(0x4A, "BLOBBASEFEE",  0, 1);

    // -- Stack, Memory, Storage and Flow -----------------------------------
    op!(0x50, "POP",          1, 0);
    op!(0x51, "MLOAD",        1, 1);
    op!(0x52, "MSTORE",       2, 0);
    op!(0x53, "MSTORE8",      2, 0);
    op!(0x54, "SLOAD",        1, 1);
    op!(0x55, "SSTORE",       2, 0);
    op!(0x56, "JUMP",         1, 0);
    op!(0x57, "JUMPI",        2, 0);
    op!(0x58, "PC",           0, 1);
    op!(0x59, "MSIZE",        0, 1);
    op!(0x5A, "GAS",          0, 1);
    op!(0x5B, "JUMPDEST",     0, 0);
    op!(0x5C, "TLOAD",        1, 1);
    op!(0x5D, "TSTORE",       2, 0);
    op!(0x5E, "MCOPY",        3, 0);
    op!(0x5F, "PUSH0",        0, 1);

    // -- PUSH1..PUSH32 -----------------------------------------------------
    for n in 1u8..=32 {
        let byte = 0x5F + n;
        // The table is built once per process, so leaking the generated
        // mnemonics gives them the required `'static` lifetime.
        let name: &'static str = Box::leak(format!("PUSH{n}").into_boxed_str());
        m.insert(byte, OpcodeInfo { byte, name, pops: 0, pushes: 1, immediate_bytes: n });
    }

    // -- DUP1..DUP16 -------------------------------------------------------
    for n in 1u8..=16 {
        let byte = 0x7F + n;
        let name: &'static str = Box::leak(format!("DUP{n}").into_boxed_str());
        m.insert(byte, OpcodeInfo { byte, name, pops: n, pushes: n + 1, immediate_bytes: 0 });
    }

    // -- SWAP1..SWAP16 -----------------------------------------------------
    for n in 1u8..=16 {
        let byte = 0x8F + n;
        let name: &'static str = Box::leak(format!("SWAP{n}").into_boxed_str());
        m.insert(byte, OpcodeInfo { byte, name, pops: n + 1, pushes: n + 1, immediate_bytes: 0 });
    }

    // -- LOG0..LOG4 --------------------------------------------------------
    for n in 0u8..=4 {
        let byte = 0xA0 + n;
        let name: &'static str = Box::leak(format!("LOG{n}").into_boxed_str());
        m.insert(byte, OpcodeInfo { byte, name, pops: n + 2, pushes: 0, immediate_bytes: 0 });
    }

    // -- System operations -------------------------------------------------
    op!(0xF0, "CREATE",       3, 1);
    op!(0xF1, "CALL",         7, 1);
    op!(0xF2, "CALLCODE",     7, 1);
    op!(0xF3, "RETURN",       2, 0);
    op!(0xF4, "DELEGATECALL", 6, 1);
    op!(0xF5, "CREATE2",      4, 1);
    op!(0xFA, "STATICCALL",   6, 1);
    op!(0xFD, "REVERT",       2, 0);
    op!(0xFE, "INVALID",      0, 0);
    op!(0xFF, "SELFDESTRUCT", 1, 0);

    m
}

fn table() -> &'static [Option<OpcodeInfo>; 256] {
    static TABLE: OnceLock<[Option<OpcodeInfo>; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut slots = [None; 256];
        for (byte, info) in build_opcode_table() {
            slots[byte as usize] = Some(info);
        }
        slots
    })
}

/// Look up an opcode by byte value in the process-wide table.
pub fn opcode(byte: u8) -> Option<&'static OpcodeInfo> {
    table()[byte as usize].as_ref()
}

/// Lookup opcode name by byte value.
pub fn opcode_name(byte: u8) -> Option<&'static str> {
    opcode(byte).map(|info| info.name)
}

/// Get the number of immediate bytes for a given opcode byte.
pub fn immediate_size(byte: u8) -> u8 {
    opcode(byte).map(|info| info.immediate_bytes).unwrap_or(0)
}
